//! Per-client rolling buffer of clock samples.

use std::collections::VecDeque;

/// The most recent `capacity` offset samples reported by one client.
#[derive(Clone, Debug)]
pub struct ObservationWindow {
    samples: VecDeque<i64>,
    capacity: usize,
}

impl ObservationWindow {
    /// Empty window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when over capacity.
    pub fn push(&mut self, diff: i64) {
        self.samples.push_back(diff);
        while self.samples.len() > self.capacity {
            let _ = self.samples.pop_front();
        }
    }

    /// Whether the window holds exactly `capacity` samples.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = i64> + '_ {
        self.samples.iter().copied()
    }

    /// Mean of the samples, truncated toward zero.
    pub fn truncated_mean(&self) -> Option<i64> {
        mean_toward_zero(self.samples.iter().copied())
    }
}

/// Truncated mean of `values`, `None` when empty.
///
/// Accumulates in `i128` so client-supplied extremes cannot overflow; the
/// mean of `i64` values always fits back into `i64`.
pub(crate) fn mean_toward_zero(values: impl IntoIterator<Item = i64>) -> Option<i64> {
    let (sum, n) = values
        .into_iter()
        .fold((0_i128, 0_i128), |(sum, n), v| (sum + i128::from(v), n + 1));
    if n == 0 {
        return None;
    }
    i64::try_from(sum / n).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut w = ObservationWindow::new(3);
        for d in [1, 2, 3, 4, 5] {
            w.push(d);
        }
        assert_eq!(w.samples().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(w.is_full());
    }

    #[test]
    fn not_full_until_capacity() {
        let mut w = ObservationWindow::new(5);
        w.push(10);
        w.push(20);
        assert!(!w.is_full());
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn mean_truncates_toward_zero() {
        let mut w = ObservationWindow::new(2);
        w.push(-3);
        w.push(-2);
        assert_eq!(w.truncated_mean(), Some(-2));
        w.push(4);
        assert_eq!(w.truncated_mean(), Some(1));
        assert_eq!(ObservationWindow::new(2).truncated_mean(), None);
    }

    #[test]
    fn mean_of_extremes_does_not_overflow() {
        let mut w = ObservationWindow::new(2);
        w.push(i64::MAX);
        w.push(i64::MAX);
        assert_eq!(w.truncated_mean(), Some(i64::MAX));
        w.push(i64::MIN);
        assert_eq!(w.truncated_mean(), Some(0));
        w.push(i64::MIN);
        assert_eq!(w.truncated_mean(), Some(i64::MIN));
    }
}
