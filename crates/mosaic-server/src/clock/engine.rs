//! Berkeley-style clock offset computation.
//!
//! Clients measure their own offset against the server and report the
//! samples. Each cycle pools the samples of every client with a full
//! window, takes the interquartile mean of the pool as the reference
//! offset, and tells each of those clients how far its own mean lies from
//! that reference.

use std::collections::{BTreeMap, HashMap};

use metrics::counter;
use mosaic_core::protocol::{self, SyncSample};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::window::{ObservationWindow, mean_toward_zero};
use crate::metrics::CLOCK_CORRECTIONS_TOTAL;
use crate::websocket::broadcast::BroadcastManager;

/// Result of one offset computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Interquartile mean of all pooled samples.
    pub global_offset: i64,
    /// Non-zero per-client corrections, keyed by client clock id.
    pub corrections: BTreeMap<String, i64>,
}

#[derive(Default)]
struct ClockState {
    windows: HashMap<String, ObservationWindow>,
    global_offset: Option<i64>,
}

/// Collects client samples and computes per-client corrections.
pub struct ClockSyncEngine {
    attempts: usize,
    state: Mutex<ClockState>,
}

impl ClockSyncEngine {
    /// Engine requiring `attempts` samples per client per cycle.
    pub fn new(attempts: usize) -> Self {
        Self {
            attempts,
            state: Mutex::new(ClockState::default()),
        }
    }

    /// Record reported samples into their clients' windows.
    pub fn ingest(&self, samples: &[SyncSample]) {
        let mut state = self.state.lock();
        for sample in samples {
            state
                .windows
                .entry(sample.id.clone())
                .or_insert_with(|| ObservationWindow::new(self.attempts))
                .push(sample.diff);
        }
        trace!(count = samples.len(), "clock samples ingested");
    }

    /// Reference offset from the last productive cycle.
    pub fn global_offset(&self) -> Option<i64> {
        self.state.lock().global_offset
    }

    /// Number of clients with samples pending.
    pub fn pending_clients(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Run one computation over the full windows.
    ///
    /// Returns `None` when no client has a full window. Consumed windows
    /// are discarded; partial ones are kept for the next cycle.
    pub fn compute(&self) -> Option<SyncOutcome> {
        let mut state = self.state.lock();

        let candidates: Vec<String> = state
            .windows
            .iter()
            .filter(|(_, w)| w.is_full())
            .map(|(id, _)| id.clone())
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut pool: Vec<i64> = candidates
            .iter()
            .filter_map(|id| state.windows.get(id))
            .flat_map(ObservationWindow::samples)
            .collect();
        let global = trimmed_mean(&mut pool);
        state.global_offset = Some(global);

        let mut corrections = BTreeMap::new();
        for id in candidates {
            let Some(window) = state.windows.remove(&id) else {
                continue;
            };
            let delta = window.truncated_mean().unwrap_or(global).saturating_sub(global);
            if delta != 0 {
                let _ = corrections.insert(id, delta);
            }
        }

        debug!(global_offset = global, corrections = corrections.len(), "clock cycle computed");
        Some(SyncOutcome {
            global_offset: global,
            corrections,
        })
    }

    /// Compute and broadcast `clockDiff` when any client needs correcting.
    pub async fn run_cycle(&self, clients: &BroadcastManager, app_name: &str) -> Option<SyncOutcome> {
        let outcome = self.compute()?;
        if !outcome.corrections.is_empty() {
            let frame = protocol::clock_diff(app_name, &outcome.corrections);
            let sent = clients.broadcast_json(&frame).await;
            counter!(CLOCK_CORRECTIONS_TOTAL).increment(outcome.corrections.len() as u64);
            debug!(recipients = sent, "clockDiff broadcast");
        }
        Some(outcome)
    }
}

/// Inclusive index bounds of the interquartile slice of `n` sorted values.
///
/// `None` when the slice would be empty.
pub fn quartile_bounds(n: usize) -> Option<(usize, usize)> {
    let q1 = n / 4;
    let three_quarters = 3 * n / 4;
    let q3 = if n % 4 == 0 {
        three_quarters.checked_sub(2)?
    } else {
        three_quarters.checked_sub(1)?
    };
    (q1 <= q3).then_some((q1, q3))
}

/// Sort `pool` and return the truncated mean of its interquartile slice,
/// or of the whole pool when that slice is empty.
pub fn trimmed_mean(pool: &mut [i64]) -> i64 {
    pool.sort_unstable();
    let slice = match quartile_bounds(pool.len()) {
        Some((q1, q3)) => &pool[q1..=q3],
        None => &pool[..],
    };
    mean_toward_zero(slice.iter().copied()).unwrap_or(0)
}
