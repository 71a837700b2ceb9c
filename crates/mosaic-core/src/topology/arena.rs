//! Sparse slot storage with stable indices.
//!
//! A removed entry leaves an empty slot behind, so the indices of every
//! other entry (which foreign records such as replica mappings hold on
//! to) stay valid. Slots are only recycled once the arena is completely
//! empty.

/// Index-addressable, insertion-ordered storage with tombstoned slots.
#[derive(Clone, Debug)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> SlotArena<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next inserted entry will receive.
    pub fn next_index(&self) -> usize {
        self.slots.len()
    }

    /// Append an entry built from its own index.
    pub fn insert_with(&mut self, build: impl FnOnce(usize) -> T) -> usize {
        let index = self.next_index();
        self.slots.push(Some(build(index)));
        index
    }

    /// Live entry at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Mutable live entry at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Whether `index` holds a live entry.
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Tombstone the slot at `index`, returning its entry.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let removed = self.slots.get_mut(index).and_then(Option::take);
        if removed.is_some() && self.slots.iter().all(Option::is_none) {
            self.slots.clear();
        }
        removed
    }

    /// Live entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    /// Live entries in index order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i, v)))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Drop every entry and reset indices.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
