//! Bounded cache keyed by epoch number

use std::collections::BTreeMap;

/// Keeps the values of the `capacity` highest epochs seen.
#[derive(Debug, Clone)]
pub struct EpochCache<V> {
    capacity: usize,
    entries: BTreeMap<u64, V>,
}

impl<V> EpochCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, epoch: u64) -> Option<&V> {
        self.entries.get(&epoch)
    }

    pub fn contains(&self, epoch: u64) -> bool {
        self.entries.contains_key(&epoch)
    }

    /// Insert, evicting the lowest epochs once over capacity.
    pub fn insert(&mut self, epoch: u64, value: V) {
        self.entries.insert(epoch, value);
        while self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn epochs(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }
}
