//! Keyed entry storage shared by both cache flavors.

use std::collections::HashMap;

/// Initial sizing for the file table.
pub(crate) const FILE_CAPACITY: usize = 16;

/// Initial sizing for the directory table. Listings are fewer than files
/// in the workloads this serves.
pub(crate) const DIR_CAPACITY: usize = 4;

/// Map from normalized path to entry, with a remembered initial sizing.
#[derive(Debug)]
pub(crate) struct Registry<E> {
    entries: HashMap<String, E>,
    capacity: usize,
}

impl<E> Registry<E> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&E> {
        self.entries.get(key)
    }

    pub(crate) fn insert(&mut self, key: String, entry: E) {
        self.entries.insert(key, entry);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<E> {
        self.entries.remove(key)
    }

    /// Drop every entry at once by starting a fresh map at the initial
    /// sizing, so a cleared cache does not keep a large table's buckets.
    pub(crate) fn clear(&mut self) {
        self.entries = HashMap::with_capacity(self.capacity);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<E: Default> Registry<E> {
    /// The entry for `key`, registering a default one on first sight.
    pub(crate) fn entry_mut(&mut self, key: &str) -> &mut E {
        self.entries.entry(key.to_owned()).or_default()
    }
}
