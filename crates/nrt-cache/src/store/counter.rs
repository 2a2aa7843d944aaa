//! Generic per-key occurrence counter

use super::lock;
use std::collections::HashMap;
use std::sync::Mutex;

/// Counts occurrences per string key
///
/// A key that was never incremented (or was deleted since) is "not set",
/// which is distinct from any count.
#[derive(Debug, Default)]
pub struct Counter {
    counts: Mutex<HashMap<String, u64>>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a key, creating it at 1, and return the new count
    pub fn incr(&self, key: &str) -> u64 {
        let mut counts = lock(&self.counts);
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn is_set(&self, key: &str) -> bool {
        lock(&self.counts).contains_key(key)
    }

    /// Current count of a key, if set
    pub fn get(&self, key: &str) -> Option<u64> {
        lock(&self.counts).get(key).copied()
    }

    /// Remove a key; the next increment restarts at 1
    pub fn delete(&self, key: &str) {
        lock(&self.counts).remove(key);
    }

    /// All currently set keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        lock(&self.counts).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.counts).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.counts).is_empty()
    }
}
