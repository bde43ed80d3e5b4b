//! FIFO cache
//!
//! Eviction order is insertion order. Updating a key keeps its place in the
//! queue; reads never reorder.

use std::collections::{BTreeMap, HashMap};

use super::{Cache, CacheStrategy};

/// First-in-first-out cache
pub struct FifoCache {
    capacity: usize,
    /// key → (value, insertion sequence)
    entries: HashMap<String, (String, u64)>,
    /// insertion sequence → key, head first
    queue: BTreeMap<u64, String>,
    next_seq: u64,
}

impl FifoCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            queue: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl Cache for FifoCache {
    fn get(&mut self, key: &str) -> Option<String> {
        self.entries.get(key).map(|(value, _)| value.clone())
    }

    fn put(&mut self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }

        if let Some((existing, _)) = self.entries.get_mut(&key) {
            *existing = value;
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some((_, head)) = self.queue.pop_first() {
                self.entries.remove(&head);
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.insert(seq, key.clone());
        self.entries.insert(key, (value, seq));
    }

    fn remove(&mut self, key: &str) {
        if let Some((_, seq)) = self.entries.remove(key) {
            self.queue.remove(&seq);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn strategy(&self) -> CacheStrategy {
        CacheStrategy::Fifo
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.queue.clear();
    }
}
