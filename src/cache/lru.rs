//! LRU cache
//!
//! Recency is an explicit ordered index: every access stamps the key with a
//! fresh tick, and the smallest tick is the least recently used entry.

use std::collections::{BTreeMap, HashMap};

use super::{Cache, CacheStrategy};

struct LruEntry {
    value: String,
    tick: u64,
}

/// Least-recently-used cache
pub struct LruCache {
    capacity: usize,
    entries: HashMap<String, LruEntry>,
    /// tick → key, oldest first
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Move an existing key to most-recently-used
    fn touch(&mut self, key: &str) {
        let tick = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.capacity {
            match self.recency.pop_first() {
                Some((_, oldest)) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl Cache for LruCache {
    fn get(&mut self, key: &str) -> Option<String> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn put(&mut self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            self.touch(&key);
            return;
        }

        let tick = self.bump();
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, LruEntry { value, tick });
        self.evict_overflow();
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.tick);
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
        CacheStrategy::Lru
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}
