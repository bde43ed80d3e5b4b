//! LFU cache
//!
//! Keys are grouped into frequency buckets. Each bucket keeps its keys in the
//! order they entered the bucket, so ties are broken oldest-first.
//! `min_frequency` is maintained incrementally and is 0 when empty.

use std::collections::{BTreeMap, HashMap};

use super::{Cache, CacheStrategy};

struct LfuEntry {
    value: String,
    frequency: u64,
    /// Sequence number of this key inside its current bucket
    seq: u64,
}

/// Least-frequently-used cache
pub struct LfuCache {
    capacity: usize,
    entries: HashMap<String, LfuEntry>,
    /// frequency → (bucket-entry sequence → key)
    buckets: BTreeMap<u64, BTreeMap<u64, String>>,
    min_frequency: u64,
    next_seq: u64,
}

impl LfuCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            buckets: BTreeMap::new(),
            min_frequency: 0,
            next_seq: 0,
        }
    }

    /// Current minimum frequency (0 when empty)
    pub fn min_frequency(&self) -> u64 {
        self.min_frequency
    }

    /// Access count of a key, if cached
    pub fn frequency_of(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|e| e.frequency)
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Detach a key from its bucket, dropping the bucket if it empties.
    /// Returns true when the bucket was removed.
    fn unlink(&mut self, frequency: u64, seq: u64) -> bool {
        if let Some(bucket) = self.buckets.get_mut(&frequency) {
            bucket.remove(&seq);
            if bucket.is_empty() {
                self.buckets.remove(&frequency);
                return true;
            }
        }
        false
    }

    fn increment(&mut self, key: &str) {
        let seq = self.bump();
        let (old_frequency, old_seq) = match self.entries.get_mut(key) {
            Some(entry) => {
                let old = (entry.frequency, entry.seq);
                entry.frequency += 1;
                entry.seq = seq;
                old
            }
            None => return,
        };

        let emptied = self.unlink(old_frequency, old_seq);
        self.buckets
            .entry(old_frequency + 1)
            .or_default()
            .insert(seq, key.to_string());

        if emptied && old_frequency == self.min_frequency {
            self.min_frequency = old_frequency + 1;
        }
    }

    fn evict_one(&mut self) {
        let frequency = self.min_frequency;
        let victim = match self.buckets.get_mut(&frequency) {
            Some(bucket) => bucket.pop_first().map(|(_, key)| key),
            None => None,
        };

        if let Some(key) = victim {
            if self.buckets.get(&frequency).is_some_and(|b| b.is_empty()) {
                self.buckets.remove(&frequency);
            }
            self.entries.remove(&key);
        }
    }
}

impl Cache for LfuCache {
    fn get(&mut self, key: &str) -> Option<String> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.increment(key);
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn put(&mut self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            self.increment(&key);
            return;
        }

        if self.entries.len() >= self.capacity {
            self.evict_one();
        }

        let seq = self.bump();
        self.buckets.entry(1).or_default().insert(seq, key.clone());
        self.entries.insert(
            key,
            LfuEntry {
                value,
                frequency: 1,
                seq,
            },
        );
        self.min_frequency = 1;
    }

    fn remove(&mut self, key: &str) {
        let entry = match self.entries.remove(key) {
            Some(entry) => entry,
            None => return,
        };

        let emptied = self.unlink(entry.frequency, entry.seq);

        if self.entries.is_empty() {
            self.min_frequency = 0;
        } else if emptied && entry.frequency == self.min_frequency {
            self.min_frequency = self
                .buckets
                .range(entry.frequency + 1..)
                .next()
                .map(|(frequency, _)| *frequency)
                .unwrap_or(0);
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
        CacheStrategy::Lfu
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
        self.min_frequency = 0;
    }
}
