//! Cache Module
//!
//! Bounded in-memory caches that sit in front of a node's persistent store.
//!
//! ## Responsibilities
//! - One capability set (`Cache`) shared by every replacement strategy
//! - Purely in-memory; no knowledge of the backing store
//! - Auxiliary indexes (recency, frequency buckets, insertion order) kept
//!   consistent with the key-value map after every mutation
//!
//! ## Strategies
//! ```text
//! ┌──────────┬──────────────────────────────────────────────────────┐
//! │ LRU      │ HashMap + BTreeMap<tick, key> ordered by last access │
//! │ LFU      │ HashMap + freq → BTreeMap<seq, key>, min_frequency   │
//! │ FIFO     │ HashMap + BTreeMap<seq, key> ordered by insertion    │
//! └──────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! A capacity of 0 disables the cache: `put` becomes a no-op.

mod fifo;
mod lfu;
mod lru;

pub use fifo::FifoCache;
pub use lfu::LfuCache;
pub use lru::LruCache;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RingKvError};

/// Replacement strategy for a node cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheStrategy {
    Lru,
    Lfu,
    Fifo,
    /// No cache in front of the store
    None,
}

impl CacheStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::Lru => "LRU",
            CacheStrategy::Lfu => "LFU",
            CacheStrategy::Fifo => "FIFO",
            CacheStrategy::None => "None",
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStrategy {
    type Err = RingKvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LRU" => Ok(CacheStrategy::Lru),
            "LFU" => Ok(CacheStrategy::Lfu),
            "FIFO" => Ok(CacheStrategy::Fifo),
            "NONE" => Ok(CacheStrategy::None),
            other => Err(RingKvError::Config(format!(
                "Unknown cache strategy: {}",
                other
            ))),
        }
    }
}

/// Strategy plus capacity (in entries)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub strategy: CacheStrategy,
    pub capacity: usize,
}

impl CacheConfig {
    pub fn new(strategy: CacheStrategy, capacity: usize) -> Self {
        Self { strategy, capacity }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::Fifo,
            capacity: 10,
        }
    }
}

/// Capability set shared by all cache strategies
///
/// `get` takes `&mut self` because LRU and LFU update their access metadata
/// on every hit.
pub trait Cache: Send {
    /// Look up a key, returning `None` when absent
    fn get(&mut self, key: &str) -> Option<String>;

    /// Insert or update a key, evicting per strategy when over capacity
    fn put(&mut self, key: String, value: String);

    /// Remove a key (no-op when absent)
    fn remove(&mut self, key: &str);

    /// Number of cached entries
    fn len(&self) -> usize;

    /// Check membership without touching access metadata
    fn contains_key(&self, key: &str) -> bool;

    /// All cached keys (unordered)
    fn keys(&self) -> Vec<String>;

    /// Configured capacity
    fn capacity(&self) -> usize;

    /// Strategy of this cache
    fn strategy(&self) -> CacheStrategy;

    /// Drop every entry
    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a cache for the given config
///
/// Returns `None` for `CacheStrategy::None`.
pub fn build_cache(config: CacheConfig) -> Option<Box<dyn Cache>> {
    match config.strategy {
        CacheStrategy::Lru => Some(Box::new(LruCache::new(config.capacity))),
        CacheStrategy::Lfu => Some(Box::new(LfuCache::new(config.capacity))),
        CacheStrategy::Fifo => Some(Box::new(FifoCache::new(config.capacity))),
        CacheStrategy::None => None,
    }
}
