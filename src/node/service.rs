//! KV service
//!
//! Request execution for one storage node: cache in front of the store,
//! ownership checks against the node's ring snapshot, and the data-side
//! helpers used during migration.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::{build_cache, Cache, CacheConfig};
use crate::error::{Result, RingKvError};
use crate::protocol::{KvPairs, StatusType, MAX_PAIR_SIZE};
use crate::ring::{HashRing, KeyRange, RingNode};
use crate::storage::PersistentStore;

/// Whether and for which keys the node currently serves clients
#[derive(Debug, Clone)]
pub enum ServingState {
    /// No orchestrator: every key is ours
    Standalone,
    /// Registered, waiting to be admitted
    Awaiting,
    /// Admitted; owns the keys its ring snapshot assigns to it
    Active(Arc<HashRing>),
    /// Removed or shutting down
    Stopped,
}

/// Storage node request handling
///
/// ## Concurrency
/// - `data_lock`: writers (put/delete/apply) exclusive, readers shared, so a
///   read never repopulates the cache with a value a concurrent write just
///   replaced
/// - `cache`: own mutex, since LRU/LFU reads mutate access metadata
/// - `state`: replaced wholesale on every ring update
pub struct KvService {
    name: String,
    store: Arc<dyn PersistentStore>,
    cache: Mutex<Option<Box<dyn Cache>>>,
    cache_config: RwLock<CacheConfig>,
    data_lock: RwLock<()>,
    state: RwLock<ServingState>,
}

impl KvService {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn PersistentStore>,
        cache_config: CacheConfig,
        state: ServingState,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            cache: Mutex::new(build_cache(cache_config)),
            cache_config: RwLock::new(cache_config),
            data_lock: RwLock::new(()),
            state: RwLock::new(state),
        }
    }

    /// A node serving every key, with no orchestrator
    pub fn standalone(
        name: impl Into<String>,
        store: Arc<dyn PersistentStore>,
        cache_config: CacheConfig,
    ) -> Self {
        Self::new(name, store, cache_config, ServingState::Standalone)
    }

    /// Ring identity (`host:port`)
    pub fn name(&self) -> &str {
        &self.name
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    /// Read-through get
    pub fn get(&self, key: &str) -> Result<String> {
        self.check_serving(key)?;
        let _read = self.data_lock.read();

        if let Some(value) = self.cache.lock().as_mut().and_then(|c| c.get(key)) {
            tracing::trace!("Cache hit for {}", key);
            return Ok(value);
        }

        let value = self.store.read(key)?.ok_or(RingKvError::KeyNotFound)?;
        if let Some(cache) = self.cache.lock().as_mut() {
            cache.put(key.to_string(), value.clone());
        }
        Ok(value)
    }

    /// Write-through put
    ///
    /// - empty value: rejected
    /// - `"null"`: deletes the key
    /// - key plus value over `MAX_PAIR_SIZE`: rejected, so the pair can
    ///   always migrate
    /// - otherwise `PutSuccess` for a new key, `PutUpdate` for an existing one
    pub fn put(&self, key: &str, value: &str) -> Result<StatusType> {
        self.check_serving(key)?;
        if value.is_empty() {
            return Err(RingKvError::EmptyValueRejected);
        }
        if value == "null" {
            return self.delete_unchecked(key);
        }
        let size = key.len() + value.len();
        if size > MAX_PAIR_SIZE {
            return Err(RingKvError::PairTooLarge {
                size,
                max: MAX_PAIR_SIZE,
            });
        }

        let _write = self.data_lock.write();
        let existed = self.store.exists(key)?;
        self.store.write(key, value)?;
        if let Some(cache) = self.cache.lock().as_mut() {
            cache.put(key.to_string(), value.to_string());
        }

        Ok(if existed {
            StatusType::PutUpdate
        } else {
            StatusType::PutSuccess
        })
    }

    /// Delete a key
    pub fn delete(&self, key: &str) -> Result<StatusType> {
        self.check_serving(key)?;
        self.delete_unchecked(key)
    }

    fn delete_unchecked(&self, key: &str) -> Result<StatusType> {
        let _write = self.data_lock.write();
        if !self.store.delete(key)? {
            return Err(RingKvError::KeyNotFound);
        }
        if let Some(cache) = self.cache.lock().as_mut() {
            cache.remove(key);
        }
        Ok(StatusType::DeleteSuccess)
    }

    /// `low,high,host:port;` for every ring member
    pub fn key_ranges(&self) -> Result<String> {
        let ring = match &*self.state.read() {
            ServingState::Active(ring) => Arc::clone(ring),
            ServingState::Standalone => {
                let me = RingNode::parse(&self.name)?;
                Arc::new(HashRing::from_nodes([me])?)
            }
            ServingState::Awaiting | ServingState::Stopped => {
                return Err(RingKvError::ServerStopped)
            }
        };

        Ok(ring
            .key_ranges()
            .iter()
            .map(|(range, node)| format!("{},{};", range, node.name))
            .collect())
    }

    fn check_serving(&self, key: &str) -> Result<()> {
        match &*self.state.read() {
            ServingState::Standalone => Ok(()),
            ServingState::Awaiting | ServingState::Stopped => Err(RingKvError::ServerStopped),
            ServingState::Active(ring) => {
                if ring.owner_of(key)?.name == self.name {
                    Ok(())
                } else {
                    Err(RingKvError::NotResponsible(key.to_string()))
                }
            }
        }
    }

    /// Does this node own `key` under its current state?
    pub fn owns(&self, key: &str) -> bool {
        self.check_serving(key).is_ok()
    }

    // =========================================================================
    // Migration Support
    // =========================================================================

    /// Every stored pair whose key hashes into `range`
    pub fn collect_range(&self, range: &KeyRange) -> Result<KvPairs> {
        let _read = self.data_lock.read();
        let mut pairs = KvPairs::new();
        for key in self.store.keys()? {
            if range.contains_key(&key) {
                if let Some(value) = self.store.read(&key)? {
                    pairs.insert(key, value);
                }
            }
        }
        Ok(pairs)
    }

    /// Every stored pair (voluntary departure)
    pub fn drain_all(&self) -> Result<KvPairs> {
        let _read = self.data_lock.read();
        let mut pairs = KvPairs::new();
        for key in self.store.keys()? {
            if let Some(value) = self.store.read(&key)? {
                pairs.insert(key, value);
            }
        }
        Ok(pairs)
    }

    /// Write received pairs to the store and invalidate their cache entries
    pub fn apply_pairs(&self, pairs: &KvPairs) -> Result<usize> {
        let _write = self.data_lock.write();
        let mut cache = self.cache.lock();
        for (key, value) in pairs {
            self.store.write(key, value)?;
            if let Some(cache) = cache.as_mut() {
                cache.remove(key);
            }
        }
        Ok(pairs.len())
    }

    /// Drop handed-off keys that this node no longer owns
    pub fn drop_unowned(&self, keys: &[String]) -> Result<usize> {
        let stale: Vec<&String> = keys.iter().filter(|key| !self.owns(key)).collect();

        let _write = self.data_lock.write();
        let mut cache = self.cache.lock();
        let mut dropped = 0;
        for key in stale {
            if self.store.delete(key)? {
                dropped += 1;
            }
            if let Some(cache) = cache.as_mut() {
                cache.remove(key);
            }
        }
        Ok(dropped)
    }

    // =========================================================================
    // Membership / Configuration
    // =========================================================================

    /// Adopt a ring snapshot from the orchestrator
    pub fn install_ring(&self, ring: HashRing) {
        let mut state = self.state.write();
        if ring.contains(&self.name) {
            tracing::debug!("{} now active in a ring of {} nodes", self.name, ring.len());
            *state = ServingState::Active(Arc::new(ring));
        } else if matches!(*state, ServingState::Active(_)) {
            tracing::info!("{} no longer in the ring", self.name);
            *state = ServingState::Stopped;
        }
    }

    /// Replace the cache with an empty one of the given configuration
    pub fn reconfigure_cache(&self, config: CacheConfig) {
        let mut current = self.cache_config.write();
        if *current == config {
            return;
        }
        tracing::info!(
            "{} cache reconfigured: {} x {}",
            self.name,
            config.strategy,
            config.capacity
        );
        *self.cache.lock() = build_cache(config);
        *current = config;
    }

    pub fn mark_stopped(&self) {
        *self.state.write() = ServingState::Stopped;
    }

    pub fn state(&self) -> ServingState {
        self.state.read().clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.state.read(), ServingState::Active(_))
    }

    pub fn cache_config(&self) -> CacheConfig {
        *self.cache_config.read()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn in_cache(&self, key: &str) -> bool {
        self.cache
            .lock()
            .as_ref()
            .is_some_and(|cache| cache.contains_key(key))
    }

    pub fn in_storage(&self, key: &str) -> Result<bool> {
        self.store.exists(key)
    }

    pub fn cached_keys(&self) -> Vec<String> {
        self.cache
            .lock()
            .as_ref()
            .map(|cache| cache.keys())
            .unwrap_or_default()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.cache.lock().as_mut() {
            cache.clear();
        }
    }

    pub fn clear_storage(&self) -> Result<()> {
        let _write = self.data_lock.write();
        self.store.clear()?;
        self.clear_cache();
        Ok(())
    }

    pub fn stored_keys(&self) -> Result<Vec<String>> {
        self.store.keys()
    }
}
