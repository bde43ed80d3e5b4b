//! Cache Tests
//!
//! Eviction behaviour of each strategy and the cross-strategy rules.

use ringkv::cache::{
    build_cache, Cache, CacheConfig, CacheStrategy, FifoCache, LfuCache, LruCache,
};

fn put(cache: &mut dyn Cache, key: &str, value: &str) {
    cache.put(key.to_string(), value.to_string());
}

fn sorted_keys(cache: &dyn Cache) -> Vec<String> {
    let mut keys = cache.keys();
    keys.sort();
    keys
}

/// Small deterministic generator so property runs are repeatable
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

// =============================================================================
// LRU
// =============================================================================

#[test]
fn test_lru_evicts_least_recently_used() {
    let mut cache = LruCache::new(2);
    put(&mut cache, "a", "1");
    put(&mut cache, "b", "2");

    assert_eq!(cache.get("a"), Some("1".to_string()));
    put(&mut cache, "c", "3");

    assert!(cache.contains_key("a"));
    assert!(!cache.contains_key("b"));
    assert!(cache.contains_key("c"));
}

#[test]
fn test_lru_put_refreshes_recency() {
    let mut cache = LruCache::new(2);
    put(&mut cache, "a", "1");
    put(&mut cache, "b", "2");
    put(&mut cache, "a", "updated");
    put(&mut cache, "c", "3");

    assert_eq!(cache.get("a"), Some("updated".to_string()));
    assert_eq!(cache.get("b"), None);
}

#[test]
fn test_lru_missing_key_is_none() {
    let mut cache = LruCache::new(4);
    assert_eq!(cache.get("nope"), None);
}

// =============================================================================
// LFU
// =============================================================================

#[test]
fn test_lfu_evicts_least_frequent() {
    let mut cache = LfuCache::new(2);
    put(&mut cache, "a", "1");
    put(&mut cache, "b", "2");
    cache.get("a");
    put(&mut cache, "c", "3");

    assert!(cache.contains_key("a"));
    assert!(!cache.contains_key("b"));
    assert!(cache.contains_key("c"));
}

#[test]
fn test_lfu_ties_evict_oldest_in_bucket() {
    let mut cache = LfuCache::new(3);
    put(&mut cache, "a", "1");
    put(&mut cache, "b", "2");
    put(&mut cache, "c", "3");
    put(&mut cache, "d", "4");

    assert_eq!(sorted_keys(&cache), vec!["b", "c", "d"]);
}

#[test]
fn test_lfu_frequency_counts_hits() {
    let mut cache = LfuCache::new(2);
    put(&mut cache, "a", "1");
    cache.get("a");
    cache.get("a");

    assert_eq!(cache.frequency_of("a"), Some(3));
    assert_eq!(cache.min_frequency(), 3);
}

#[test]
fn test_lfu_min_frequency_resets_when_empty() {
    let mut cache = LfuCache::new(2);
    put(&mut cache, "a", "1");
    cache.get("a");
    cache.remove("a");

    assert!(cache.is_empty());
    assert_eq!(cache.min_frequency(), 0);

    put(&mut cache, "b", "2");
    assert_eq!(cache.min_frequency(), 1);
}

#[test]
fn test_lfu_min_frequency_matches_survivors() {
    let mut rng = Lcg(7);
    let mut cache = LfuCache::new(8);

    for _ in 0..2000 {
        let key = format!("k{}", rng.next() % 20);
        match rng.next() % 3 {
            0 => put(&mut cache, &key, "v"),
            1 => {
                cache.get(&key);
            }
            _ => cache.remove(&key),
        }

        let min = cache
            .keys()
            .iter()
            .filter_map(|k| cache.frequency_of(k))
            .min()
            .unwrap_or(0);
        assert_eq!(cache.min_frequency(), min);
    }
}

// =============================================================================
// FIFO
// =============================================================================

#[test]
fn test_fifo_evicts_oldest_insertion() {
    let mut cache = FifoCache::new(2);
    put(&mut cache, "a", "1");
    put(&mut cache, "b", "2");
    cache.get("a");
    put(&mut cache, "c", "3");

    assert!(!cache.contains_key("a"));
    assert_eq!(sorted_keys(&cache), vec!["b", "c"]);
}

#[test]
fn test_fifo_update_keeps_queue_position() {
    let mut cache = FifoCache::new(2);
    put(&mut cache, "a", "1");
    put(&mut cache, "b", "2");
    put(&mut cache, "a", "updated");
    put(&mut cache, "c", "3");

    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.get("b"), Some("2".to_string()));
    assert_eq!(cache.get("c"), Some("3".to_string()));
}

// =============================================================================
// Cross-strategy rules
// =============================================================================

fn every_strategy(capacity: usize) -> Vec<Box<dyn Cache>> {
    [CacheStrategy::Lru, CacheStrategy::Lfu, CacheStrategy::Fifo]
        .into_iter()
        .filter_map(|s| build_cache(CacheConfig::new(s, capacity)))
        .collect()
}

#[test]
fn test_zero_capacity_disables_put() {
    for mut cache in every_strategy(0) {
        put(cache.as_mut(), "a", "1");
        assert!(cache.is_empty(), "{} stored with capacity 0", cache.strategy());
        assert_eq!(cache.get("a"), None);
    }
}

#[test]
fn test_remove_absent_is_noop() {
    for mut cache in every_strategy(2) {
        put(cache.as_mut(), "a", "1");
        cache.remove("missing");
        assert_eq!(cache.len(), 1, "{}", cache.strategy());
    }
}

#[test]
fn test_size_never_exceeds_capacity() {
    for capacity in [1usize, 3, 8] {
        for mut cache in every_strategy(capacity) {
            let mut rng = Lcg(capacity as u64);
            for _ in 0..500 {
                let key = format!("k{}", rng.next() % 16);
                if rng.next() % 4 == 0 {
                    cache.get(&key);
                } else {
                    put(cache.as_mut(), &key, "v");
                }
                assert!(cache.len() <= capacity, "{}", cache.strategy());
                assert_eq!(cache.keys().len(), cache.len());
            }
        }
    }
}

#[test]
fn test_get_after_put_hits_until_evicted() {
    for mut cache in every_strategy(4) {
        put(cache.as_mut(), "a", "1");
        assert_eq!(cache.get("a"), Some("1".to_string()), "{}", cache.strategy());
        assert!(cache.contains_key("a"));
    }
}

#[test]
fn test_none_strategy_builds_no_cache() {
    assert!(build_cache(CacheConfig::new(CacheStrategy::None, 10)).is_none());
}

#[test]
fn test_strategy_parses_case_insensitively() {
    assert_eq!("lru".parse::<CacheStrategy>().unwrap(), CacheStrategy::Lru);
    assert_eq!("Lfu".parse::<CacheStrategy>().unwrap(), CacheStrategy::Lfu);
    assert_eq!("FIFO".parse::<CacheStrategy>().unwrap(), CacheStrategy::Fifo);
    assert!("random".parse::<CacheStrategy>().is_err());
}
