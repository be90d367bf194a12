//! L1 Cache - In-Process Hot Cache
//!
//! Bounded key -> entry map shared by request handlers and the warming
//! scheduler.
//!
//! # Design
//!
//! - Single `parking_lot::Mutex`, never held across an `.await`
//! - Bulk LRU eviction: once size exceeds capacity the oldest batch goes in
//!   one sorted pass, instead of one eviction per insert
//! - Staleness sweep bounds how long an L1 copy can outlive an L2 change

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::entry::CacheEntry;
use super::{DEFAULT_EVICTION_BATCH, DEFAULT_L1_CAPACITY, DEFAULT_STALE_AFTER};

/// L1 Cache configuration
#[derive(Debug, Clone)]
pub struct L1Config {
    /// Maximum number of entries
    pub capacity: usize,
    /// Entries removed per eviction pass
    pub eviction_batch_size: usize,
    /// Idle time after which the sweeper drops an entry
    pub stale_after: Duration,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_L1_CAPACITY,
            eviction_batch_size: DEFAULT_EVICTION_BATCH,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// A frequently read key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotKey {
    pub key: String,
    pub hits: u64,
}

/// L1 Cache - in-process LRU map
pub struct LocalCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    config: L1Config,
    /// Logical clock for recency ordering
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl<T: Clone> LocalCache<T> {
    /// Create a new L1 cache with default configuration
    pub fn new() -> Self {
        Self::with_config(L1Config::default())
    }

    /// Create a new L1 cache with custom configuration
    pub fn with_config(config: L1Config) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            clock: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get a copy of the value, recording the hit
    pub fn get(&self, key: &str) -> Option<T> {
        let tick = self.tick();
        let mut entries = self.entries.lock();
        entries.get_mut(key).map(|entry| {
            entry.record_access(tick);
            entry.data().clone()
        })
    }

    /// Insert (or replace) an entry; returns how many entries were evicted
    pub fn insert(&self, key: String, mut entry: CacheEntry<T>) -> usize {
        entry.touch(self.tick());

        let mut entries = self.entries.lock();
        entries.insert(key, entry);

        if entries.len() > self.config.capacity {
            self.evict_lru(&mut entries)
        } else {
            0
        }
    }

    /// Evict the least recently accessed batch
    fn evict_lru(&self, entries: &mut HashMap<String, CacheEntry<T>>) -> usize {
        let mut candidates: Vec<(u64, String)> = entries
            .iter()
            .map(|(key, entry)| (entry.access_tick(), key.clone()))
            .collect();

        // Oldest first
        candidates.sort_unstable_by_key(|(tick, _)| *tick);

        let mut evicted = 0;
        for (_, key) in candidates.into_iter().take(self.config.eviction_batch_size) {
            if entries.remove(&key).is_some() {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        tracing::debug!(evicted, remaining = entries.len(), "L1 LRU eviction");
        evicted
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.lock().remove(key)
    }

    /// Check presence without counting a hit
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Inspect an entry without counting a hit
    pub fn peek(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.lock().get(key).cloned()
    }

    /// Remove every entry carrying any of `tags`
    pub fn remove_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.has_any_tag(tags));
        before - entries.len()
    }

    /// Remove entries idle longer than `max_idle`
    pub fn sweep_stale(&self, max_idle: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.idle_for() <= max_idle);
        before - entries.len()
    }

    /// Top `limit` entries by hit count
    pub fn hot_keys(&self, limit: usize) -> Vec<HotKey> {
        let mut keys: Vec<HotKey> = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| HotKey {
                key: key.clone(),
                hits: entry.hit_count(),
            })
            .collect();

        keys.sort_unstable_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.key.cmp(&b.key)));
        keys.truncate(limit);
        keys
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get capacity
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Configured staleness window
    pub fn stale_after(&self) -> Duration {
        self.config.stale_after
    }

    /// Get eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Clear the cache
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, key: &str, by: Duration) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.backdate(by);
        }
    }
}

impl<T: Clone> Default for LocalCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(value: u32, tags: &[&str]) -> CacheEntry<u32> {
        CacheEntry::new(value, tags.iter().copied(), None)
    }

    fn small_cache(capacity: usize, batch: usize) -> LocalCache<u32> {
        LocalCache::with_config(L1Config {
            capacity,
            eviction_batch_size: batch,
            ..Default::default()
        })
    }

    #[test]
    fn test_l1_cache_creation() {
        let cache: LocalCache<u32> = LocalCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_L1_CAPACITY);
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn test_l1_put_get() {
        let cache = LocalCache::new();
        cache.insert("k".to_string(), make_entry(7, &[]));

        assert_eq!(cache.get("k"), Some(7));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_l1_hit_count_tracking() {
        let cache = LocalCache::new();
        cache.insert("k".to_string(), make_entry(1, &[]));

        for _ in 0..3 {
            cache.get("k");
        }

        assert_eq!(cache.peek("k").unwrap().hit_count(), 3);
    }

    #[test]
    fn test_l1_replace() {
        let cache = LocalCache::new();
        cache.insert("k".to_string(), make_entry(1, &[]));
        cache.insert("k".to_string(), make_entry(2, &[]));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_l1_evicts_exactly_one_batch() {
        let cache = small_cache(1000, 100);

        for i in 0..1001u32 {
            cache.insert(format!("key-{}", i), make_entry(i, &[]));
        }

        assert_eq!(cache.len(), 901);
        assert_eq!(cache.evictions(), 100);

        // The first 100 inserted were the least recently accessed
        for i in 0..100 {
            assert!(!cache.contains(&format!("key-{}", i)));
        }
        for i in 100..1001 {
            assert!(cache.contains(&format!("key-{}", i)));
        }
    }

    #[test]
    fn test_l1_eviction_respects_reads() {
        let cache = small_cache(4, 2);

        for i in 0..4u32 {
            cache.insert(format!("k{}", i), make_entry(i, &[]));
        }
        // k0 becomes most recent
        cache.get("k0");

        let evicted = cache.insert("k4".to_string(), make_entry(4, &[]));
        assert_eq!(evicted, 2);
        assert!(cache.contains("k0"));
        assert!(!cache.contains("k1"));
        assert!(!cache.contains("k2"));
        assert!(cache.contains("k3"));
        assert!(cache.contains("k4"));
    }

    #[test]
    fn test_l1_no_eviction_at_capacity() {
        let cache = small_cache(3, 1);
        for i in 0..3u32 {
            assert_eq!(cache.insert(format!("k{}", i), make_entry(i, &[])), 0);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_l1_remove_by_tags() {
        let cache = LocalCache::new();
        cache.insert("a".to_string(), make_entry(1, &["X"]));
        cache.insert("b".to_string(), make_entry(2, &["Y"]));
        cache.insert("c".to_string(), make_entry(3, &["X", "Y"]));

        assert_eq!(cache.remove_by_tags(&["X"]), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(!cache.contains("c"));
    }

    #[test]
    fn test_l1_sweep_stale() {
        let cache = LocalCache::new();
        cache.insert("old".to_string(), make_entry(1, &[]));
        cache.insert("fresh".to_string(), make_entry(2, &[]));
        cache.backdate("old", Duration::from_secs(5));

        assert_eq!(cache.sweep_stale(Duration::from_secs(1)), 1);
        assert!(!cache.contains("old"));
        assert!(cache.contains("fresh"));
    }

    #[test]
    fn test_l1_hot_keys() {
        let cache = LocalCache::new();
        for i in 0..15u32 {
            cache.insert(format!("k{:02}", i), make_entry(i, &[]));
            for _ in 0..i {
                cache.get(&format!("k{:02}", i));
            }
        }

        let hot = cache.hot_keys(10);
        assert_eq!(hot.len(), 10);
        assert_eq!(hot[0], HotKey { key: "k14".to_string(), hits: 14 });
        assert_eq!(hot[9].hits, 5);
    }

    #[test]
    fn test_l1_clear() {
        let cache = LocalCache::new();
        for i in 0..10u32 {
            cache.insert(format!("k{}", i), make_entry(i, &[]));
        }
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_l1_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(LocalCache::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100u32 {
                        let key = format!("obj-{}-{}", t, i);
                        cache.insert(key.clone(), make_entry(i, &[]));
                        cache.get(&key);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 800);
    }
}
