//! Tiered Cache Facade
//!
//! Orchestrates the L1 map and the L2 store: read-through with promotion,
//! write-through, batched reads, tag invalidation and smart TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CacheOptions, CachedValue, WarmEntry};
use super::l1::{L1Config, LocalCache};
use super::l2::{DistributedStore, InMemoryDistributedStore};
use super::metrics::{CacheStats, CacheTelemetry, Recommendation};
use super::serializer::{JsonSerializer, Serializer};
use super::ttl::SmartTtlPolicy;
use super::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL, HOT_KEY_LIMIT, RESPONSE_SAMPLE_LIMIT, TAG_INDEX_PREFIX};

/// Bounds required of cached values
pub trait CacheValue: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// L1 configuration
    pub l1: L1Config,
    /// Base TTL before namespace scaling
    pub default_ttl: Duration,
    /// Response-time samples kept
    pub response_samples: usize,
    /// Hot keys reported in stats
    pub hot_key_limit: usize,
    /// Staleness sweep period
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: L1Config::default(),
            default_ttl: DEFAULT_TTL,
            response_samples: RESPONSE_SAMPLE_LIMIT,
            hot_key_limit: HOT_KEY_LIMIT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Result of a tag invalidation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Entries dropped from L1
    pub l1_removed: usize,
    /// Keys (data and tag markers) deleted from L2
    pub l2_removed: u64,
    /// Tags whose L2 step failed
    pub l2_failed_tags: Vec<String>,
}

/// Two-tier cache facade
pub struct TieredCache<T: CacheValue> {
    l1: LocalCache<T>,
    l2: Arc<dyn DistributedStore>,
    serializer: Arc<dyn Serializer<CachedValue<T>>>,
    ttl_policy: SmartTtlPolicy,
    telemetry: CacheTelemetry,
    config: CacheConfig,
}

impl<T: CacheValue> TieredCache<T> {
    /// Create a cache over `l2` with default configuration and JSON encoding
    pub fn new(l2: Arc<dyn DistributedStore>) -> Self {
        Self::with_config(CacheConfig::default(), l2)
    }

    /// Create a cache with custom configuration and JSON encoding
    pub fn with_config(config: CacheConfig, l2: Arc<dyn DistributedStore>) -> Self {
        Self::with_serializer(config, l2, Arc::new(JsonSerializer))
    }

    /// Create a cache with a custom payload encoding
    pub fn with_serializer(
        config: CacheConfig,
        l2: Arc<dyn DistributedStore>,
        serializer: Arc<dyn Serializer<CachedValue<T>>>,
    ) -> Self {
        Self {
            l1: LocalCache::with_config(config.l1.clone()),
            l2,
            serializer,
            ttl_policy: SmartTtlPolicy::default(),
            telemetry: CacheTelemetry::with_sample_limit(config.response_samples),
            config,
        }
    }

    /// Create with an in-memory L2 (for testing)
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDistributedStore::new()))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value from L1, then L2. A clean miss is `None`.
    pub async fn get(&self, key: &str, options: &CacheOptions) -> Option<T> {
        let start = Instant::now();
        let full_key = options.full_key(key);

        let found = self.lookup(&full_key).await;
        match found {
            Some(_) => self.telemetry.record_hit(),
            None => self.telemetry.record_miss(),
        }
        self.telemetry.record_response_time(start.elapsed());

        found
    }

    /// Get a value, computing and storing it on a full miss.
    ///
    /// A fallback error is returned unchanged and nothing is cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        options: &CacheOptions,
        fallback: F,
    ) -> std::result::Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
    {
        let start = Instant::now();
        let full_key = options.full_key(key);

        if let Some(value) = self.lookup(&full_key).await {
            self.telemetry.record_hit();
            self.telemetry.record_response_time(start.elapsed());
            return Ok(Some(value));
        }
        self.telemetry.record_miss();

        let computed = fallback().await;
        if let Ok(Some(value)) = &computed {
            debug!(key = %full_key, "Caching fallback result");
            self.store(full_key, value.clone(), options).await;
        }

        self.telemetry.record_response_time(start.elapsed());
        computed
    }

    /// L1 then L2 with promotion; every L2 failure degrades to a miss
    async fn lookup(&self, full_key: &str) -> Option<T> {
        if let Some(value) = self.l1.get(full_key) {
            return Some(value);
        }

        match self.l2.get(full_key).await {
            Ok(Some(bytes)) => self.promote(full_key.to_string(), &bytes),
            Ok(None) => None,
            Err(e) => {
                self.telemetry.record_l2_error();
                warn!(key = %full_key, error = %e, "L2 read failed, treating as miss");
                None
            }
        }
    }

    /// Decode an L2 payload and copy it into L1
    fn promote(&self, full_key: String, bytes: &[u8]) -> Option<T> {
        match self.serializer.decode(bytes) {
            Ok(cached) => {
                let entry = CacheEntry::from_cached(cached);
                let value = entry.data().clone();
                self.l1.insert(full_key, entry);
                self.telemetry.record_promotion();
                Some(value)
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Discarding undecodable L2 payload");
                None
            }
        }
    }

    /// Batch get: L1 first, one L2 round-trip for the rest, results aligned
    /// with `keys`
    pub async fn mget<S: AsRef<str>>(&self, keys: &[S], options: &CacheOptions) -> Vec<Option<T>> {
        let start = Instant::now();
        let full_keys: Vec<String> = keys.iter().map(|k| options.full_key(k.as_ref())).collect();

        let mut results: Vec<Option<T>> = full_keys.iter().map(|k| self.l1.get(k)).collect();
        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let missing_keys: Vec<String> = missing.iter().map(|&i| full_keys[i].clone()).collect();

            match self.l2.mget(&missing_keys).await {
                Ok(values) => {
                    for (&index, value) in missing.iter().zip(values) {
                        if let Some(bytes) = value {
                            results[index] = self.promote(full_keys[index].clone(), &bytes);
                        }
                    }
                }
                Err(e) => {
                    self.telemetry.record_l2_error();
                    warn!(keys = missing_keys.len(), error = %e, "L2 batch read failed, treating as misses");
                }
            }
        }

        for result in &results {
            match result {
                Some(_) => self.telemetry.record_hit(),
                None => self.telemetry.record_miss(),
            }
        }
        self.telemetry.record_response_time(start.elapsed());

        results
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write-through to both tiers. L2 failures are logged, never returned.
    pub async fn set(&self, key: &str, value: T, options: &CacheOptions) {
        self.store(options.full_key(key), value, options).await;
    }

    async fn store(&self, full_key: String, value: T, options: &CacheOptions) {
        let ttl = self.resolve_ttl(&full_key, options);
        let entry = CacheEntry::new(value, options.tags.iter().cloned(), options.version.clone());
        let envelope = entry.to_cached();

        self.l1.insert(full_key.clone(), entry);

        let bytes = match self.serializer.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %full_key, error = %e, "Skipping L2 write, encode failed");
                return;
            }
        };

        if let Err(e) = self.l2.set(&full_key, bytes, ttl).await {
            self.telemetry.record_l2_error();
            warn!(key = %full_key, error = %e, "L2 write failed");
            return;
        }

        // Tag markers share the entry's TTL so they expire together
        for tag in &envelope.tags {
            let marker = tag_index_key(tag, &full_key);
            if let Err(e) = self.l2.set(&marker, Bytes::new(), ttl).await {
                self.telemetry.record_l2_error();
                warn!(key = %full_key, tag = %tag, error = %e, "L2 tag index write failed");
            }
        }
    }

    /// Explicit TTL wins, otherwise the smart policy scales the default
    pub fn resolve_ttl(&self, full_key: &str, options: &CacheOptions) -> Duration {
        options
            .ttl
            .unwrap_or_else(|| self.ttl_policy.calculate_ttl(full_key, self.config.default_ttl))
    }

    /// Smart TTL for `key` scaled from `base`
    pub fn calculate_ttl(&self, key: &str, base: Duration) -> Duration {
        self.ttl_policy.calculate_ttl(key, base)
    }

    /// Bulk programmatic warm; returns the number of entries written
    pub async fn warm_cache(&self, entries: Vec<WarmEntry<T>>) -> usize {
        let count = entries.len();
        for entry in entries {
            self.set(&entry.key, entry.value, &entry.options).await;
        }
        info!(entries = count, "Cache warmed");
        count
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Remove every entry carrying any of `tags` from both tiers.
    ///
    /// The two tiers are cleared one after the other, not atomically.
    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> InvalidationReport {
        let mut report = InvalidationReport {
            l1_removed: self.l1.remove_by_tags(tags),
            ..Default::default()
        };

        for tag in tags {
            let tag = tag.as_ref();
            match self.invalidate_l2_tag(tag).await {
                Ok(removed) => report.l2_removed += removed,
                Err(e) => {
                    self.telemetry.record_l2_error();
                    warn!(tag = %tag, error = %e, "L2 tag invalidation failed");
                    report.l2_failed_tags.push(tag.to_string());
                }
            }
        }

        info!(
            tags = tags.len(),
            l1_removed = report.l1_removed,
            l2_removed = report.l2_removed,
            "Invalidated by tags"
        );
        report
    }

    async fn invalidate_l2_tag(&self, tag: &str) -> crate::error::Result<u64> {
        let marker_prefix = tag_index_key(tag, "");
        let markers = self.l2.keys(&format!("{}*", marker_prefix)).await?;
        if markers.is_empty() {
            return Ok(0);
        }

        let mut doomed: Vec<String> = markers
            .iter()
            .filter_map(|m| m.strip_prefix(marker_prefix.as_str()))
            .map(str::to_string)
            .collect();
        doomed.extend(markers);

        self.l2.del(&doomed).await
    }

    /// Drop L1 entries idle beyond the staleness window
    pub fn sweep_stale(&self) -> usize {
        let removed = self.l1.sweep_stale(self.l1.stale_after());
        if removed > 0 {
            debug!(removed, "Swept stale L1 entries");
        }
        removed
    }

    /// Run `sweep_stale` every `sweep_interval` until `shutdown` fires
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match cache.upgrade() {
                            Some(cache) => { cache.sweep_stale(); }
                            None => break,
                        }
                    }
                }
            }
            debug!("L1 sweeper stopped");
        })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Current statistics
    pub fn stats(&self) -> CacheStats {
        self.telemetry.snapshot(
            self.l1.len(),
            self.l1.capacity(),
            self.l1.evictions(),
            self.l1.hot_keys(self.config.hot_key_limit),
        )
    }

    /// Advisory recommendations from the current statistics
    pub fn optimization_recommendations(&self) -> Vec<Recommendation> {
        self.stats().recommendations()
    }

    /// Get reference to L1 cache
    pub fn l1(&self) -> &LocalCache<T> {
        &self.l1
    }

    /// Get reference to the L2 store
    pub fn l2(&self) -> &Arc<dyn DistributedStore> {
        &self.l2
    }

    /// Get reference to the telemetry collector
    pub fn telemetry(&self) -> &CacheTelemetry {
        &self.telemetry
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

/// L2 key of the tag marker for `key`.
///
/// The tag segment is escaped so it never contains `:` or a glob
/// metacharacter; `tag:{tag}:*` then only lists markers of that exact tag.
fn tag_index_key(tag: &str, key: &str) -> String {
    format!("{}:{}:{}", TAG_INDEX_PREFIX, escape_tag(tag), key)
}

/// Percent-encode the characters that are separators or glob syntax in L2
/// key patterns
fn escape_tag(tag: &str) -> String {
    let mut escaped = String::with_capacity(tag.len());
    for c in tag.chars() {
        match c {
            '%' | ':' | '*' | '?' | '[' | ']' | '\\' => {
                escaped.push_str(&format!("%{:02X}", c as u32));
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

// =============================================================================
// Tests
// =============================================================================
