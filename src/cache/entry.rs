//! Cache Entry Types
//!
//! The L1 entry, its serialized L2 envelope and the per-call options.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-call cache options (prefix, tags, TTL override, version)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Namespace prefix; the stored key is `prefix:key`
    pub prefix: Option<String>,
    /// Invalidation tags attached on write
    pub tags: Vec<String>,
    /// Explicit TTL, bypasses the smart TTL policy
    pub ttl: Option<Duration>,
    /// Caller-defined format version, opaque to the cache
    pub version: Option<String>,
}

impl CacheOptions {
    /// Empty options (no prefix, no tags, smart TTL)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Key as stored in both tiers
    pub fn full_key(&self, key: &str) -> String {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, key),
            _ => key.to_string(),
        }
    }
}

/// Serialized form of an entry as written to L2
///
/// Carries the tags so an entry promoted back into L1 can still be invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// L1 cache entry with access tracking
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    data: T,
    /// Creation time (diagnostics only, never used for expiry)
    timestamp: DateTime<Utc>,
    version: Option<String>,
    tags: BTreeSet<String>,
    hit_count: u64,
    last_accessed: Instant,
    /// Monotonic access order, breaks ties between equal instants
    access_tick: u64,
}

impl<T> CacheEntry<T> {
    /// Create a new entry stamped with the current time
    pub fn new<I, S>(data: T, tags: I, version: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            data,
            timestamp: Utc::now(),
            version,
            tags: tags.into_iter().map(Into::into).collect(),
            hit_count: 0,
            last_accessed: Instant::now(),
            access_tick: 0,
        }
    }

    /// Rebuild an entry from its L2 envelope
    pub fn from_cached(cached: CachedValue<T>) -> Self {
        Self {
            data: cached.data,
            timestamp: cached.timestamp,
            version: cached.version,
            tags: cached.tags.into_iter().collect(),
            hit_count: 0,
            last_accessed: Instant::now(),
            access_tick: 0,
        }
    }

    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[inline]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[inline]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    #[inline]
    pub fn last_accessed(&self) -> Instant {
        self.last_accessed
    }

    #[inline]
    pub fn access_tick(&self) -> u64 {
        self.access_tick
    }

    /// Time since the last read or write
    pub fn idle_for(&self) -> Duration {
        self.last_accessed.elapsed()
    }

    /// True when any of `tags` is attached to this entry
    pub fn has_any_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.tags.contains(t.as_ref()))
    }

    /// Record a read hit and return the new hit count
    pub(crate) fn record_access(&mut self, tick: u64) -> u64 {
        self.hit_count += 1;
        self.touch(tick);
        self.hit_count
    }

    /// Refresh recency without counting a hit
    pub(crate) fn touch(&mut self, tick: u64) {
        self.last_accessed = Instant::now();
        self.access_tick = tick;
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        if let Some(earlier) = self.last_accessed.checked_sub(by) {
            self.last_accessed = earlier;
        }
    }
}

impl<T: Clone> CacheEntry<T> {
    /// Envelope for the L2 write
    pub fn to_cached(&self) -> CachedValue<T> {
        CachedValue {
            data: self.data.clone(),
            timestamp: self.timestamp,
            version: self.version.clone(),
            tags: self.tags.iter().cloned().collect(),
        }
    }
}

/// One item of a bulk `warm_cache` call
#[derive(Debug, Clone)]
pub struct WarmEntry<T> {
    pub key: String,
    pub value: T,
    pub options: CacheOptions,
}

impl<T> WarmEntry<T> {
    pub fn new(key: impl Into<String>, value: T, options: CacheOptions) -> Self {
        Self {
            key: key.into(),
            value,
            options,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
