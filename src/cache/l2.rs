//! L2 Cache - Distributed Store
//!
//! Shared key-value store with native TTL, reached through a narrow async
//! trait. The store owns expiry and capacity; the facade never manages them.
//!
//! # Design
//!
//! - Values are opaque bytes; encoding belongs to the facade's serializer
//! - `mget` answers in input order so the facade can align batch results
//! - `keys` takes a glob pattern (`*`, `?`) used for tag invalidation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{Error, Result};

/// Distributed store trait
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Get a value
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Set a value with a TTL
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Get many values in one round-trip, answered in input order
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>>;

    /// List keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Get store statistics
    fn stats(&self) -> StoreStats {
        StoreStats::default()
    }
}

/// Distributed store statistics
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Read operations (get and mget calls)
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

/// Glob match supporting `*` (any run) and `?` (one char)
pub fn matches_pattern(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = candidate.chars().collect();

    let (mut pi, mut ci) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while ci < c.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = ci;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ci = resume;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

struct StoredValue {
    data: Bytes,
    /// `None` when the TTL is past the clock's range
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory distributed store for tests and single-node deployments
/// Uses DashMap for lock-free concurrent access
pub struct InMemoryDistributedStore {
    storage: DashMap<String, StoredValue>,
    /// When set, every call fails as if the store were unreachable
    unavailable: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl Default for InMemoryDistributedStore {
    fn default() -> Self {
        Self {
            storage: DashMap::new(),
            unavailable: AtomicBool::new(false),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }
}

impl InMemoryDistributedStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or recovery)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.storage.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of a key (`Duration::MAX` when it never expires)
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.storage.get(key).filter(|v| !v.is_expired()).map(|v| {
            v.expires_at
                .map_or(Duration::MAX, |at| at.saturating_duration_since(Instant::now()))
        })
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::Store("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read_live(&self, key: &str) -> Option<Bytes> {
        let expired = match self.storage.get(key) {
            Some(value) if !value.is_expired() => return Some(value.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.storage.remove_if(key, |_, v| v.is_expired());
        }
        None
    }
}

#[async_trait]
impl DistributedStore for InMemoryDistributedStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.read_live(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.storage.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(keys.iter().map(|k| self.read_live(k)).collect())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self
            .storage
            .iter()
            .filter(|e| !e.value().is_expired() && matches_pattern(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.check_available()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(keys
            .iter()
            .filter(|k| self.storage.remove(k.as_str()).is_some())
            .count() as u64)
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
