//! Two-Tier Cache System
//!
//! In-process L1 cache backed by a distributed L2 store, with smart TTL,
//! tag-based invalidation and hit/miss telemetry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                        Tiered Cache Facade                               │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  L1 Cache (in-process)          │  L2 Store (distributed)                │
//! │  ┌──────────────────────────┐   │  ┌──────────────────────────────────┐  │
//! │  │ Mutex<HashMap>           │   │  │ DistributedStore trait            │  │
//! │  │ LRU bulk eviction (10%)  │   │  │ native TTL, tag index markers     │  │
//! │  │ Capacity: 1000 entries   │   │  │ one round-trip per mget           │  │
//! │  └──────────────────────────┘   │  └──────────────────────────────────┘  │
//! │               │                 │                  │                     │
//! │               └─────── promote on L2 hit ──────────┘                     │
//! │                              │                                           │
//! │                 compute fallback on full miss                            │
//! │                 (stored at smart TTL)                                    │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Failure Model
//!
//! - L2 and serialization failures degrade to a miss and are logged
//! - Fallback failures propagate to the caller unchanged, nothing is cached

mod entry;
mod l1;
mod l2;
mod manager;
mod memoize;
mod metrics;
mod serializer;
mod ttl;

pub use entry::{CacheEntry, CacheOptions, CachedValue, WarmEntry};
pub use l1::{HotKey, L1Config, LocalCache};
pub use l2::{matches_pattern, DistributedStore, InMemoryDistributedStore, StoreStats};
pub use manager::{CacheConfig, CacheValue, InvalidationReport, TieredCache};
pub use memoize::{memoize, Memoized, Memoizer};
pub use metrics::{CacheStats, CacheTelemetry, Recommendation};
pub use serializer::{JsonSerializer, Serializer};
pub use ttl::{KeyNamespace, SmartTtlPolicy};

use std::time::Duration;

/// Default L1 capacity (entries)
pub const DEFAULT_L1_CAPACITY: usize = 1000;

/// Entries evicted per LRU pass (10% of the default capacity)
pub const DEFAULT_EVICTION_BATCH: usize = 100;

/// Default TTL before namespace scaling
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Upper bound of any computed TTL (one year)
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Response-time samples kept for the rolling average
pub const RESPONSE_SAMPLE_LIMIT: usize = 1000;

/// Number of keys reported as hot
pub const HOT_KEY_LIMIT: usize = 10;

/// L1 entries idle longer than this are removed by the sweeper
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// How often the sweeper runs
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Prefix of the L2 tag index markers (`tag:{tag}:{key}`)
pub const TAG_INDEX_PREFIX: &str = "tag";

// =============================================================================
// Tests
// =============================================================================
