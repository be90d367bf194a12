//! edcache - Tiered Cache and Warming Scheduler
//!
//! A two-tier cache for the learning platform's read path: an in-process L1
//! map in front of a distributed L2 store, with namespace-aware TTLs,
//! tag-based invalidation and a scheduler that pre-loads the working set.
//!
//! # Architecture
//!
//! ```text
//! Request ──▶ TieredCache ──▶ L1 (LRU) ──▶ L2 (DistributedStore) ──▶ fallback
//!                  ▲
//!                  │ set (tags, smart TTL)
//!        WarmingScheduler ──▶ strategies ──▶ DataRepository
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`cache`] - L1/L2 tiers, facade, telemetry, memoization
//! - [`config`] - YAML service configuration
//! - [`domain`] - Ports the cache and warmers depend on
//! - [`error`] - Error types
//! - [`monitoring`] - Health probes and Prometheus exporter
//! - [`warming`] - Warming strategies and scheduler

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod monitoring;
pub mod warming;

// Re-export commonly used types
pub use cache::{CacheOptions, CacheStats, DistributedStore, Recommendation, TieredCache};
pub use config::ServiceConfig;
pub use domain::{DataRepository, Row};
pub use error::{Error, Result};
pub use warming::{WarmingScheduler, WarmingStrategy, WarmingSummary};
