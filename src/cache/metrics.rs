//! Cache Telemetry
//!
//! Request counters, a bounded response-time sample buffer and advisory
//! recommendations derived from them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::l1::HotKey;
use super::RESPONSE_SAMPLE_LIMIT;

/// Hit ratio (percent) under which warming is advised
pub const MIN_HEALTHY_HIT_RATIO: f64 = 70.0;

/// Average response time (ms) above which transport is flagged
pub const MAX_HEALTHY_RESPONSE_MS: f64 = 100.0;

/// L1 fill ratio above which the local limit is flagged
pub const MAX_HEALTHY_L1_FILL: f64 = 0.8;

/// Cache telemetry collector
#[derive(Debug)]
pub struct CacheTelemetry {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    l2_errors: AtomicU64,
    promotions: AtomicU64,
    response_times: Mutex<VecDeque<Duration>>,
    sample_limit: usize,
}

impl Default for CacheTelemetry {
    fn default() -> Self {
        Self::with_sample_limit(RESPONSE_SAMPLE_LIMIT)
    }
}

impl CacheTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_limit(sample_limit: usize) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            l2_errors: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            response_times: Mutex::new(VecDeque::with_capacity(sample_limit)),
            sample_limit,
        }
    }

    pub fn record_hit(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_error(&self) {
        self.l2_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a sample, dropping the oldest past the limit
    pub fn record_response_time(&self, duration: Duration) {
        if self.sample_limit == 0 {
            return;
        }
        let mut samples = self.response_times.lock();
        if samples.len() == self.sample_limit {
            samples.pop_front();
        }
        samples.push_back(duration);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn l2_errors(&self) -> u64 {
        self.l2_errors.load(Ordering::Relaxed)
    }

    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    pub fn sample_count(&self) -> usize {
        self.response_times.lock().len()
    }

    /// Hit ratio in percent (0 when nothing was requested)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.cache_hits() as f64 / total as f64 * 100.0
        }
    }

    /// Mean of the buffered samples in milliseconds
    pub fn avg_response_time_ms(&self) -> f64 {
        let samples = self.response_times.lock();
        if samples.is_empty() {
            return 0.0;
        }
        let total: Duration = samples.iter().sum();
        total.as_secs_f64() * 1000.0 / samples.len() as f64
    }

    /// Snapshot combined with the L1 figures owned by the facade
    pub fn snapshot(
        &self,
        memory_cache_size: usize,
        memory_cache_capacity: usize,
        l1_evictions: u64,
        hot_keys: Vec<HotKey>,
    ) -> CacheStats {
        CacheStats {
            total_requests: self.total_requests(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            hit_ratio: self.hit_ratio(),
            memory_cache_size,
            memory_cache_capacity,
            avg_response_time_ms: self.avg_response_time_ms(),
            hot_keys,
            l2_errors: self.l2_errors(),
            promotions: self.promotions(),
            l1_evictions,
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percent, 0-100
    pub hit_ratio: f64,
    pub memory_cache_size: usize,
    pub memory_cache_capacity: usize,
    pub avg_response_time_ms: f64,
    pub hot_keys: Vec<HotKey>,
    pub l2_errors: u64,
    pub promotions: u64,
    pub l1_evictions: u64,
}

impl CacheStats {
    /// Advisory findings; never acted on automatically
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut out = Vec::new();

        if self.total_requests > 0 && self.hit_ratio < MIN_HEALTHY_HIT_RATIO {
            out.push(Recommendation::LowHitRatio {
                hit_ratio: self.hit_ratio,
            });
        }

        if self.avg_response_time_ms > MAX_HEALTHY_RESPONSE_MS {
            out.push(Recommendation::SlowResponses {
                avg_response_time_ms: self.avg_response_time_ms,
            });
        }

        if self.memory_cache_size as f64 > self.memory_cache_capacity as f64 * MAX_HEALTHY_L1_FILL {
            out.push(Recommendation::LocalCacheNearCapacity {
                size: self.memory_cache_size,
                capacity: self.memory_cache_capacity,
            });
        }

        out
    }
}

/// Optimization advisory
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    LowHitRatio { hit_ratio: f64 },
    SlowResponses { avg_response_time_ms: f64 },
    LocalCacheNearCapacity { size: usize, capacity: usize },
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::LowHitRatio { hit_ratio } => write!(
                f,
                "Hit ratio is {:.1}%: increase TTL or warm more aggressively",
                hit_ratio
            ),
            Recommendation::SlowResponses {
                avg_response_time_ms,
            } => write!(
                f,
                "Average response time is {:.1}ms: optimize serialization/transport",
                avg_response_time_ms
            ),
            Recommendation::LocalCacheNearCapacity { size, capacity } => write!(
                f,
                "Local cache holds {}/{} entries: reduce local cache limit or add eviction pressure",
                size, capacity
            ),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stats(requests: u64, hits: u64, size: usize, avg_ms: f64) -> CacheStats {
        CacheStats {
            total_requests: requests,
            cache_hits: hits,
            cache_misses: requests - hits,
            hit_ratio: if requests == 0 {
                0.0
            } else {
                hits as f64 / requests as f64 * 100.0
            },
            memory_cache_size: size,
            memory_cache_capacity: 1000,
            avg_response_time_ms: avg_ms,
            hot_keys: Vec::new(),
            l2_errors: 0,
            promotions: 0,
            l1_evictions: 0,
        }
    }

    #[test]
    fn test_telemetry_creation() {
        let telemetry = CacheTelemetry::new();
        assert_eq!(telemetry.total_requests(), 0);
        assert_eq!(telemetry.hit_ratio(), 0.0);
        assert_eq!(telemetry.avg_response_time_ms(), 0.0);
    }

    #[test]
    fn test_hit_tracking() {
        let telemetry = CacheTelemetry::new();
        telemetry.record_hit();
        telemetry.record_hit();
        telemetry.record_hit();
        telemetry.record_miss();

        assert_eq!(telemetry.total_requests(), 4);
        assert_eq!(telemetry.cache_misses(), 1);
        assert!((telemetry.hit_ratio() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_response_time_average() {
        let telemetry = CacheTelemetry::new();
        telemetry.record_response_time(Duration::from_millis(10));
        telemetry.record_response_time(Duration::from_millis(30));

        assert!((telemetry.avg_response_time_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let telemetry = CacheTelemetry::with_sample_limit(3);
        for ms in [100, 1, 2, 3] {
            telemetry.record_response_time(Duration::from_millis(ms));
        }

        assert_eq!(telemetry.sample_count(), 3);
        assert!((telemetry.avg_response_time_ms() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_recommendations_when_healthy() {
        assert!(stats(100, 90, 100, 5.0).recommendations().is_empty());
    }

    #[test]
    fn test_no_hit_ratio_advice_without_traffic() {
        assert!(stats(0, 0, 0, 0.0).recommendations().is_empty());
    }

    #[test]
    fn test_all_recommendations() {
        let recs = stats(100, 50, 900, 150.0).recommendations();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0], Recommendation::LowHitRatio { hit_ratio: 50.0 });
        assert!(recs[0].to_string().contains("increase TTL or warm more aggressively"));
        assert!(recs[1].to_string().contains("optimize serialization/transport"));
        assert!(recs[2].to_string().contains("reduce local cache limit"));
    }

    #[test]
    fn test_fill_threshold_is_strict() {
        // Exactly 80% does not trigger
        assert!(stats(10, 10, 800, 0.0).recommendations().is_empty());
        assert_eq!(stats(10, 10, 801, 0.0).recommendations().len(), 1);
    }

    #[test]
    fn test_recommendation_serialization() {
        let json = serde_json::to_string(&Recommendation::LocalCacheNearCapacity {
            size: 900,
            capacity: 1000,
        })
        .unwrap();
        assert!(json.contains("\"kind\":\"local_cache_near_capacity\""));
    }

    proptest! {
        #[test]
        fn prop_samples_never_exceed_limit(limit in 1usize..50, n in 0usize..200) {
            let telemetry = CacheTelemetry::with_sample_limit(limit);
            for i in 0..n {
                telemetry.record_response_time(Duration::from_micros(i as u64));
            }
            prop_assert_eq!(telemetry.sample_count(), n.min(limit));
        }
    }
}
