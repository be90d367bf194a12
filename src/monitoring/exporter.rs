//! Prometheus Exporter
//!
//! Mirrors cache statistics and per-strategy warming counters into gauges of
//! a dedicated registry. Values are copied from snapshots on each scrape.

use prometheus::{Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::CacheStats;
use crate::error::Result;
use crate::warming::WarmingStatus;

/// Metric name prefix
pub const NAMESPACE: &str = "edcache";

/// Content type of [`CacheExporter::render`]
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Cache and warming metrics exporter
pub struct CacheExporter {
    registry: Registry,
    requests: IntGauge,
    hits: IntGauge,
    misses: IntGauge,
    hit_ratio: Gauge,
    l1_entries: IntGauge,
    l1_capacity: IntGauge,
    l1_evictions: IntGauge,
    avg_response_ms: Gauge,
    l2_errors: IntGauge,
    promotions: IntGauge,
    warming_ready: IntGauge,
    strategy_runs: IntGaugeVec,
    strategy_failures: IntGaugeVec,
    strategy_running: IntGaugeVec,
    strategy_last_duration_ms: IntGaugeVec,
}

impl CacheExporter {
    /// Create the exporter and register every metric
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), None)?;

        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let gauge = |name: &str, help: &str| -> Result<Gauge> {
            let gauge = Gauge::new(name, help)?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };
        let strategy_gauge = |name: &str, help: &str| -> Result<IntGaugeVec> {
            let vec = IntGaugeVec::new(Opts::new(name, help), &["strategy"])?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        Ok(Self {
            requests: int_gauge("cache_requests", "Cache lookups since start")?,
            hits: int_gauge("cache_hits", "Lookups answered by L1 or L2")?,
            misses: int_gauge("cache_misses", "Lookups answered by neither tier")?,
            hit_ratio: gauge("cache_hit_ratio_percent", "Hit ratio in percent")?,
            l1_entries: int_gauge("l1_entries", "Entries held in the local tier")?,
            l1_capacity: int_gauge("l1_capacity", "Local tier capacity")?,
            l1_evictions: int_gauge("l1_evictions", "Entries removed by LRU eviction")?,
            avg_response_ms: gauge(
                "cache_avg_response_ms",
                "Mean lookup latency over the sample window",
            )?,
            l2_errors: int_gauge("l2_errors", "Distributed store failures degraded to misses")?,
            promotions: int_gauge("l2_promotions", "L2 hits copied into L1")?,
            warming_ready: int_gauge("warming_ready", "1 once critical warming has completed")?,
            strategy_runs: strategy_gauge("warming_runs", "Warming runs per strategy")?,
            strategy_failures: strategy_gauge(
                "warming_failures",
                "Failed warming runs per strategy",
            )?,
            strategy_running: strategy_gauge(
                "warming_running",
                "1 while the strategy is executing",
            )?,
            strategy_last_duration_ms: strategy_gauge(
                "warming_last_duration_ms",
                "Duration of the latest run",
            )?,
            registry,
        })
    }

    /// Copy a cache stats snapshot
    pub fn update(&self, stats: &CacheStats) {
        self.requests.set(stats.total_requests as i64);
        self.hits.set(stats.cache_hits as i64);
        self.misses.set(stats.cache_misses as i64);
        self.hit_ratio.set(stats.hit_ratio);
        self.l1_entries.set(stats.memory_cache_size as i64);
        self.l1_capacity.set(stats.memory_cache_capacity as i64);
        self.l1_evictions.set(stats.l1_evictions as i64);
        self.avg_response_ms.set(stats.avg_response_time_ms);
        self.l2_errors.set(stats.l2_errors as i64);
        self.promotions.set(stats.promotions as i64);
    }

    /// Copy the scheduler status
    pub fn observe_warming(&self, status: &WarmingStatus) {
        self.warming_ready.set(i64::from(status.ready));

        for strategy in &status.strategies {
            let labels = [strategy.name.as_str()];
            self.strategy_runs
                .with_label_values(&labels)
                .set(strategy.history.run_count as i64);
            self.strategy_failures
                .with_label_values(&labels)
                .set(strategy.history.failure_count as i64);
            self.strategy_running
                .with_label_values(&labels)
                .set(i64::from(strategy.is_running));
            if let Some(ms) = strategy.history.last_duration_ms {
                self.strategy_last_duration_ms
                    .with_label_values(&labels)
                    .set(ms as i64);
            }
        }
    }

    /// Text exposition of the registry
    pub fn render(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheOptions, TieredCache};
    use crate::warming::{WarmingPriority, WarmingScheduler, WarmingStrategy};
    use std::time::Duration;

    #[tokio::test]
    async fn test_render_cache_stats() {
        let cache: TieredCache<u32> = TieredCache::in_memory();
        cache.set("a", 1, &CacheOptions::new()).await;
        cache.get("a", &CacheOptions::new()).await;
        cache.get("b", &CacheOptions::new()).await;

        let exporter = CacheExporter::new().unwrap();
        exporter.update(&cache.stats());
        let text = exporter.render().unwrap();

        assert!(text.contains("edcache_cache_hits 1"));
        assert!(text.contains("edcache_cache_misses 1"));
        assert!(text.contains("edcache_cache_hit_ratio_percent 50"));
        assert!(text.contains("edcache_l1_capacity 1000"));
    }

    #[tokio::test]
    async fn test_render_warming_status() {
        let scheduler = WarmingScheduler::default();
        scheduler
            .register(WarmingStrategy::from_fn(
                "popular-exercises",
                WarmingPriority::Critical,
                Duration::from_secs(60),
                || async { Ok(4) },
            ))
            .unwrap();
        scheduler.execute_critical_warming(None).await;

        let exporter = CacheExporter::new().unwrap();
        exporter.observe_warming(&scheduler.status());
        let text = exporter.render().unwrap();

        assert!(text.contains("edcache_warming_runs{strategy=\"popular-exercises\"} 1"));
        assert!(text.contains("edcache_warming_failures{strategy=\"popular-exercises\"} 0"));
        assert!(text.contains("edcache_warming_ready 0"));
    }

    #[test]
    fn test_exporters_are_independent() {
        // Separate registries, no global collisions
        assert!(CacheExporter::new().is_ok());
        assert!(CacheExporter::new().is_ok());
    }
}
