//! Health Checks
//!
//! Liveness, warming readiness and a cache efficiency check derived from the
//! current statistics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    /// Serving, but the cache is not pulling its weight
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheckResult {
    fn new(name: &str, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

/// Overall health response; status is the worst of the checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthResponse {
    pub fn new(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Service health flags
pub struct HealthCheck {
    start_time: Instant,
    live: AtomicBool,
    /// Set once the critical warming bootstrap has completed
    ready: AtomicBool,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn liveness_check(&self) -> HealthCheckResult {
        let status = if self.is_live() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        HealthCheckResult::new("liveness", status, None)
    }

    pub fn readiness_check(&self) -> HealthCheckResult {
        if self.is_ready() {
            HealthCheckResult::new("readiness", HealthStatus::Healthy, None)
        } else {
            HealthCheckResult::new(
                "readiness",
                HealthStatus::Unhealthy,
                Some("Critical warming not complete".to_string()),
            )
        }
    }

    /// Degraded while the stats produce any recommendation
    pub fn cache_check(stats: &CacheStats) -> HealthCheckResult {
        let advice: Vec<String> = stats
            .recommendations()
            .iter()
            .map(ToString::to_string)
            .collect();

        if advice.is_empty() {
            HealthCheckResult::new("cache", HealthStatus::Healthy, None)
        } else {
            HealthCheckResult::new("cache", HealthStatus::Degraded, Some(advice.join("; ")))
        }
    }

    /// All checks; the cache check is included when stats are given
    pub fn check_all(&self, stats: Option<&CacheStats>) -> HealthResponse {
        let mut checks = vec![self.liveness_check(), self.readiness_check()];
        if let Some(stats) = stats {
            checks.push(Self::cache_check(stats));
        }
        HealthResponse::new(checks, self.uptime())
    }
}

impl Default for HealthCheck {
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
    use crate::cache::{CacheOptions, TieredCache};

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Unhealthy.is_operational());
        assert_eq!(HealthStatus::Degraded.to_string(), "Degraded");
    }

    #[test]
    fn test_not_ready_until_set() {
        let health = HealthCheck::new();
        assert!(health.is_live());
        assert_eq!(health.readiness_check().status, HealthStatus::Unhealthy);

        health.set_ready(true);
        assert_eq!(health.check_all(None).status, HealthStatus::Healthy);
    }

    #[test]
    fn test_liveness_down() {
        let health = HealthCheck::new();
        health.set_ready(true);
        health.set_live(false);
        assert_eq!(health.check_all(None).status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_cache_check_degraded_on_misses() {
        let cache: TieredCache<u32> = TieredCache::in_memory();
        let health = HealthCheck::new();
        health.set_ready(true);

        assert_eq!(HealthCheck::cache_check(&cache.stats()).status, HealthStatus::Healthy);

        cache.get("missing", &CacheOptions::new()).await;
        let response = health.check_all(Some(&cache.stats()));

        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.checks.len(), 3);
        assert!(response.checks[2]
            .message
            .as_deref()
            .unwrap()
            .contains("warm more aggressively"));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&HealthCheck::new().liveness_check()).unwrap();
        assert!(json.contains("Healthy"));
        assert!(!json.contains("message"));
    }
}
