//! Service Configuration
//!
//! Optional YAML file; every field has a default so an empty document (or no
//! file at all) yields the stock setup.
//!
//! ```yaml
//! cache:
//!   l1_capacity: 1000
//!   eviction_batch_size: 100
//!   default_ttl_secs: 3600
//!   stale_after_secs: 3600
//!   sweep_interval_secs: 600
//! warming:
//!   enabled: true
//!   critical_concurrency: 4
//!   guard_mode: per_strategy
//!   disabled_strategies: [curriculum-levels]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{
    CacheConfig, L1Config, DEFAULT_EVICTION_BATCH, DEFAULT_L1_CAPACITY, DEFAULT_STALE_AFTER,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL, HOT_KEY_LIMIT, MAX_TTL, RESPONSE_SAMPLE_LIMIT,
};
use crate::error::{Error, Result};
use crate::warming::{GuardMode, SchedulerConfig, DEFAULT_CRITICAL_CONCURRENCY};

/// Top-level service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub cache: CacheSection,
    pub warming: WarmingSection,
}

/// `cache:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub l1_capacity: usize,
    pub eviction_batch_size: usize,
    pub default_ttl_secs: u64,
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
    pub response_samples: usize,
    pub hot_key_limit: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            l1_capacity: DEFAULT_L1_CAPACITY,
            eviction_batch_size: DEFAULT_EVICTION_BATCH,
            default_ttl_secs: DEFAULT_TTL.as_secs(),
            stale_after_secs: DEFAULT_STALE_AFTER.as_secs(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            response_samples: RESPONSE_SAMPLE_LIMIT,
            hot_key_limit: HOT_KEY_LIMIT,
        }
    }
}

/// `warming:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmingSection {
    /// Start the scheduler at all
    pub enabled: bool,
    pub critical_concurrency: usize,
    pub guard_mode: GuardMode,
    /// Built-in strategies registered disabled
    pub disabled_strategies: Vec<String>,
}

impl Default for WarmingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            critical_concurrency: DEFAULT_CRITICAL_CONCURRENCY,
            guard_mode: GuardMode::default(),
            disabled_strategies: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as a map
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.l1_capacity == 0 {
            return Err(Error::Config("cache.l1_capacity must be > 0".into()));
        }
        if cache.eviction_batch_size == 0 {
            return Err(Error::Config("cache.eviction_batch_size must be > 0".into()));
        }
        if cache.eviction_batch_size > cache.l1_capacity {
            return Err(Error::Config(
                "cache.eviction_batch_size must not exceed cache.l1_capacity".into(),
            ));
        }
        if cache.default_ttl_secs == 0 {
            return Err(Error::Config("cache.default_ttl_secs must be > 0".into()));
        }
        if cache.default_ttl_secs > MAX_TTL.as_secs() {
            return Err(Error::Config(format!(
                "cache.default_ttl_secs must be <= {}",
                MAX_TTL.as_secs()
            )));
        }
        if cache.sweep_interval_secs == 0 {
            return Err(Error::Config("cache.sweep_interval_secs must be > 0".into()));
        }
        if self.warming.critical_concurrency == 0 {
            return Err(Error::Config("warming.critical_concurrency must be > 0".into()));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        let cache = &self.cache;
        CacheConfig {
            l1: L1Config {
                capacity: cache.l1_capacity,
                eviction_batch_size: cache.eviction_batch_size,
                stale_after: Duration::from_secs(cache.stale_after_secs),
            },
            default_ttl: Duration::from_secs(cache.default_ttl_secs),
            response_samples: cache.response_samples,
            hot_key_limit: cache.hot_key_limit,
            sweep_interval: Duration::from_secs(cache.sweep_interval_secs),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            critical_concurrency: self.warming.critical_concurrency,
            guard_mode: self.warming.guard_mode,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_document_is_default() {
        let config = ServiceConfig::from_yaml("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.cache_config().l1.capacity, 1000);
        assert_eq!(config.cache_config().default_ttl, Duration::from_secs(3600));
        assert_eq!(config.scheduler_config().guard_mode, GuardMode::PerStrategy);
    }

    #[test]
    fn test_partial_document() {
        let yaml = r#"
cache:
  l1_capacity: 500
  eviction_batch_size: 50
warming:
  guard_mode: global
  disabled_strategies: [curriculum-levels]
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.cache.l1_capacity, 500);
        assert_eq!(config.cache.sweep_interval_secs, 600);
        assert_eq!(config.warming.guard_mode, GuardMode::Global);
        assert!(config.warming.enabled);
        assert_eq!(config.warming.disabled_strategies, vec!["curriculum-levels"]);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = ServiceConfig::from_yaml("cache:\n  l1_capacity: 0\n");
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_rejects_zero_eviction_batch() {
        let result = ServiceConfig::from_yaml("cache:\n  eviction_batch_size: 0\n");
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_rejects_oversized_ttl() {
        let result = ServiceConfig::from_yaml("cache:\n  default_ttl_secs: 18446744073709551615\n");
        assert_matches!(result, Err(Error::Config(_)));

        let year = format!("cache:\n  default_ttl_secs: {}\n", MAX_TTL.as_secs());
        assert!(ServiceConfig::from_yaml(&year).is_ok());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let result = ServiceConfig::from_yaml("warming:\n  critical_concurrency: 0\n");
        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = ServiceConfig::from_yaml("cache: [not, a, map]");
        assert_matches!(result, Err(Error::Yaml(_)));
    }

    #[test]
    fn test_missing_file() {
        let result = ServiceConfig::from_file("/nonexistent/edcache.yaml");
        assert_matches!(result, Err(Error::Io(_)));
    }
}
