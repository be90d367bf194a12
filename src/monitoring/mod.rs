//! Monitoring
//!
//! Health probes and Prometheus exposition for the cache service.

mod exporter;
mod health;

pub use exporter::{CacheExporter, CONTENT_TYPE, NAMESPACE};
pub use health::{HealthCheck, HealthCheckResult, HealthResponse, HealthStatus};
