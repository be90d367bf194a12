//! Error types for the tiered cache and warming scheduler

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache layer
#[derive(Error, Debug)]
pub enum Error {
    /// Distributed store unreachable or rejected the request
    #[error("Distributed store error: {0}")]
    Store(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization with {format} failed: {reason}")]
    Serialization { format: String, reason: String },

    /// Data repository query failed
    #[error("Repository query failed: {0}")]
    Repository(String),

    // =========================================================================
    // Warming Errors
    // =========================================================================
    /// No strategy registered under this name
    #[error("Warming strategy not found: {0}")]
    StrategyNotFound(String),

    /// A strategy with this name is already registered
    #[error("Warming strategy already registered: {0}")]
    DuplicateStrategy(String),

    /// start() called on a running scheduler
    #[error("Warming scheduler is already running")]
    SchedulerAlreadyRunning,

    /// Strategy execution failed
    #[error("Warming strategy {strategy} failed: {reason}")]
    WarmingFailed { strategy: String, reason: String },

    // =========================================================================
    // Service Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file parse error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
