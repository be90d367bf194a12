//! Warming Strategies
//!
//! A strategy is a named, prioritized routine that fills the cache on a fixed
//! interval. It never overlaps with itself: a run only starts after winning
//! the strategy's running flag.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Result;

/// Strategy priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmingPriority {
    /// Runs in the startup bootstrap and on its interval
    Critical,
    /// Runs on its interval only
    Important,
}

impl std::fmt::Display for WarmingPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarmingPriority::Critical => write!(f, "critical"),
            WarmingPriority::Important => write!(f, "important"),
        }
    }
}

/// The work a strategy performs; returns the number of entries written
#[async_trait]
pub trait WarmAction: Send + Sync {
    async fn execute(&self) -> Result<usize>;
}

/// Adapts an async closure into a [`WarmAction`]
pub struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> WarmAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<usize>> + Send + 'static,
{
    async fn execute(&self) -> Result<usize> {
        (self.0)().await
    }
}

/// Outcome history of a strategy
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunHistory {
    pub run_count: u64,
    pub failure_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_items: Option<usize>,
}

/// A registered warming strategy
pub struct WarmingStrategy {
    name: String,
    priority: WarmingPriority,
    interval: Duration,
    enabled: AtomicBool,
    running: AtomicBool,
    action: Arc<dyn WarmAction>,
    history: Mutex<RunHistory>,
}

impl WarmingStrategy {
    /// Create an enabled strategy
    pub fn new<A>(name: impl Into<String>, priority: WarmingPriority, interval: Duration, action: A) -> Self
    where
        A: WarmAction + 'static,
    {
        Self {
            name: name.into(),
            priority,
            interval,
            enabled: AtomicBool::new(true),
            running: AtomicBool::new(false),
            action: Arc::new(action),
            history: Mutex::new(RunHistory::default()),
        }
    }

    /// Create a strategy from an async closure
    pub fn from_fn<F, Fut>(name: impl Into<String>, priority: WarmingPriority, interval: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<usize>> + Send + 'static,
    {
        Self::new(name, priority, interval, FnAction(f))
    }

    /// Register the strategy disabled
    pub fn disabled(self) -> Self {
        self.enabled.store(false, Ordering::Relaxed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> WarmingPriority {
        self.priority
    }

    pub fn is_critical(&self) -> bool {
        self.priority == WarmingPriority::Critical
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the running flag; `None` while a run is in flight
    pub(crate) fn try_begin(&self) -> Option<RunGuard<'_>> {
        RunGuard::try_acquire(&self.running)
    }

    pub(crate) async fn execute(&self) -> Result<usize> {
        self.action.execute().await
    }

    pub(crate) fn record_success(&self, items: usize, duration: Duration) {
        let mut history = self.history.lock();
        history.run_count += 1;
        history.last_run = Some(Utc::now());
        history.last_duration_ms = Some(duration.as_millis() as u64);
        history.last_error = None;
        history.last_items = Some(items);
    }

    pub(crate) fn record_failure(&self, error: String, duration: Duration) {
        let mut history = self.history.lock();
        history.run_count += 1;
        history.failure_count += 1;
        history.last_run = Some(Utc::now());
        history.last_duration_ms = Some(duration.as_millis() as u64);
        history.last_error = Some(error);
        history.last_items = None;
    }

    /// Snapshot of the run history
    pub fn history(&self) -> RunHistory {
        self.history.lock().clone()
    }
}

impl std::fmt::Debug for WarmingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmingStrategy")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("interval", &self.interval)
            .field("enabled", &self.is_enabled())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Holds a running flag; clears it on drop, including on panic
pub(crate) struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Tests
// =============================================================================
