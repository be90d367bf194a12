//! Warming Scheduler
//!
//! Owns the strategy registry and one timer task per enabled strategy.
//!
//! # Lifecycle
//!
//! ```text
//! register ──▶ start ──▶ critical bootstrap (bounded parallel, settle-all)
//!                  │                │
//!                  │                ▼
//!                  │           ready = true
//!                  ▼
//!      per-strategy interval timers (first tick one interval after start)
//!                  │
//!                stop ──▶ timers cancelled and joined
//! ```
//!
//! A failing or panicking strategy is logged, counted and never stops its
//! siblings or its own timer.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::{stream, FutureExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use super::strategy::{RunGuard, RunHistory, WarmingPriority, WarmingStrategy};
use crate::error::{Error, Result};

/// Default parallelism of the critical bootstrap
pub const DEFAULT_CRITICAL_CONCURRENCY: usize = 4;

/// How strategies are kept from overlapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    /// A strategy never overlaps with itself; different strategies may overlap
    #[default]
    PerStrategy,
    /// At most one strategy runs at a time
    Global,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Strategies run concurrently during the bootstrap
    pub critical_concurrency: usize,
    pub guard_mode: GuardMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            critical_concurrency: DEFAULT_CRITICAL_CONCURRENCY,
            guard_mode: GuardMode::default(),
        }
    }
}

/// Outcome counts of a critical warming batch
#[derive(Debug, Clone, Serialize)]
pub struct WarmingSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Disabled, or already running when the batch reached them
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Result of a single strategy run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded(usize),
    Failed(String),
    Skipped,
}

/// Per-strategy status entry
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub priority: WarmingPriority,
    pub interval_secs: u64,
    pub enabled: bool,
    pub is_running: bool,
    /// A timer task is registered for this strategy
    pub scheduled: bool,
    #[serde(flatten)]
    pub history: RunHistory,
}

/// Scheduler status
#[derive(Debug, Clone, Serialize)]
pub struct WarmingStatus {
    pub started: bool,
    pub ready: bool,
    pub guard_mode: GuardMode,
    pub strategies: Vec<StrategyStatus>,
}

struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Cache warming scheduler
pub struct WarmingScheduler {
    config: SchedulerConfig,
    strategies: RwLock<Vec<Arc<WarmingStrategy>>>,
    /// Shared by every run in `GuardMode::Global`
    global_guard: Arc<AtomicBool>,
    shutdown: Mutex<CancellationToken>,
    timers: Mutex<HashMap<String, TimerHandle>>,
    started: AtomicBool,
    ready: AtomicBool,
}

impl Default for WarmingScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl WarmingScheduler {
    /// Create an empty scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            strategies: RwLock::new(Vec::new()),
            global_guard: Arc::new(AtomicBool::new(false)),
            shutdown: Mutex::new(CancellationToken::new()),
            timers: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
        }
    }

    /// Create a scheduler with strategies already registered
    pub fn with_strategies(
        config: SchedulerConfig,
        strategies: impl IntoIterator<Item = WarmingStrategy>,
    ) -> Result<Self> {
        let scheduler = Self::new(config);
        for strategy in strategies {
            scheduler.register(strategy)?;
        }
        Ok(scheduler)
    }

    /// Register a strategy; names are unique and intervals non-zero.
    ///
    /// Registering on a started scheduler schedules the strategy right away.
    pub fn register(&self, strategy: WarmingStrategy) -> Result<Arc<WarmingStrategy>> {
        if strategy.interval().is_zero() {
            return Err(Error::Config(format!(
                "strategy {} has a zero interval",
                strategy.name()
            )));
        }

        let strategy = Arc::new(strategy);
        {
            let mut strategies = self.strategies.write();
            if strategies.iter().any(|s| s.name() == strategy.name()) {
                return Err(Error::DuplicateStrategy(strategy.name().to_string()));
            }
            strategies.push(strategy.clone());
        }

        debug!(
            strategy = %strategy.name(),
            priority = %strategy.priority(),
            interval_secs = strategy.interval().as_secs(),
            "Registered warming strategy"
        );

        if self.is_started() && strategy.is_enabled() {
            self.spawn_timer(strategy.clone());
        }
        Ok(strategy)
    }

    /// Look up a strategy by name
    pub fn strategy(&self, name: &str) -> Option<Arc<WarmingStrategy>> {
        self.strategies.read().iter().find(|s| s.name() == name).cloned()
    }

    fn find(&self, name: &str) -> Result<Arc<WarmingStrategy>> {
        self.strategy(name)
            .ok_or_else(|| Error::StrategyNotFound(name.to_string()))
    }

    /// Run the critical bootstrap, then schedule every enabled strategy.
    ///
    /// Returns the bootstrap summary; the scheduler reports ready afterwards.
    pub async fn start(&self) -> Result<WarmingSummary> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SchedulerAlreadyRunning);
        }
        *self.shutdown.lock() = CancellationToken::new();

        info!(
            strategies = self.strategies.read().len(),
            guard_mode = ?self.config.guard_mode,
            "Starting warming scheduler"
        );

        let summary = self.execute_critical_warming(None).await;
        self.ready.store(true, Ordering::Release);

        let enabled: Vec<Arc<WarmingStrategy>> = self
            .strategies
            .read()
            .iter()
            .filter(|s| s.is_enabled())
            .cloned()
            .collect();
        for strategy in enabled {
            self.spawn_timer(strategy);
        }

        Ok(summary)
    }

    /// Run strategies as one bounded-parallel batch and count the outcomes.
    ///
    /// With `None` every registered critical strategy is considered. Disabled
    /// strategies are skipped. Never fails: errors and panics are counted.
    pub async fn execute_critical_warming(
        &self,
        strategies: Option<&[Arc<WarmingStrategy>]>,
    ) -> WarmingSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("critical_warming", %run_id);

        async move {
            let start = Instant::now();
            let candidates: Vec<Arc<WarmingStrategy>> = match strategies {
                Some(list) => list.to_vec(),
                None => self
                    .strategies
                    .read()
                    .iter()
                    .filter(|s| s.is_critical())
                    .cloned()
                    .collect(),
            };

            let total = candidates.len();
            let (selected, disabled): (Vec<_>, Vec<_>) =
                candidates.into_iter().partition(|s| s.is_enabled());

            let concurrency = match self.config.guard_mode {
                GuardMode::Global => 1,
                GuardMode::PerStrategy => self.config.critical_concurrency.max(1),
            };
            let global = self.global_guard();

            let outcomes: Vec<RunOutcome> = stream::iter(selected.iter())
                .map(|strategy| run_strategy(strategy, global.as_deref()))
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut summary = WarmingSummary {
                run_id,
                total,
                successful: 0,
                failed: 0,
                skipped: disabled.len(),
                duration_ms: 0,
            };
            for outcome in &outcomes {
                match outcome {
                    RunOutcome::Succeeded(_) => summary.successful += 1,
                    RunOutcome::Failed(_) => summary.failed += 1,
                    RunOutcome::Skipped => summary.skipped += 1,
                }
            }
            summary.duration_ms = start.elapsed().as_millis() as u64;

            if summary.failed > 0 {
                warn!(
                    total = summary.total,
                    successful = summary.successful,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    duration_ms = summary.duration_ms,
                    "Critical warming finished with failures"
                );
            } else {
                info!(
                    total = summary.total,
                    successful = summary.successful,
                    skipped = summary.skipped,
                    duration_ms = summary.duration_ms,
                    "Critical warming finished"
                );
            }
            summary
        }
        .instrument(span)
        .await
    }

    /// Run one strategy now, outside its timer
    pub async fn run_now(&self, name: &str) -> Result<RunOutcome> {
        let strategy = self.find(name)?;
        let global = self.global_guard();
        Ok(run_strategy(&strategy, global.as_deref()).await)
    }

    /// Enable a strategy, scheduling it if the scheduler is started
    pub fn enable_strategy(&self, name: &str) -> Result<()> {
        let strategy = self.find(name)?;
        strategy.set_enabled(true);

        if self.is_started() && !self.timers.lock().contains_key(name) {
            self.spawn_timer(strategy);
        }
        info!(strategy = %name, "Warming strategy enabled");
        Ok(())
    }

    /// Disable a strategy and cancel its timer; an in-flight run completes
    pub fn disable_strategy(&self, name: &str) -> Result<()> {
        let strategy = self.find(name)?;
        strategy.set_enabled(false);

        if let Some(timer) = self.timers.lock().remove(name) {
            timer.token.cancel();
        }
        info!(strategy = %name, "Warming strategy disabled");
        Ok(())
    }

    /// Current scheduler and per-strategy state
    pub fn status(&self) -> WarmingStatus {
        let timers = self.timers.lock();
        let strategies = self
            .strategies
            .read()
            .iter()
            .map(|s| StrategyStatus {
                name: s.name().to_string(),
                priority: s.priority(),
                interval_secs: s.interval().as_secs(),
                enabled: s.is_enabled(),
                is_running: s.is_running(),
                scheduled: timers.contains_key(s.name()),
                history: s.history(),
            })
            .collect();

        WarmingStatus {
            started: self.is_started(),
            ready: self.is_ready(),
            guard_mode: self.config.guard_mode,
            strategies,
        }
    }

    /// Cancel every timer and wait for the tasks to exit
    pub async fn stop(&self) {
        self.shutdown.lock().cancel();
        let timers: Vec<(String, TimerHandle)> = self.timers.lock().drain().collect();

        for (name, timer) in timers {
            timer.token.cancel();
            if let Err(e) = timer.task.await {
                warn!(strategy = %name, error = %e, "Warming timer task ended abnormally");
            }
        }

        self.started.store(false, Ordering::Release);
        self.ready.store(false, Ordering::Release);
        info!("Warming scheduler stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// True once the critical bootstrap has completed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn global_guard(&self) -> Option<Arc<AtomicBool>> {
        match self.config.guard_mode {
            GuardMode::Global => Some(self.global_guard.clone()),
            GuardMode::PerStrategy => None,
        }
    }

    fn spawn_timer(&self, strategy: Arc<WarmingStrategy>) {
        let token = self.shutdown.lock().child_token();
        let global = self.global_guard();
        let name = strategy.name().to_string();
        let period = strategy.interval();

        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if strategy.is_enabled() {
                            run_strategy(&strategy, global.as_deref()).await;
                        }
                    }
                }
            }
            debug!(strategy = %strategy.name(), "Warming timer stopped");
        });

        let previous = self.timers.lock().insert(name, TimerHandle { token, task });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
    }
}

impl Drop for WarmingScheduler {
    fn drop(&mut self) {
        self.shutdown.get_mut().cancel();
    }
}

/// Run a strategy once under its guards, recording the outcome
#[instrument(skip_all, fields(strategy = %strategy.name(), run_id = %Uuid::new_v4()))]
async fn run_strategy(strategy: &WarmingStrategy, global: Option<&AtomicBool>) -> RunOutcome {
    let _global = match global {
        Some(flag) => match RunGuard::try_acquire(flag) {
            Some(guard) => Some(guard),
            None => {
                debug!("Another strategy is running, skipping");
                return RunOutcome::Skipped;
            }
        },
        None => None,
    };

    let Some(_guard) = strategy.try_begin() else {
        debug!("Previous run still in flight, skipping");
        return RunOutcome::Skipped;
    };

    let start = Instant::now();
    let result = AssertUnwindSafe(strategy.execute()).catch_unwind().await;
    let elapsed = start.elapsed();

    match result {
        Ok(Ok(items)) => {
            strategy.record_success(items, elapsed);
            info!(items, duration_ms = elapsed.as_millis() as u64, "Warming strategy completed");
            RunOutcome::Succeeded(items)
        }
        Ok(Err(e)) => {
            let reason = e.to_string();
            strategy.record_failure(reason.clone(), elapsed);
            error!(error = %reason, "Warming strategy failed");
            RunOutcome::Failed(reason)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            strategy.record_failure(reason.clone(), elapsed);
            error!(error = %reason, "Warming strategy panicked");
            RunOutcome::Failed(reason)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    fn counting(name: &str, priority: WarmingPriority, counter: Arc<AtomicUsize>) -> WarmingStrategy {
        WarmingStrategy::from_fn(name, priority, MINUTE, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
        })
    }

    fn failing(name: &str) -> WarmingStrategy {
        WarmingStrategy::from_fn(name, WarmingPriority::Critical, MINUTE, || async {
            Err(Error::Repository("connection refused".into()))
        })
    }

    fn panicking(name: &str) -> WarmingStrategy {
        WarmingStrategy::from_fn(name, WarmingPriority::Critical, MINUTE, || async {
            if true {
                panic!("bad row");
            }
            Ok(0)
        })
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let scheduler = WarmingScheduler::default();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(counting("a", WarmingPriority::Critical, counter.clone()))
            .unwrap();

        assert_matches!(
            scheduler.register(counting("a", WarmingPriority::Important, counter)),
            Err(Error::DuplicateStrategy(name)) if name == "a"
        );
    }

    #[tokio::test]
    async fn test_register_zero_interval() {
        let scheduler = WarmingScheduler::default();
        let strategy =
            WarmingStrategy::from_fn("z", WarmingPriority::Critical, Duration::ZERO, || async { Ok(0) });
        assert_matches!(scheduler.register(strategy), Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_success_and_failure_are_counted() {
        let scheduler = WarmingScheduler::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let a = scheduler
            .register(counting("a", WarmingPriority::Critical, counter.clone()))
            .unwrap();
        let b = scheduler.register(failing("b")).unwrap();

        let summary = scheduler.execute_critical_warming(Some(&[a, b.clone()])).await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let history = b.history();
        assert_eq!(history.failure_count, 1);
        assert!(history.last_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let scheduler = WarmingScheduler::default();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.register(panicking("p")).unwrap();
        scheduler
            .register(counting("ok", WarmingPriority::Critical, counter.clone()))
            .unwrap();

        let summary = scheduler.execute_critical_warming(None).await;

        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
        let p = scheduler.strategy("p").unwrap();
        assert!(!p.is_running());
        assert_eq!(p.history().last_error.as_deref(), Some("panicked: bad row"));
    }

    #[tokio::test]
    async fn test_default_batch_is_critical_and_enabled_only() {
        let scheduler = WarmingScheduler::default();
        let critical = Arc::new(AtomicUsize::new(0));
        let important = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(counting("c", WarmingPriority::Critical, critical.clone()))
            .unwrap();
        scheduler
            .register(counting("off", WarmingPriority::Critical, critical.clone()).disabled())
            .unwrap();
        scheduler
            .register(counting("i", WarmingPriority::Important, important.clone()))
            .unwrap();

        let summary = scheduler.execute_critical_warming(None).await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(critical.load(Ordering::SeqCst), 1);
        assert_eq!(important.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_running_strategy_is_skipped() {
        let scheduler = WarmingScheduler::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let a = scheduler
            .register(counting("a", WarmingPriority::Critical, counter.clone()))
            .unwrap();

        let _held = a.try_begin();
        let summary = scheduler.execute_critical_warming(None).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_global_guard_blocks_other_strategies() {
        let scheduler = WarmingScheduler::new(SchedulerConfig {
            guard_mode: GuardMode::Global,
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(counting("a", WarmingPriority::Critical, counter.clone()))
            .unwrap();

        scheduler.global_guard.store(true, Ordering::SeqCst);
        assert_eq!(scheduler.run_now("a").await.unwrap(), RunOutcome::Skipped);

        scheduler.global_guard.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.run_now("a").await.unwrap(), RunOutcome::Succeeded(1));
    }

    #[tokio::test]
    async fn test_global_mode_bootstrap_runs_all() {
        let scheduler = WarmingScheduler::new(SchedulerConfig {
            guard_mode: GuardMode::Global,
            ..Default::default()
        });
        let counter = Arc::new(AtomicUsize::new(0));
        for name in ["a", "b", "c"] {
            scheduler
                .register(counting(name, WarmingPriority::Critical, counter.clone()))
                .unwrap();
        }

        let summary = scheduler.execute_critical_warming(None).await;
        assert_eq!(summary.successful, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_strategy() {
        let scheduler = WarmingScheduler::default();
        assert_matches!(scheduler.enable_strategy("nope"), Err(Error::StrategyNotFound(_)));
        assert_matches!(scheduler.disable_strategy("nope"), Err(Error::StrategyNotFound(_)));
        assert_matches!(scheduler.run_now("nope").await, Err(Error::StrategyNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_bootstraps_then_ticks() {
        let scheduler = WarmingScheduler::default();
        let critical = Arc::new(AtomicUsize::new(0));
        let important = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(counting("c", WarmingPriority::Critical, critical.clone()))
            .unwrap();
        scheduler
            .register(counting("i", WarmingPriority::Important, important.clone()))
            .unwrap();

        assert!(!scheduler.is_ready());
        let summary = scheduler.start().await.unwrap();
        assert_eq!(summary.successful, 1);
        assert!(scheduler.is_ready());
        assert_eq!(important.load(Ordering::SeqCst), 0);

        tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;

        assert_eq!(critical.load(Ordering::SeqCst), 2);
        assert_eq!(important.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
        assert!(!scheduler.is_started());
    }

    #[tokio::test]
    async fn test_start_twice() {
        let scheduler = WarmingScheduler::default();
        scheduler.start().await.unwrap();
        assert_matches!(scheduler.start().await, Err(Error::SchedulerAlreadyRunning));
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_timer_and_enable_restores_it() {
        let scheduler = WarmingScheduler::default();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler
            .register(counting("i", WarmingPriority::Important, counter.clone()))
            .unwrap();
        scheduler.start().await.unwrap();

        scheduler.disable_strategy("i").unwrap();
        let status = scheduler.status();
        assert!(!status.strategies[0].enabled);
        assert!(!status.strategies[0].scheduled);

        tokio::time::sleep(MINUTE * 2).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        scheduler.enable_strategy("i").unwrap();
        assert!(scheduler.status().strategies[0].scheduled);

        tokio::time::sleep(MINUTE + Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_timer_keeps_ticking() {
        let scheduler = WarmingScheduler::default();
        let strategy = WarmingStrategy::from_fn("flaky", WarmingPriority::Important, MINUTE, || async {
            Err(Error::Repository("down".into()))
        });
        scheduler.register(strategy).unwrap();
        scheduler.start().await.unwrap();

        tokio::time::sleep(MINUTE * 3 + Duration::from_secs(1)).await;

        let history = scheduler.strategy("flaky").unwrap().history();
        assert_eq!(history.failure_count, 3);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_status_serializes() {
        let scheduler = WarmingScheduler::default();
        scheduler.register(failing("b")).unwrap();
        scheduler.execute_critical_warming(None).await;

        let json = serde_json::to_value(scheduler.status()).unwrap();
        assert_eq!(json["guard_mode"], "per_strategy");
        assert_eq!(json["strategies"][0]["name"], "b");
        assert_eq!(json["strategies"][0]["run_count"], 1);
        assert_eq!(json["strategies"][0]["priority"], "critical");
    }
}
