//! Cache Warming
//!
//! Background population of the cache with predicted working sets.
//!
//! - [`WarmingStrategy`] - named, prioritized, interval-driven routine
//! - [`WarmingScheduler`] - registry, critical bootstrap and timers
//! - [`strategies`] - built-in exercise, student and curriculum warmers

mod scheduler;
pub mod strategies;
mod strategy;

pub use scheduler::{
    GuardMode, RunOutcome, SchedulerConfig, StrategyStatus, WarmingScheduler, WarmingStatus,
    WarmingSummary, DEFAULT_CRITICAL_CONCURRENCY,
};
pub use strategies::{default_strategies, JsonCache};
pub use strategy::{FnAction, RunHistory, WarmAction, WarmingPriority, WarmingStrategy};
