//! Periodic task host boundary contract.

use crate::BoxFuture;
use std::sync::Arc;
use stratus_domain::CronInterval;
use stratus_shared::{RequestContext, Result};

/// Callback invoked by the cron host on every occurrence of a schedule.
pub trait ScheduledTask: Send + Sync {
    /// Run one occurrence.
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;
}

/// Host that fires named schedules at registered intervals.
pub trait CronHostPort: Send + Sync {
    /// Make an interval available to `schedule`. Re-registering an id replaces it.
    fn register_interval(&self, interval: CronInterval) -> Result<()>;

    /// Start firing `task` under `name` every `interval_id`.
    ///
    /// Fails with `cron:unknown_interval` when the interval was never registered.
    fn schedule(&self, name: &str, interval_id: &str, task: Arc<dyn ScheduledTask>) -> Result<()>;

    /// Returns true when `name` is currently scheduled.
    fn is_scheduled(&self, name: &str) -> bool;

    /// Stop firing `name`. Unknown names are a no-op.
    fn unschedule(&self, name: &str);

    /// Names currently scheduled, sorted.
    fn scheduled_names(&self) -> Vec<Box<str>>;
}
