//! Cron host backed by tokio interval tasks.
//!
//! Every schedule is one spawned loop; the first occurrence fires one full
//! period after `schedule`, and missed ticks are skipped rather than bunched.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stratus_ports::{CronHostPort, CronInterval, LoggerPort, ScheduledTask, log_fields};
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};

struct RunningSchedule {
    interval: Box<str>,
    handle: JoinHandle<()>,
}

/// Cron host spawning one interval loop per schedule on a tokio runtime.
pub struct TokioCronHost {
    runtime: Handle,
    logger: Option<Arc<dyn LoggerPort>>,
    intervals: Mutex<BTreeMap<Box<str>, CronInterval>>,
    schedules: Mutex<BTreeMap<Box<str>, RunningSchedule>>,
}

impl TokioCronHost {
    /// Host spawning on `runtime`.
    #[must_use]
    pub fn new(runtime: Handle, logger: Option<Arc<dyn LoggerPort>>) -> Self {
        Self {
            runtime,
            logger,
            intervals: Mutex::new(BTreeMap::new()),
            schedules: Mutex::new(BTreeMap::new()),
        }
    }

    /// Host spawning on the runtime of the calling task.
    pub fn current(logger: Option<Arc<dyn LoggerPort>>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|error| {
            ErrorEnvelope::invariant(
                ErrorCode::cron("no_runtime"),
                format!("cron host requires a tokio runtime: {error}"),
            )
        })?;
        Ok(Self::new(runtime, logger))
    }

    /// Abort every running schedule.
    pub fn shutdown(&self) {
        let drained = std::mem::take(
            &mut *self
                .schedules
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for running in drained.into_values() {
            running.handle.abort();
        }
    }

    fn spawn_loop(&self, name: &str, period: Duration, task: Arc<dyn ScheduledTask>) -> JoinHandle<()> {
        let logger = self.logger.clone();
        let name: Box<str> = name.into();
        self.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let ctx = RequestContext::new_tick();
                if let Err(error) = task.run(&ctx).await {
                    if let Some(logger) = logger.as_ref() {
                        logger.warn(
                            "cron.task_failed",
                            "Scheduled task failed",
                            Some(log_fields([
                                ("schedule", name.as_ref().into()),
                                ("correlationId", ctx.correlation_id().as_str().into()),
                                ("errorCode", error.code.to_string().into()),
                                ("message", error.message.as_str().into()),
                            ])),
                        );
                    }
                }
            }
        })
    }
}

impl Drop for TokioCronHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl CronHostPort for TokioCronHost {
    fn register_interval(&self, interval: CronInterval) -> Result<()> {
        if interval.seconds == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::cron("invalid_interval"),
                format!("interval `{}` has a zero period", interval.id),
            ));
        }
        self.intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(interval.id.clone(), interval);
        Ok(())
    }

    fn schedule(&self, name: &str, interval_id: &str, task: Arc<dyn ScheduledTask>) -> Result<()> {
        let period = self
            .intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(interval_id)
            .map(|interval| Duration::from_secs(interval.seconds))
            .ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::cron("unknown_interval"),
                    format!("interval `{interval_id}` is not registered"),
                )
                .with_metadata("interval", interval_id)
            })?;

        let handle = self.spawn_loop(name, period, task);
        let previous = self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.into(),
                RunningSchedule {
                    interval: interval_id.into(),
                    handle,
                },
            );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        Ok(())
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|running| !running.handle.is_finished())
    }

    fn unschedule(&self, name: &str) {
        let removed = self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if let Some(running) = removed {
            running.handle.abort();
        }
    }

    fn scheduled_names(&self) -> Vec<Box<str>> {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl TokioCronHost {
    /// Interval id a schedule was registered with.
    pub fn interval_of(&self, name: &str) -> Option<Box<str>> {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|running| running.interval.clone())
    }
}
