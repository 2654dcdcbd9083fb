//! Periodic scheduler: keeps the maintenance schedules registered with the cron host.
//!
//! Every task the watchdog hands to the host is wrapped so that it runs inside a
//! chrono handle named after the schedule and never propagates its error.

use chrono::TimeDelta;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use stratus_domain::{CronInterval, OperationKey, schedule_names};
use stratus_ports::{BoxFuture, CronHostPort, LogLevel, LoggerPort, ScheduledTask, log_fields};
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};

use crate::chrono_tracker::ChronoTracker;
use crate::process_manager::ProcessManager;
use crate::quota_ledger::QuotaLedger;

/// Interval of the watchdog's own tick.
pub const TICK_INTERVAL: &str = "3_minutes";

/// Schedule toggle handed in by the composition root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSetting {
    /// Schedule name.
    pub name: Box<str>,
    /// Interval id.
    pub interval: Box<str>,
    /// Whether the schedule stays registered.
    pub enabled: bool,
}

impl ScheduleSetting {
    /// Enabled schedule `name` every `interval`.
    #[must_use]
    pub fn enabled(name: &str, interval: &str) -> Self {
        Self {
            name: name.into(),
            interval: interval.into(),
            enabled: true,
        }
    }
}

/// Watchdog knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogSettings {
    /// Owned maintenance schedules.
    pub schedules: Vec<ScheduleSetting>,
    /// Chrono bucket retention.
    pub chrono_retention: TimeDelta,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            schedules: vec![
                ScheduleSetting::enabled(schedule_names::STATS_FLUSH, "10_minutes"),
                ScheduleSetting::enabled(schedule_names::QUOTA_ROTATE, "6_hours"),
                ScheduleSetting::enabled(schedule_names::CHRONO_ROTATE, "6_hours"),
                ScheduleSetting::enabled(schedule_names::BACKGROUND_PROCESSES, "3_minutes"),
            ],
            chrono_retention: TimeDelta::days(30),
        }
    }
}

/// A named schedule with its callback.
#[derive(Clone)]
pub struct ScheduleDefinition {
    /// Schedule name.
    pub name: Box<str>,
    /// Interval id.
    pub interval: Box<str>,
    /// Whether the schedule stays registered.
    pub enabled: bool,
    /// Callback.
    pub task: Arc<dyn ScheduledTask>,
}

impl std::fmt::Debug for ScheduleDefinition {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ScheduleDefinition")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Owns the schedule set and the chrono lifecycle of every tick.
pub struct Watchdog {
    host: Arc<dyn CronHostPort>,
    chrono: Arc<ChronoTracker>,
    logger: Option<Arc<dyn LoggerPort>>,
    settings: WatchdogSettings,
    definitions: Mutex<Vec<ScheduleDefinition>>,
}

impl Watchdog {
    /// Build the watchdog and its owned maintenance schedules.
    #[must_use]
    pub fn new(
        host: Arc<dyn CronHostPort>,
        chrono: Arc<ChronoTracker>,
        ledger: Arc<QuotaLedger>,
        runner: Arc<ProcessManager>,
        logger: Option<Arc<dyn LoggerPort>>,
        settings: WatchdogSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| {
            let definitions = settings
                .schedules
                .iter()
                .filter_map(|setting| {
                    let task: Arc<dyn ScheduledTask> = match setting.name.as_ref() {
                        schedule_names::STATS_FLUSH => Arc::new(StatsFlushTask {
                            chrono: Arc::clone(&chrono),
                            ledger: Arc::clone(&ledger),
                        }),
                        schedule_names::QUOTA_ROTATE => Arc::new(QuotaRotateTask {
                            ledger: Arc::clone(&ledger),
                        }),
                        schedule_names::CHRONO_ROTATE => Arc::new(ChronoRotateTask {
                            watchdog: this.clone(),
                        }),
                        schedule_names::BACKGROUND_PROCESSES => Arc::new(BackgroundProcessesTask {
                            runner: Arc::clone(&runner),
                        }),
                        _ => return None,
                    };
                    Some(ScheduleDefinition {
                        name: setting.name.clone(),
                        interval: setting.interval.clone(),
                        enabled: setting.enabled,
                        task,
                    })
                })
                .collect();
            Self {
                host,
                chrono,
                logger,
                settings,
                definitions: Mutex::new(definitions),
            }
        })
    }

    /// Register the interval family and every enabled schedule, then the tick.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        for interval in CronInterval::family() {
            self.host.register_interval(interval)?;
        }
        self.ensure_schedules();
        if !self.host.is_scheduled(schedule_names::TICK) {
            let tick: Arc<dyn ScheduledTask> = Arc::new(TickTask {
                watchdog: Arc::downgrade(self),
            });
            self.host.schedule(schedule_names::TICK, TICK_INTERVAL, tick)?;
        }
        if let Some(logger) = self.logger.as_ref() {
            logger.info(
                "watchdog.started",
                "Watchdog started",
                Some(log_fields([(
                    "schedules",
                    Value::from(
                        self.host
                            .scheduled_names()
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>(),
                    ),
                )])),
            );
        }
        Ok(())
    }

    /// Deregister the tick and every owned schedule.
    pub fn stop(&self) {
        self.host.unschedule(schedule_names::TICK);
        for definition in self.definitions() {
            self.host.unschedule(&definition.name);
        }
        if let Some(logger) = self.logger.as_ref() {
            logger.info("watchdog.stopped", "Watchdog stopped", None);
        }
    }

    /// `stop` then `start`.
    pub fn restart(self: &Arc<Self>) -> Result<()> {
        self.stop();
        self.start()
    }

    /// One tick: re-validate every schedule inside a `watchdog.tick` chrono handle.
    pub fn cron_run(&self, _ctx: &RequestContext) {
        let handle = self.chrono.start(OperationKey::watchdog_tick());
        self.ensure_schedules();
        self.chrono.stop(&handle);
    }

    /// Delete chrono buckets past their retention.
    pub async fn rotate(&self, ctx: &RequestContext) -> Result<u64> {
        self.chrono.prune(ctx, self.settings.chrono_retention).await
    }

    /// Add a host-provided schedule; it is registered on the next start or tick.
    pub fn add_schedule(&self, definition: ScheduleDefinition) {
        let mut definitions = self
            .definitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        definitions.retain(|existing| existing.name != definition.name);
        definitions.push(definition);
    }

    /// Snapshot of the schedule definitions.
    #[must_use]
    pub fn definitions(&self) -> Vec<ScheduleDefinition> {
        self.definitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register missing enabled schedules and remove disabled ones.
    fn ensure_schedules(&self) {
        for definition in self.definitions() {
            let scheduled = self.host.is_scheduled(&definition.name);
            if definition.enabled && !scheduled {
                let task: Arc<dyn ScheduledTask> = Arc::new(InstrumentedTask {
                    name: definition.name.clone(),
                    inner: Arc::clone(&definition.task),
                    chrono: Arc::clone(&self.chrono),
                    logger: self.logger.clone(),
                });
                if let Err(error) = self
                    .host
                    .schedule(&definition.name, &definition.interval, task)
                {
                    self.warn_schedule(&definition, &error);
                }
            } else if !definition.enabled && scheduled {
                self.host.unschedule(&definition.name);
            }
        }
    }

    fn warn_schedule(&self, definition: &ScheduleDefinition, error: &ErrorEnvelope) {
        if let Some(logger) = self.logger.as_ref() {
            logger.log_failure(
                LogLevel::Warn,
                "watchdog.schedule_failed",
                "Failed to register schedule",
                Some(log_fields([
                    ("schedule", Value::from(definition.name.as_ref())),
                    ("interval", Value::from(definition.interval.as_ref())),
                ])),
                error,
            );
        }
    }
}

fn gone() -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::cron("watchdog_dropped"), "watchdog no longer exists")
}

/// Runs the inner task in a chrono handle and swallows its error after logging.
struct InstrumentedTask {
    name: Box<str>,
    inner: Arc<dyn ScheduledTask>,
    chrono: Arc<ChronoTracker>,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl ScheduledTask for InstrumentedTask {
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let operation = OperationKey::for_schedule(&self.name);
            let result = self.chrono.measure(operation, self.inner.run(&ctx)).await;
            if let (Err(error), Some(logger)) = (result, self.logger.as_ref()) {
                logger.log_failure(
                    LogLevel::Warn,
                    "watchdog.task_failed",
                    "Scheduled task failed",
                    Some(log_fields([("schedule", Value::from(self.name.as_ref()))])),
                    &error,
                );
            }
            Ok(())
        })
    }
}

struct TickTask {
    watchdog: Weak<Watchdog>,
}

impl ScheduledTask for TickTask {
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let watchdog = self.watchdog.upgrade().ok_or_else(gone)?;
            watchdog.cron_run(&ctx);
            Ok(())
        })
    }
}

struct StatsFlushTask {
    chrono: Arc<ChronoTracker>,
    ledger: Arc<QuotaLedger>,
}

impl ScheduledTask for StatsFlushTask {
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.chrono.flush(&ctx).await?;
            self.ledger.flush(&ctx).await?;
            Ok(())
        })
    }
}

struct QuotaRotateTask {
    ledger: Arc<QuotaLedger>,
}

impl ScheduledTask for QuotaRotateTask {
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.ledger.rotate(&ctx).await?;
            Ok(())
        })
    }
}

struct ChronoRotateTask {
    watchdog: Weak<Watchdog>,
}

impl ScheduledTask for ChronoRotateTask {
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let watchdog = self.watchdog.upgrade().ok_or_else(gone)?;
            watchdog.rotate(&ctx).await?;
            Ok(())
        })
    }
}

struct BackgroundProcessesTask {
    runner: Arc<ProcessManager>,
}

impl ScheduledTask for BackgroundProcessesTask {
    fn run(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.runner.run(&ctx).await?;
            Ok(())
        })
    }
}
