//! Composition root: builds the scheduling subsystem from a validated config.

use crate::InfraResult;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stratus_adapters::{
    ConfigPolicy, FixedClock, JsonLogger, LogSink, MemoryJobRegistry, MemoryTtlCache,
    SqliteStatsStore, StderrLogSink, SystemClock, TokioCronHost, TracingLogger,
};
use stratus_app::{
    AdmissionSettings, AdmissionTuning, JobCatalog, LedgerSettings, MaintenanceReport,
    ScheduleSetting, SchedulerContext, SchedulerDeps, SchedulerSettings, WatchdogSettings,
};
use stratus_config::{
    LogLevelSetting, LogSinkKind, LoggingConfig, StorageConfig, StratusConfig,
    ValidatedStratusConfig,
};
use stratus_ports::{ClockPort, LogFields, LogLevel, LoggerPort};
use stratus_shared::RequestContext;

/// Knobs that are not part of the config file.
#[derive(Default)]
pub struct RuntimeOptions {
    /// Freeze the clock at this instant (what-if evaluations).
    pub frozen_at: Option<DateTime<Utc>>,
    /// Job kinds the runner can resolve.
    pub catalog: JobCatalog,
    /// Destination of the JSON logger; stderr when unset.
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// Seed of the probabilistic admission generator.
    pub seed: Option<u64>,
}

/// The wired scheduling subsystem plus the adapters it runs on.
pub struct StratusRuntime {
    config: ValidatedStratusConfig,
    scheduler: SchedulerContext,
    store: Arc<SqliteStatsStore>,
    jobs: Arc<MemoryJobRegistry>,
    cron: Arc<TokioCronHost>,
    logger: Arc<dyn LoggerPort>,
}

impl StratusRuntime {
    /// Effective config.
    #[must_use]
    pub const fn config(&self) -> &ValidatedStratusConfig {
        &self.config
    }

    /// The five scheduling components.
    #[must_use]
    pub const fn scheduler(&self) -> &SchedulerContext {
        &self.scheduler
    }

    /// Statistics store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SqliteStatsStore> {
        &self.store
    }

    /// Background job registry.
    #[must_use]
    pub const fn jobs(&self) -> &Arc<MemoryJobRegistry> {
        &self.jobs
    }

    /// Cron host driving the watchdog schedules.
    #[must_use]
    pub const fn cron(&self) -> &Arc<TokioCronHost> {
        &self.cron
    }

    /// Root logger.
    #[must_use]
    pub const fn logger(&self) -> &Arc<dyn LoggerPort> {
        &self.logger
    }

    /// One maintenance pass: flush both ledgers, compile, prune.
    pub async fn maintenance(&self, ctx: &RequestContext) -> InfraResult<MaintenanceReport> {
        self.scheduler.maintenance(ctx).await
    }
}

/// Build every adapter and the scheduler context.
///
/// Must run inside a tokio runtime: the cron host binds to the current one.
pub fn build_runtime(
    config: ValidatedStratusConfig,
    options: RuntimeOptions,
) -> InfraResult<StratusRuntime> {
    let logger = build_logger(&config.logging, options.log_sink);
    let clock = build_clock(options.frozen_at);
    let store = open_store(&config.storage)?;
    let cache = Arc::new(MemoryTtlCache::new(
        Arc::clone(&clock),
        usize::try_from(config.quota.cache_max_entries).unwrap_or(usize::MAX),
    )?);
    let jobs = Arc::new(MemoryJobRegistry::new());
    let cron = Arc::new(TokioCronHost::current(Some(Arc::clone(&logger)))?);

    let deps = SchedulerDeps {
        clock,
        chrono_store: store.clone(),
        quota_store: store.clone(),
        cache,
        policy: Arc::new(ConfigPolicy::new(config.policy().clone())),
        jobs: jobs.clone(),
        cron: cron.clone(),
        catalog: Arc::new(options.catalog),
        logger: Some(Arc::clone(&logger)),
    };
    let mut settings = scheduler_settings(&config);
    settings.seed = options.seed;
    let scheduler = SchedulerContext::new(deps, settings);

    Ok(StratusRuntime {
        config,
        scheduler,
        store,
        jobs,
        cron,
        logger,
    })
}

/// Logger selected by `logging.sink`, carrying `logging.baseFields`.
#[must_use]
pub fn build_logger(
    logging: &LoggingConfig,
    sink: Option<Arc<dyn LogSink>>,
) -> Arc<dyn LoggerPort> {
    let base_fields: LogFields = logging
        .base_fields
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.to_string())))
        .collect();
    match logging.sink {
        LogSinkKind::Json => {
            let sink: Arc<dyn LogSink> = match sink {
                Some(sink) => sink,
                None => Arc::new(StderrLogSink),
            };
            Arc::new(
                JsonLogger::new(sink)
                    .with_base_fields(base_fields)
                    .with_min_level(log_level(logging.level)),
            )
        },
        LogSinkKind::Tracing => Arc::new(TracingLogger::new().with_base_fields(base_fields)),
    }
}

/// Open the SQLite store at `storage.path`, or an in-memory one.
pub fn open_store(storage: &StorageConfig) -> InfraResult<Arc<SqliteStatsStore>> {
    let store = if storage.in_memory {
        SqliteStatsStore::open_in_memory()?
    } else {
        SqliteStatsStore::open(Path::new(storage.path.as_ref()))?
    };
    Ok(Arc::new(store))
}

/// Map the config sections onto the scheduler knobs.
#[must_use]
pub fn scheduler_settings(config: &StratusConfig) -> SchedulerSettings {
    let quota = &config.quota;
    let retention = &config.retention;
    SchedulerSettings {
        ledger: LedgerSettings {
            cache_expiry: quota.cache_expiry(),
            day_retention_days: retention.quota_day_days,
            year_retention_days: retention.quota_year_days,
        },
        admission: AdmissionSettings {
            mode: quota.mode,
            cache_expiry: quota.cache_expiry(),
            alert_ttl: Duration::from_secs(quota.alert_ttl_secs),
            tuning: AdmissionTuning {
                strict_threshold: quota.strict_threshold_pct as f64 / 100.0,
                safety_margin: quota.safety_margin,
                ..AdmissionTuning::default()
            },
        },
        watchdog: WatchdogSettings {
            schedules: config
                .schedules
                .entries()
                .into_iter()
                .map(|(name, toggle)| ScheduleSetting {
                    name: name.into(),
                    interval: toggle.interval.clone(),
                    enabled: toggle.enabled,
                })
                .collect(),
            chrono_retention: i64::try_from(retention.chrono_days)
                .ok()
                .and_then(TimeDelta::try_days)
                .unwrap_or(TimeDelta::MAX),
        },
        execution_time_limit_secs: config.scheduler.execution_time_limit_secs,
        seed: None,
    }
}

fn build_clock(frozen_at: Option<DateTime<Utc>>) -> Arc<dyn ClockPort> {
    match frozen_at {
        Some(at) => Arc::new(FixedClock::new(at, SystemClock::new().local_offset())),
        None => Arc::new(SystemClock::new()),
    }
}

const fn log_level(setting: LogLevelSetting) -> LogLevel {
    match setting {
        LogLevelSetting::Debug => LogLevel::Debug,
        LogLevelSetting::Info => LogLevel::Info,
        LogLevelSetting::Warn => LogLevel::Warn,
        LogLevelSetting::Error => LogLevel::Error,
    }
}
