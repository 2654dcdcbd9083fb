//! Wiring of the scheduling subsystem around its ports.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use stratus_ports::{
    CachePort, ChronoStorePort, ClockPort, CronHostPort, JobRegistryPort, LoggerPort,
    QuotaPolicyPort, QuotaStorePort, log_fields,
};
use stratus_shared::{RequestContext, Result};

use crate::admission::{AdmissionController, AdmissionSettings};
use crate::chrono_tracker::{ChronoFlushReport, ChronoTracker};
use crate::process_manager::{JobCatalog, ProcessManager};
use crate::quota_ledger::{LedgerFlushReport, LedgerSettings, QuotaLedger, RotateReport};
use crate::watchdog::{Watchdog, WatchdogSettings};

/// Dependencies required by the scheduling subsystem.
#[derive(Clone)]
pub struct SchedulerDeps {
    /// Wall clock.
    pub clock: Arc<dyn ClockPort>,
    /// Chrono bucket storage.
    pub chrono_store: Arc<dyn ChronoStorePort>,
    /// Quota day/year storage.
    pub quota_store: Arc<dyn QuotaStorePort>,
    /// TTL cache for usage and alert level.
    pub cache: Arc<dyn CachePort>,
    /// Per-service limits.
    pub policy: Arc<dyn QuotaPolicyPort>,
    /// Background job registry.
    pub jobs: Arc<dyn JobRegistryPort>,
    /// Periodic task host.
    pub cron: Arc<dyn CronHostPort>,
    /// Job kind factories.
    pub catalog: Arc<JobCatalog>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Tunables of the scheduling subsystem.
#[derive(Debug, Clone, Default)]
pub struct SchedulerSettings {
    /// Ledger cache and retention.
    pub ledger: LedgerSettings,
    /// Admission mode and thresholds.
    pub admission: AdmissionSettings,
    /// Watchdog schedules and chrono retention.
    pub watchdog: WatchdogSettings,
    /// Platform execution-time limit in seconds (`0` = none).
    pub execution_time_limit_secs: u64,
    /// Seed of the probabilistic admission generator.
    pub seed: Option<u64>,
}

/// Summary of one `maintenance` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// Chrono rows written.
    pub chrono_written: usize,
    /// Chrono rows restored after a failed write.
    pub chrono_failed: usize,
    /// Quota day rows written.
    pub quota_written: usize,
    /// Quota day rows restored after a failed write.
    pub quota_failed: usize,
    /// Year rows compiled.
    pub compiled: usize,
    /// Day rows deleted.
    pub day_rows_removed: u64,
    /// Year rows deleted.
    pub year_rows_removed: u64,
    /// Chrono buckets deleted.
    pub chrono_rows_removed: u64,
}

impl MaintenanceReport {
    fn new(
        chrono: ChronoFlushReport,
        ledger: LedgerFlushReport,
        rotate: RotateReport,
        chrono_rows_removed: u64,
    ) -> Self {
        Self {
            chrono_written: chrono.written,
            chrono_failed: chrono.failed,
            quota_written: ledger.written,
            quota_failed: ledger.failed,
            compiled: rotate.compiled,
            day_rows_removed: rotate.day_rows_removed,
            year_rows_removed: rotate.year_rows_removed,
            chrono_rows_removed,
        }
    }
}

/// The five scheduling components sharing one set of ports.
pub struct SchedulerContext {
    chrono: Arc<ChronoTracker>,
    ledger: Arc<QuotaLedger>,
    admission: Arc<AdmissionController>,
    runner: Arc<ProcessManager>,
    watchdog: Arc<Watchdog>,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl SchedulerContext {
    /// Build every component from `deps`.
    #[must_use]
    pub fn new(deps: SchedulerDeps, settings: SchedulerSettings) -> Self {
        let chrono = Arc::new(ChronoTracker::new(
            Arc::clone(&deps.clock),
            deps.chrono_store,
            deps.logger.clone(),
        ));
        let ledger = Arc::new(QuotaLedger::new(
            Arc::clone(&deps.clock),
            deps.quota_store,
            Arc::clone(&deps.cache),
            Arc::clone(&deps.policy),
            deps.logger.clone(),
            settings.ledger,
        ));
        let mut admission = AdmissionController::new(
            Arc::clone(&ledger),
            deps.policy,
            deps.cache,
            Arc::clone(&deps.clock),
            deps.logger.clone(),
            settings.admission,
        );
        if let Some(seed) = settings.seed {
            admission = admission.with_seed(seed);
        }
        let runner = Arc::new(ProcessManager::new(
            deps.jobs,
            deps.catalog,
            Arc::clone(&chrono),
            deps.clock,
            deps.logger.clone(),
            settings.execution_time_limit_secs,
        ));
        let watchdog = Watchdog::new(
            deps.cron,
            Arc::clone(&chrono),
            Arc::clone(&ledger),
            Arc::clone(&runner),
            deps.logger.clone(),
            settings.watchdog,
        );
        Self {
            chrono,
            ledger,
            admission: Arc::new(admission),
            runner,
            watchdog,
            logger: deps.logger,
        }
    }

    /// Chrono tracker.
    #[must_use]
    pub const fn chrono(&self) -> &Arc<ChronoTracker> {
        &self.chrono
    }

    /// Quota ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// Admission controller.
    #[must_use]
    pub const fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Background process runner.
    #[must_use]
    pub const fn runner(&self) -> &Arc<ProcessManager> {
        &self.runner
    }

    /// Periodic scheduler.
    #[must_use]
    pub const fn watchdog(&self) -> &Arc<Watchdog> {
        &self.watchdog
    }

    /// Flush both ledgers, then compile and prune, in one go.
    pub async fn maintenance(&self, ctx: &RequestContext) -> Result<MaintenanceReport> {
        let chrono = self.chrono.flush(ctx).await?;
        let ledger = self.ledger.flush(ctx).await?;
        let rotate = self.ledger.rotate(ctx).await?;
        let pruned = self.watchdog.rotate(ctx).await?;
        let report = MaintenanceReport::new(chrono, ledger, rotate, pruned);

        if let Some(logger) = self.logger.as_ref() {
            logger.info(
                "maintenance.completed",
                "Maintenance completed",
                Some(log_fields([
                    ("chronoWritten", Value::from(report.chrono_written)),
                    ("quotaWritten", Value::from(report.quota_written)),
                    ("compiled", Value::from(report.compiled)),
                    ("dayRowsRemoved", Value::from(report.day_rows_removed)),
                    ("yearRowsRemoved", Value::from(report.year_rows_removed)),
                    ("chronoRowsRemoved", Value::from(report.chrono_rows_removed)),
                ])),
            );
        }
        Ok(report)
    }
}
