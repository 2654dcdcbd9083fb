//! # stratus-app
//!
//! Scheduling and admission control for rate-limited weather-API ingestion.
//! This crate depends on `ports`, `domain`, and `shared`.
//!
//! - **Chrono tracker** - start/stop timing aggregated into hourly buckets
//! - **Quota ledger** - admitted-call deltas, day rows, year compaction
//! - **Admission controller** - `verify` gate with rolling and strict projections
//! - **Process manager** - cooperative background-job runner with a time budget
//! - **Watchdog** - keeps the maintenance schedules registered

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod admission;
pub mod chrono_tracker;
pub mod context;
pub mod process_manager;
pub mod quota_ledger;
pub mod watchdog;

pub use admission::{
    ALERT_CACHE_KEY, AdmissionController, AdmissionSettings, AdmissionTuning, Evaluation,
    Projection, ProjectionInput, StrictProjection, decide, project,
};
pub use chrono_tracker::{ChronoFlushReport, ChronoTracker};
pub use context::{MaintenanceReport, SchedulerContext, SchedulerDeps, SchedulerSettings};
pub use process_manager::{
    DEFAULT_MAX_TIME_SECS, JobCatalog, LIMIT_FALLBACK_THRESHOLD_SECS, ProcessManager, RunReport,
    max_time_secs,
};
pub use quota_ledger::{
    COMPILE_DAYS, LedgerFlushReport, LedgerSettings, QuotaLedger, RotateReport, VerbReport,
    actual_cache_key,
};
pub use watchdog::{ScheduleDefinition, ScheduleSetting, TICK_INTERVAL, Watchdog, WatchdogSettings};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
