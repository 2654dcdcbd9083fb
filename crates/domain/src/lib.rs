//! # stratus-domain
//!
//! Domain value types for weather-API ingestion scheduling and admission control.
//!
//! This crate contains the core domain model with no infrastructure dependencies:
//!
//! - **Primitives** - `ServiceId`, `OperationKey`, `JobKind`
//! - **Quota** - `Verb`, `VerbMap`, `QuotaLimits`, `QuotaMode`, `QuotaAlert`, `ActualUsage`
//! - **Buckets** - day/year/chrono rows and local-calendar arithmetic
//! - **Timing** - `ChronoHandle`, `ChronoAggregate`
//! - **Jobs** - `JobDescriptor`, `JobState`, `JobOutcome`
//! - **Schedule** - `CronInterval` and watchdog schedule names
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// Re-export shared types for convenience
pub use stratus_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod buckets;
pub mod jobs;
pub mod primitives;
pub mod quota;
pub mod schedule;
pub mod timing;

pub use buckets::{
    CHRONO_BUCKET_SECS, ChronoBucketRow, QUOTA_BUCKET_SECS, QuotaDayRow, QuotaYearRow,
    SECONDS_PER_DAY, YearVerbStats, chrono_bucket, local_date,
    local_day_start, local_midnight, quota_bucket, seconds_since_local_midnight,
};
pub use jobs::{JobDescriptor, JobOutcome, JobState};
pub use primitives::{JobKind, OperationKey, PrimitiveError, ServiceId};
pub use quota::{ActualUsage, QuotaAlert, QuotaLimits, QuotaMode, Verb, VerbMap, VerbUsage};
pub use schedule::{CronInterval, names as schedule_names};
pub use timing::{ChronoAggregate, ChronoHandle};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_crate_compiles() {
        let version = domain_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn domain_depends_on_shared() {
        let shared_version = shared_crate_version();
        assert!(!shared_version.is_empty());
    }
}
