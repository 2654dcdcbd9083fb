//! # stratus-ports
//!
//! Port traits for the stratus hexagonal architecture.
//!
//! This crate defines the interfaces between the scheduling core and its
//! collaborators (stores, cache, clock, cron host, job registry, policy, logger).
//! It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod cache;
pub mod clock;
pub mod cron;
pub mod jobs;
pub mod logger;
pub mod policy;
pub mod stats;

pub use cache::*;
pub use clock::*;
pub use cron::*;
pub use jobs::*;
pub use logger::*;
pub use policy::*;
pub use stats::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without directly depending on `stratus-domain`.
pub use stratus_domain::{
    ChronoBucketRow, CronInterval, JobDescriptor, JobOutcome, JobState, QuotaDayRow,
    QuotaLimits, QuotaYearRow, ServiceId, Verb, VerbMap,
};
