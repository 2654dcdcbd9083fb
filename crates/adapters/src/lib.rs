//! # stratus-adapters
//!
//! Adapter implementations for ports (statistics store, cache, clock, cron host,
//! job registry, quota policy, structured logging).
//! This crate depends on `ports`, `shared`, `domain`, and `config`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Bounded in-memory TTL cache.
pub mod cache;
/// System and frozen clocks.
pub mod clock;
/// Tokio-backed cron host.
pub mod cron;
/// In-process job registry.
pub mod jobs;
pub mod log_sink;
pub mod logger;
pub mod policy;
/// SQLite statistics store.
pub mod sqlite;

pub use cache::MemoryTtlCache;
pub use clock::{FixedClock, SystemClock};
pub use cron::TokioCronHost;
pub use jobs::MemoryJobRegistry;
pub use log_sink::{LogSink, MemoryLogSink, StderrLogSink};
pub use logger::{JsonLogger, TracingLogger};
pub use policy::ConfigPolicy;
pub use sqlite::SqliteStatsStore;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
