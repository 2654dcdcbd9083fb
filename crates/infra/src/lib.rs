//! # stratus-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Config loading helpers used by CLI surfaces.
pub mod config_check;
/// Scheduler daemon loop.
pub mod daemon;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Read-only quota inspection.
pub mod quota;
/// Adapter selection and scheduler wiring.
pub mod runtime;

pub use config_check::{ConfigRendering, load_effective_config, load_effective_config_text};
pub use daemon::{DaemonReport, cancel_on_ctrl_c, run_daemon};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use quota::{QuotaCheck, QuotaReport, ServiceQuotaReport, quota_check, quota_report};
pub use runtime::{
    RuntimeOptions, StratusRuntime, build_logger, build_runtime, open_store, scheduler_settings,
};

// Re-export redaction utilities for CLI boundary sanitization
pub use stratus_shared::redaction::{REDACTED, is_secret_key};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
