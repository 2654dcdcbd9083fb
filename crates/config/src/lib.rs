//! # stratus-config
//!
//! Configuration schema, plan catalog, validation, and normalization logic.
//! This crate depends on `domain` and `shared` only.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (env + file + overrides).
pub mod load;
/// Built-in quota plans and the resolved policy table.
pub mod plans;
/// Configuration schema types and helpers.
pub mod schema;

pub use schema::{
    CURRENT_CONFIG_VERSION, ConfigSchemaError, LogLevelSetting, LogSinkKind, LoggingConfig,
    QuotaConfig, RetentionConfig, ScheduleToggle, SchedulerConfig, SchedulesConfig,
    StorageConfig, StratusConfig, ValidatedStratusConfig, parse_stratus_config_json,
    parse_stratus_config_toml,
};

pub use env::{EnvParseError, StratusEnv, apply_env_overrides};
pub use load::{
    load_stratus_config_from_path, load_stratus_config_from_sources, load_stratus_config_std_env,
    to_pretty_json, to_pretty_toml,
};
pub use plans::{PlanCatalog, PlanLimits, PolicyTable, ServicePlans};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
