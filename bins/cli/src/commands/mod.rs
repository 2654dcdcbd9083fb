//! CLI command handlers.

pub mod config;
pub mod info;
pub mod maintenance;
pub mod quota;
pub mod run;

pub use config::{run_config_check, run_config_show};
pub use info::run_info;
pub use maintenance::run_maintenance;
pub use quota::{run_quota_check, run_quota_report};
pub use run::run_scheduler;
