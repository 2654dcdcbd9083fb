//! Info command handler.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_ok_payload};
use stratus_app::app_crate_version;
use stratus_config::{PlanCatalog, config_crate_version};
use stratus_infra::infra_crate_version;

/// Run the info command.
pub fn run_info(mode: OutputMode) -> Result<CliOutput, CliError> {
    let services: Vec<String> = PlanCatalog::builtin()
        .services()
        .map(|(service, _)| service.to_string())
        .collect();
    let body = serde_json::json!({
        "build": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "appVersion": app_crate_version(),
            "configVersion": config_crate_version(),
            "infraVersion": infra_crate_version(),
        },
        "services": services,
    });

    let stdout = match format_ok_payload(mode, "info", body)? {
        Some(rendered) => rendered,
        None => format!(
            "status: ok\nname: {}\nversion: {}\napp: {}\nconfig: {}\ninfra: {}\nservices: {}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            app_crate_version(),
            config_crate_version(),
            infra_crate_version(),
            services.join(", "),
        ),
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}
