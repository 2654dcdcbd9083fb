//! Config command handlers.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, SourceArgs, format_error_output, format_ok_payload, load_config, log_info};
use std::collections::BTreeMap;
use stratus_config::{ValidatedStratusConfig, to_pretty_json, to_pretty_toml};
use stratus_infra::ConfigRendering;

/// Validate the effective config and summarize the resolved policy.
pub fn run_config_check(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
) -> Result<CliOutput, CliError> {
    let config = match load_config(env, source) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config check completed", mode.no_progress);

    let services: Vec<String> = config
        .policy()
        .services()
        .iter()
        .map(ToString::to_string)
        .collect();
    let body = serde_json::json!({
        "configPath": config_path(source),
        "services": services,
    });
    let stdout = match format_ok_payload(mode, "config", body)? {
        Some(rendered) => rendered,
        None => {
            let mut out = String::from("status: ok\nconfig: ok\n");
            if let Some(path) = config_path(source) {
                out.push_str("path: ");
                out.push_str(&path);
                out.push('\n');
            }
            out.push_str("services: ");
            out.push_str(&services.join(", "));
            out.push('\n');
            out
        },
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the effective config after env and override merging.
pub fn run_config_show(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
    rendering: ConfigRendering,
) -> Result<CliOutput, CliError> {
    let config = match load_config(env, source) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config show completed", mode.no_progress);

    let body = serde_json::json!({
        "configPath": config_path(source),
        "effectiveConfig": serde_json::to_value(&*config)?,
        "policy": config.policy(),
    });
    let stdout = match format_ok_payload(mode, "config", body)? {
        Some(rendered) => rendered,
        None => match render(&config, rendering) {
            Ok(text) => format!("status: ok\nconfig:\n{text}"),
            Err(error) => return Ok(format_error_output(mode, &error)),
        },
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

fn render(
    config: &ValidatedStratusConfig,
    rendering: ConfigRendering,
) -> Result<String, stratus_shared::ErrorEnvelope> {
    match rendering {
        ConfigRendering::Json => to_pretty_json(config),
        ConfigRendering::Toml => to_pretty_toml(config),
    }
}

fn config_path(source: &SourceArgs) -> Option<String> {
    source
        .config
        .as_ref()
        .map(|path| path.to_string_lossy().to_string())
}
