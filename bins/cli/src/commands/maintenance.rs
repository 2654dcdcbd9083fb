//! One-shot maintenance command handler.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{
    CliOutput, SourceArgs, format_error_output, format_ok_payload, init_tracing, load_config,
    log_info, tokio_runtime,
};
use std::collections::BTreeMap;
use stratus_app::MaintenanceReport;
use stratus_infra::{RuntimeOptions, build_runtime};
use stratus_shared::{CorrelationId, RequestContext};

/// Flush pending statistics, compile the year table, and prune expired rows.
pub fn run_maintenance(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
) -> Result<CliOutput, CliError> {
    let config = match load_config(env, source) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    init_tracing(&config.logging, mode);

    let runtime = tokio_runtime()?;
    let result = runtime.block_on(async move {
        let stratus = build_runtime(config, RuntimeOptions::default())?;
        let ctx = RequestContext::new(CorrelationId::generate("cli_"));
        stratus.maintenance(&ctx).await
    });
    let report = match result {
        Ok(report) => report,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "maintenance completed", mode.no_progress);

    let body = serde_json::json!({ "maintenance": report });
    let stdout = match format_ok_payload(mode, "maintenance", body)? {
        Some(rendered) => rendered,
        None => format_maintenance_text(&report),
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

fn format_maintenance_text(report: &MaintenanceReport) -> String {
    let mut out = String::from("status: ok\n");
    for (label, value) in [
        ("chronoWritten", report.chrono_written as u64),
        ("chronoFailed", report.chrono_failed as u64),
        ("quotaWritten", report.quota_written as u64),
        ("quotaFailed", report.quota_failed as u64),
        ("compiled", report.compiled as u64),
        ("dayRowsRemoved", report.day_rows_removed),
        ("yearRowsRemoved", report.year_rows_removed),
        ("chronoRowsRemoved", report.chrono_rows_removed),
    ] {
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&value.to_string());
        out.push('\n');
    }
    out
}
