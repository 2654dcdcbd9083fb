//! Scheduler daemon command handler.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{
    CliOutput, SourceArgs, format_error_output, format_ok_payload, init_tracing, load_config,
    log_info, tokio_runtime,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_infra::{RuntimeOptions, build_runtime, cancel_on_ctrl_c, run_daemon};
use stratus_shared::CancellationToken;

/// Start the watchdog and keep the maintenance schedules running until Ctrl-C.
pub fn run_scheduler(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
    seed: Option<u64>,
) -> Result<CliOutput, CliError> {
    let config = match load_config(env, source) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    init_tracing(&config.logging, mode);

    let runtime = tokio_runtime()?;
    let result = runtime.block_on(async move {
        let stratus = build_runtime(
            config,
            RuntimeOptions {
                seed,
                ..RuntimeOptions::default()
            },
        )?;
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_ctrl_c(
            Arc::clone(stratus.logger()),
            shutdown.clone(),
        ));
        run_daemon(&stratus, shutdown).await
    });
    let report = match result {
        Ok(report) => report,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "scheduler stopped", mode.no_progress);

    let body = serde_json::json!({ "daemon": report });
    let stdout = match format_ok_payload(mode, "run", body)? {
        Some(rendered) => rendered,
        None => format!(
            "status: ok\nchronoWritten: {}\nquotaWritten: {}\n",
            report.chrono_written, report.quota_written
        ),
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}
