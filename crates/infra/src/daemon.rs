//! Long-running scheduler loop.

use crate::InfraResult;
use crate::runtime::StratusRuntime;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use stratus_ports::{CronHostPort, LogLevel, LoggerPort, log_fields};
use stratus_shared::{CancellationToken, ErrorEnvelope, RequestContext};

/// What the daemon did on its way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonReport {
    /// Chrono rows written by the final flush.
    pub chrono_written: usize,
    /// Quota day rows written by the final flush.
    pub quota_written: usize,
}

/// Start the watchdog, wait for `shutdown` to be cancelled, then deregister
/// everything and flush.
///
/// Pending deltas are persisted before returning so nothing admitted is lost.
#[tracing::instrument(name = "stratus.daemon", skip_all)]
pub async fn run_daemon(
    runtime: &StratusRuntime,
    shutdown: CancellationToken,
) -> InfraResult<DaemonReport> {
    let logger = runtime.logger();
    let watchdog = runtime.scheduler().watchdog();
    watchdog.start()?;
    logger.info(
        "daemon.started",
        "Scheduler daemon started",
        Some(log_fields([(
            "storage",
            Value::from(runtime.store().location()),
        )])),
    );

    shutdown.cancelled().await;

    watchdog.stop();
    runtime.cron().shutdown();
    let ctx = RequestContext::new_tick();
    let chrono = runtime.scheduler().chrono().flush(&ctx).await?;
    let quota = runtime.scheduler().ledger().flush(&ctx).await?;
    let report = DaemonReport {
        chrono_written: chrono.written,
        quota_written: quota.written,
    };
    logger.info(
        "daemon.stopped",
        "Scheduler daemon stopped",
        Some(log_fields([
            ("chronoWritten", Value::from(report.chrono_written)),
            ("quotaWritten", Value::from(report.quota_written)),
            (
                "remaining",
                Value::from(runtime.cron().scheduled_names().len()),
            ),
        ])),
    );
    Ok(report)
}

/// Cancel `token` on Ctrl-C. A signal-handler failure cancels immediately.
pub async fn cancel_on_ctrl_c(logger: Arc<dyn LoggerPort>, token: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        logger.log_failure(
            LogLevel::Error,
            "daemon.signal_failed",
            "Failed to listen for Ctrl-C",
            None,
            &ErrorEnvelope::from(error),
        );
    }
    token.cancel();
}
