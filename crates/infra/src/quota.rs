//! Read-only quota inspection for admin surfaces.

use crate::InfraResult;
use crate::runtime::StratusRuntime;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stratus_app::{Evaluation, VerbReport};
use stratus_domain::{QuotaAlert, QuotaMode, ServiceId, Verb};
use stratus_shared::RequestContext;

/// Usage report of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQuotaReport {
    /// Service.
    pub service: ServiceId,
    /// One entry per verb.
    pub verbs: Vec<VerbReport>,
}

/// Usage of every service with a configured plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaReport {
    /// Enforcement mode.
    pub mode: QuotaMode,
    /// Current admin alert.
    pub alert: QuotaAlert,
    /// Per-service entries, sorted by service.
    pub services: Vec<ServiceQuotaReport>,
}

/// What `verify` would see for one pair, without recording anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCheck {
    /// Service.
    pub service: ServiceId,
    /// Verb.
    pub verb: Verb,
    /// Instant the projection was computed for.
    pub at: DateTime<Utc>,
    /// Enforcement mode.
    pub mode: QuotaMode,
    /// `None` when no quota applies to the pair.
    pub evaluation: Option<Evaluation>,
}

/// Report usage for `service`, or for every service with limits.
pub async fn quota_report(
    runtime: &StratusRuntime,
    ctx: &RequestContext,
    service: Option<ServiceId>,
) -> InfraResult<QuotaReport> {
    let scheduler = runtime.scheduler();
    let services = match service {
        Some(service) => vec![service],
        None => runtime.config().policy().services(),
    };

    let mut entries = Vec::with_capacity(services.len());
    for service in services {
        let verbs = scheduler.ledger().report(ctx, &service).await?;
        entries.push(ServiceQuotaReport { service, verbs });
    }

    Ok(QuotaReport {
        mode: runtime.config().quota.mode,
        alert: scheduler.admission().alert_level(ctx).await?,
        services: entries,
    })
}

/// Evaluate one pair at the runtime's clock.
pub async fn quota_check(
    runtime: &StratusRuntime,
    ctx: &RequestContext,
    service: ServiceId,
    verb: Verb,
    at: DateTime<Utc>,
) -> InfraResult<QuotaCheck> {
    let evaluation = runtime
        .scheduler()
        .admission()
        .evaluate(ctx, &service, verb)
        .await?;
    Ok(QuotaCheck {
        service,
        verb,
        at,
        mode: runtime.config().quota.mode,
        evaluation,
    })
}
