//! Quota inspection command handlers.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{
    CliOutput, SourceArgs, format_error_output, format_ok_payload, init_tracing, load_config,
    tokio_runtime,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use stratus_domain::{QuotaAlert, ServiceId, Verb};
use stratus_infra::{QuotaCheck, QuotaReport, RuntimeOptions, build_runtime, quota_check, quota_report};
use stratus_shared::{CorrelationId, ErrorCode, ErrorEnvelope, RequestContext};

/// Print usage, limits, and pending deltas per service.
pub fn run_quota_report(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
    service: Option<&str>,
) -> Result<CliOutput, CliError> {
    let service = match service.map(parse_service).transpose() {
        Ok(service) => service,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    let config = match load_config(env, source) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
    init_tracing(&config.logging, mode);

    let runtime = tokio_runtime()?;
    let result = runtime.block_on(async move {
        let stratus = build_runtime(config, RuntimeOptions::default())?;
        quota_report(&stratus, &cli_context(), service).await
    });
    let report = match result {
        Ok(report) => report,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let body = serde_json::json!({ "quota": report });
    let stdout = match format_ok_payload(mode, "quota_report", body)? {
        Some(rendered) => rendered,
        None => format_report_text(&report),
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

/// Print what admission control would decide for one call, without recording it.
pub fn run_quota_check(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    source: &SourceArgs,
    service: &str,
    verb: &str,
    at: Option<&str>,
) -> Result<CliOutput, CliError> {
    let parsed = parse_service(service).and_then(|service| {
        let verb = parse_verb(verb)?;
        let at = at.map(parse_instant).transpose()?;
        Ok((service, verb, at))
    });
    let (service, verb, frozen_at) = match parsed {
        Ok(parsed) => parsed,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };
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
                frozen_at,
                ..RuntimeOptions::default()
            },
        )?;
        let at = frozen_at.unwrap_or_else(Utc::now);
        quota_check(&stratus, &cli_context(), service, verb, at).await
    });
    let check = match result {
        Ok(check) => check,
        Err(error) => return Ok(format_error_output(mode, &error)),
    };

    let body = serde_json::json!({ "check": check });
    let stdout = match format_ok_payload(mode, "quota_check", body)? {
        Some(rendered) => rendered,
        None => format_check_text(&check),
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}

fn cli_context() -> RequestContext {
    RequestContext::new(CorrelationId::generate("cli_"))
}

fn parse_service(input: &str) -> Result<ServiceId, ErrorEnvelope> {
    ServiceId::parse(input).map_err(|error| {
        ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string())
            .with_metadata("field", "service")
    })
}

fn parse_verb(input: &str) -> Result<Verb, ErrorEnvelope> {
    input.parse::<Verb>().map_err(|error| {
        ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string())
            .with_metadata("field", "verb")
    })
}

fn parse_instant(input: &str) -> Result<DateTime<Utc>, ErrorEnvelope> {
    DateTime::parse_from_rfc3339(input.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                format!("`--at` must be an RFC 3339 instant: {error}"),
            )
            .with_metadata("field", "at")
        })
}

const fn alert_name(alert: QuotaAlert) -> &'static str {
    match alert {
        QuotaAlert::None => "none",
        QuotaAlert::Warning => "warning",
        QuotaAlert::Error => "error",
    }
}

fn format_report_text(report: &QuotaReport) -> String {
    let mut out = String::from("status: ok\n");
    let _ = writeln!(out, "mode: {}", report.mode.as_u8());
    let _ = writeln!(out, "alert: {}", alert_name(report.alert));
    for entry in &report.services {
        let _ = writeln!(out, "service: {}", entry.service);
        for verb in &entry.verbs {
            let Some(limits) = verb.limits else {
                if verb.usage.rolling > 0 || verb.delta > 0 {
                    let _ = writeln!(
                        out,
                        "  {}: unlimited rolling={} strict={} delta={}",
                        verb.verb, verb.usage.rolling, verb.usage.strict, verb.delta
                    );
                }
                continue;
            };
            let _ = writeln!(
                out,
                "  {}: count={} rate={} rolling={} strict={} delta={} consumed={:.1}%",
                verb.verb,
                limits.count,
                limits.rate,
                verb.usage.rolling,
                verb.usage.strict,
                verb.delta,
                verb.consumed_pct.unwrap_or(0.0)
            );
        }
    }
    out
}

fn format_check_text(check: &QuotaCheck) -> String {
    let mut out = String::from("status: ok\n");
    let _ = writeln!(out, "service: {}", check.service);
    let _ = writeln!(out, "verb: {}", check.verb);
    let _ = writeln!(out, "at: {}", check.at.to_rfc3339());
    let _ = writeln!(out, "mode: {}", check.mode.as_u8());
    let Some(evaluation) = check.evaluation.as_ref() else {
        out.push_str("quota: none\nadmit: true\n");
        return out;
    };
    let projection = &evaluation.projection;
    let _ = writeln!(out, "countQuota: {}", evaluation.limits.count);
    let _ = writeln!(out, "rolling: {}", evaluation.usage.rolling);
    let _ = writeln!(out, "strict: {}", evaluation.usage.strict);
    let _ = writeln!(out, "delta: {}", evaluation.delta);
    let _ = writeln!(out, "projectedRolling: {}", projection.projected_rolling);
    if let Some(strict) = projection.strict {
        let _ = writeln!(out, "projectedStrict: {}", strict.projected);
        let _ = writeln!(out, "projectedFullDay: {}", strict.full_day);
    }
    let _ = writeln!(out, "warning: {}", projection.warning);
    let _ = writeln!(out, "error: {}", projection.error);
    let _ = writeln!(
        out,
        "admittedPercentage: {:.1}",
        projection.admitted_percentage
    );
    let _ = writeln!(out, "admit: {}", evaluation.would_admit);
    out
}
