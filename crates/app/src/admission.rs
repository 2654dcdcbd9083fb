//! Admission control for outbound calls to quota-limited services.
//!
//! `verify` projects the consumption of a `(service, verb)` pair over the rolling
//! 24-hour window and, late enough in the day, over the strict calendar day. The
//! configured mode turns the projection into a decision.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stratus_domain::{
    QuotaAlert, QuotaLimits, QuotaMode, SECONDS_PER_DAY, ServiceId, Verb, VerbUsage,
    seconds_since_local_midnight,
};
use stratus_ports::{CachePort, ClockPort, LogFields, LogLevel, LoggerPort, QuotaPolicyPort, log_fields};
use stratus_shared::{RequestContext, Result};

use crate::quota_ledger::QuotaLedger;

/// Cache key of the admin alert flag.
pub const ALERT_CACHE_KEY: &str = "quota.alert";

/// Projection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionTuning {
    /// Fraction of the local day after which the strict projection applies.
    pub strict_threshold: f64,
    /// Calls added on top of every projection.
    pub safety_margin: u64,
    /// Length of the rolling window, in seconds.
    pub rolling_window_secs: u64,
}

impl AdmissionTuning {
    /// Fraction of the day before the strict projection kicks in.
    pub const DEFAULT_STRICT_THRESHOLD: f64 = 0.2;
    /// Safety margin added to every projection.
    pub const DEFAULT_SAFETY_MARGIN: u64 = 1;
    /// Rolling window length.
    pub const DEFAULT_ROLLING_WINDOW_SECS: u64 = 86_400;
}

impl Default for AdmissionTuning {
    fn default() -> Self {
        Self {
            strict_threshold: Self::DEFAULT_STRICT_THRESHOLD,
            safety_margin: Self::DEFAULT_SAFETY_MARGIN,
            rolling_window_secs: Self::DEFAULT_ROLLING_WINDOW_SECS,
        }
    }
}

/// Mode and timing knobs of the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionSettings {
    /// Enforcement mode.
    pub mode: QuotaMode,
    /// Lifetime of the cached actual usage; scales the projections.
    pub cache_expiry: Duration,
    /// Lifetime of the admin alert flag.
    pub alert_ttl: Duration,
    /// Projection thresholds.
    pub tuning: AdmissionTuning,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            mode: QuotaMode::LogOnly,
            cache_expiry: Duration::from_secs(900),
            alert_ttl: Duration::from_secs(86_400),
            tuning: AdmissionTuning::default(),
        }
    }
}

/// Strict (calendar-day) half of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrictProjection {
    /// Calls expected by the end of the cache window.
    pub projected: u64,
    /// `projected` extrapolated to the whole day.
    pub full_day: u64,
}

/// Result of projecting the consumption of one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    /// Rolling-window projection.
    pub projected_rolling: u64,
    /// Strict projection, when enough of the day has elapsed.
    pub strict: Option<StrictProjection>,
    /// The quota will likely be exceeded.
    pub warning: bool,
    /// The quota is (about to be) exceeded.
    pub error: bool,
    /// Share of calls that may still go through, in `[0, 100]`.
    pub admitted_percentage: f64,
}

/// Inputs of one projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionInput {
    /// Persisted usage.
    pub usage: VerbUsage,
    /// Admitted calls not yet flushed.
    pub delta: u64,
    /// Calls allowed per 24 hours.
    pub count_quota: u64,
    /// Cache expiry, in seconds.
    pub cache_expiry_secs: u64,
    /// Seconds since local midnight.
    pub seconds_today: u64,
}

/// Project consumption; pure and free of side effects.
#[must_use]
pub fn project(input: ProjectionInput, tuning: &AdmissionTuning) -> Projection {
    let quota = input.count_quota;
    let rolling = input.usage.rolling as f64;
    let delta = input.delta as f64;
    let expiry = input.cache_expiry_secs as f64;
    let window = tuning.rolling_window_secs.max(1) as f64;

    let max_potential = rolling * expiry / window;
    let projected_rolling =
        round_to_u64(rolling + max_potential + delta).saturating_add(tuning.safety_margin);
    let mut warning = projected_rolling > quota;
    let mut error = warning;
    let mut strict = None;
    let mut admitted_percentage = 100.0;

    let fraction = input.seconds_today as f64 / SECONDS_PER_DAY as f64;
    if fraction > tuning.strict_threshold && input.seconds_today > 0 {
        let used = input.usage.strict as f64;
        let max_potential_strict = used * expiry / input.seconds_today as f64;
        let projected =
            round_to_u64(used + max_potential_strict + delta).saturating_add(tuning.safety_margin);
        let full_day = round_to_u64(projected as f64 / fraction);
        warning = full_day > quota;
        error = projected > quota;
        if full_day > quota {
            admitted_percentage = admitted_share(quota, projected, full_day);
        }
        strict = Some(StrictProjection {
            projected,
            full_day,
        });
    }

    Projection {
        projected_rolling,
        strict,
        warning,
        error,
        admitted_percentage,
    }
}

fn admitted_share(quota: u64, projected: u64, full_day: u64) -> f64 {
    let denominator = full_day as f64 - projected as f64;
    if denominator <= 0.0 {
        return if projected < quota { 100.0 } else { 0.0 };
    }
    let share = 100.0 * (quota as f64 - projected as f64) / denominator;
    share.clamp(0.0, 100.0)
}

fn round_to_u64(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "value is finite, non-negative, and saturates at u64::MAX"
    )]
    let rounded = value.round().min(u64::MAX as f64) as u64;
    rounded
}

/// Turn a projection into a decision. `draw` is a uniform sample in `[0, 1)`.
#[must_use]
pub fn decide(mode: QuotaMode, projection: &Projection, count_quota: u64, draw: f64) -> bool {
    match mode {
        QuotaMode::Disabled | QuotaMode::LogOnly => true,
        QuotaMode::Block => projection.projected_rolling < count_quota,
        QuotaMode::Probabilistic => draw * 100.0 < projection.admitted_percentage,
    }
}

/// Projection of one pair together with the limits it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Limits in force.
    pub limits: QuotaLimits,
    /// Persisted usage.
    pub usage: VerbUsage,
    /// Pending delta.
    pub delta: u64,
    /// Projection.
    pub projection: Projection,
    /// What the configured mode would decide, ignoring randomness for mode 3.
    pub would_admit: bool,
}

/// Quota gate consulted before every outbound call.
pub struct AdmissionController {
    ledger: Arc<QuotaLedger>,
    policy: Arc<dyn QuotaPolicyPort>,
    cache: Arc<dyn CachePort>,
    clock: Arc<dyn ClockPort>,
    logger: Option<Arc<dyn LoggerPort>>,
    settings: AdmissionSettings,
    rng: Mutex<StdRng>,
}

impl AdmissionController {
    /// Build a controller with an entropy-seeded generator.
    #[must_use]
    pub fn new(
        ledger: Arc<QuotaLedger>,
        policy: Arc<dyn QuotaPolicyPort>,
        cache: Arc<dyn CachePort>,
        clock: Arc<dyn ClockPort>,
        logger: Option<Arc<dyn LoggerPort>>,
        settings: AdmissionSettings,
    ) -> Self {
        Self {
            ledger,
            policy,
            cache,
            clock,
            logger,
            settings,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the generator with a seeded one (deterministic mode-3 decisions).
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Controller settings.
    #[must_use]
    pub const fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    /// Decide whether one call to `service` with `verb` may go out now.
    ///
    /// Admitted calls are recorded in the ledger. Usage that cannot be read from
    /// the store is treated as no usage, so storage trouble never blocks ingestion.
    /// The pending delta is read and bumped under one lock, so concurrent callers
    /// never share the last admission slot.
    pub async fn verify(&self, ctx: &RequestContext, service: &ServiceId, verb: Verb) -> bool {
        let mode = self.settings.mode;
        let limits = self.policy.limits(service, verb).unwrap_or_default();
        if limits.is_unlimited() || mode == QuotaMode::Disabled {
            self.ledger.record_admitted(service, verb);
            return true;
        }

        let usage = match self.ledger.actual(ctx, service).await {
            Ok(usage) => *usage.get(verb),
            Err(error) => {
                if let Some(logger) = self.logger.as_ref() {
                    logger.log_failure(
                        LogLevel::Warn,
                        "quota.usage_unavailable",
                        "Quota usage unavailable; assuming none",
                        Some(pair_fields(service, verb)),
                        &error,
                    );
                }
                VerbUsage::default()
            },
        };

        if !mode.may_deny() {
            let delta = self.ledger.delta(service, verb);
            let projection = self.projection(usage, delta, limits.count);
            self.raise_alerts(ctx, service, verb, &projection, limits.count)
                .await;
            self.ledger.record_admitted(service, verb);
            return true;
        }

        let (admitted, projection) = self.ledger.admit_if(service, verb, |delta| {
            let projection = self.projection(usage, delta, limits.count);
            let draw = if mode == QuotaMode::Probabilistic {
                self.rng
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .random::<f64>()
            } else {
                0.0
            };
            (decide(mode, &projection, limits.count, draw), projection)
        });

        if !admitted {
            if let Some(logger) = self.logger.as_ref() {
                let mut fields = pair_fields(service, verb);
                fields.insert("mode".into(), Value::from(mode.as_u8()));
                fields.insert("countQuota".into(), Value::from(limits.count));
                fields.insert(
                    "projectedRolling".into(),
                    Value::from(projection.projected_rolling),
                );
                fields.insert(
                    "admittedPercentage".into(),
                    Value::from(projection.admitted_percentage),
                );
                logger.warn("quota.denied", "API call denied", Some(fields));
            }
        }
        admitted
    }

    /// Projection for the pair without recording anything. `None` when no quota applies.
    pub async fn evaluate(
        &self,
        ctx: &RequestContext,
        service: &ServiceId,
        verb: Verb,
    ) -> Result<Option<Evaluation>> {
        let Some(limits) = self.policy.limits(service, verb) else {
            return Ok(None);
        };
        if limits.is_unlimited() {
            return Ok(None);
        }
        let usage = *self.ledger.actual(ctx, service).await?.get(verb);
        let delta = self.ledger.delta(service, verb);
        let projection = self.projection(usage, delta, limits.count);
        let would_admit = match self.settings.mode {
            QuotaMode::Probabilistic => projection.admitted_percentage > 0.0,
            mode => decide(mode, &projection, limits.count, 0.0),
        };
        Ok(Some(Evaluation {
            limits,
            usage,
            delta,
            projection,
            would_admit,
        }))
    }

    /// Current admin alert level.
    pub async fn alert_level(&self, ctx: &RequestContext) -> Result<QuotaAlert> {
        let value = self.cache.get(ctx, ALERT_CACHE_KEY.into()).await?;
        Ok(value
            .and_then(|value| value.as_u64())
            .map_or(QuotaAlert::None, QuotaAlert::from_level))
    }

    fn projection(&self, usage: VerbUsage, delta: u64, count_quota: u64) -> Projection {
        let now = self.clock.now();
        let seconds_today =
            u64::try_from(seconds_since_local_midnight(now, self.clock.local_offset()))
                .unwrap_or(0);
        project(
            ProjectionInput {
                usage,
                delta,
                count_quota,
                cache_expiry_secs: self.settings.cache_expiry.as_secs(),
                seconds_today,
            },
            &self.settings.tuning,
        )
    }

    async fn raise_alerts(
        &self,
        ctx: &RequestContext,
        service: &ServiceId,
        verb: Verb,
        projection: &Projection,
        count_quota: u64,
    ) {
        let (alert, level) = if projection.error {
            (QuotaAlert::Error, LogLevel::Error)
        } else if projection.warning {
            (QuotaAlert::Warning, LogLevel::Warn)
        } else {
            return;
        };

        if let Some(logger) = self.logger.as_ref() {
            let mut fields = pair_fields(service, verb);
            fields.insert("countQuota".into(), Value::from(count_quota));
            fields.insert(
                "projectedRolling".into(),
                Value::from(projection.projected_rolling),
            );
            if let Some(strict) = projection.strict {
                fields.insert("projectedStrict".into(), Value::from(strict.projected));
                fields.insert("fullDayStrict".into(), Value::from(strict.full_day));
            }
            let message = if alert == QuotaAlert::Error {
                "Quota exceeded"
            } else {
                "Quota likely to be exceeded"
            };
            logger.log(stratus_ports::LogEvent::new(
                level,
                "quota.alert",
                message,
                Some(fields),
            ));
        }

        let current = self.alert_level(ctx).await.unwrap_or_default();
        if alert > current {
            let stored = self
                .cache
                .set(
                    ctx,
                    ALERT_CACHE_KEY.into(),
                    Value::from(alert.level()),
                    self.settings.alert_ttl,
                )
                .await;
            if let (Err(error), Some(logger)) = (stored, self.logger.as_ref()) {
                logger.log_failure(
                    LogLevel::Warn,
                    "quota.alert_failed",
                    "Failed to store quota alert",
                    None,
                    &error,
                );
            }
        }
    }
}

fn pair_fields(service: &ServiceId, verb: Verb) -> LogFields {
    log_fields([
        ("system", Value::from("quota")),
        ("service", Value::String(service.as_str().to_owned())),
        ("verb", Value::from(verb.as_str())),
    ])
}
