//! Per-service, per-verb usage accounting.
//!
//! Admitted calls accumulate as in-memory deltas. `flush` moves them into
//! 10-minute day buckets, `compile` compacts recent days into year rows, and
//! `rotate` compacts then prunes both tables.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stratus_domain::{
    ActualUsage, QuotaDayRow, QuotaLimits, QuotaYearRow, SECONDS_PER_DAY, ServiceId, Verb,
    VerbMap, VerbUsage, local_date, local_day_start, local_midnight, quota_bucket,
};
use stratus_ports::{
    CachePort, ClockPort, DayRowQuery, LogFields, LogLevel, LoggerPort, QuotaPolicyPort,
    QuotaStorePort, log_fields,
};
use stratus_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};

/// Local calendar days re-compiled on every `compile` (today and the two before).
pub const COMPILE_DAYS: u64 = 3;

/// Retention and caching knobs of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Lifetime of cached actual usage.
    pub cache_expiry: Duration,
    /// Day-table retention, in days.
    pub day_retention_days: u64,
    /// Year-table retention, in days.
    pub year_retention_days: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            cache_expiry: Duration::from_secs(900),
            day_retention_days: 4,
            year_retention_days: 366,
        }
    }
}

/// Outcome of one ledger flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerFlushReport {
    /// Day rows persisted.
    pub written: usize,
    /// Rows that failed and were restored in memory.
    pub failed: usize,
}

/// Outcome of one rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotateReport {
    /// Year rows (re)written.
    pub compiled: usize,
    /// Day rows deleted.
    pub day_rows_removed: u64,
    /// Year rows deleted.
    pub year_rows_removed: u64,
}

/// Admin view of one `(service, verb)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbReport {
    /// Verb.
    pub verb: Verb,
    /// Current policy limits, if any.
    pub limits: Option<QuotaLimits>,
    /// Persisted usage.
    pub usage: VerbUsage,
    /// Admitted calls not yet flushed.
    pub delta: u64,
    /// Rolling usage as a percentage of the count quota.
    pub consumed_pct: Option<f64>,
}

/// Usage ledger shared by the admission controller and the watchdog.
pub struct QuotaLedger {
    clock: Arc<dyn ClockPort>,
    store: Arc<dyn QuotaStorePort>,
    cache: Arc<dyn CachePort>,
    policy: Arc<dyn QuotaPolicyPort>,
    logger: Option<Arc<dyn LoggerPort>>,
    settings: LedgerSettings,
    deltas: Mutex<BTreeMap<ServiceId, VerbMap<u64>>>,
}

impl QuotaLedger {
    /// Build a ledger from its collaborators.
    #[must_use]
    pub fn new(
        clock: Arc<dyn ClockPort>,
        store: Arc<dyn QuotaStorePort>,
        cache: Arc<dyn CachePort>,
        policy: Arc<dyn QuotaPolicyPort>,
        logger: Option<Arc<dyn LoggerPort>>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            clock,
            store,
            cache,
            policy,
            logger,
            settings,
            deltas: Mutex::new(BTreeMap::new()),
        }
    }

    /// Ledger settings.
    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Count one admitted call.
    pub fn record_admitted(&self, service: &ServiceId, verb: Verb) {
        let mut deltas = self.deltas.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = deltas.entry(service.clone()).or_default().get_mut(verb);
        *slot = slot.saturating_add(1);
    }

    /// Run `decide` against the pending delta and count the call when it admits,
    /// all under one lock so concurrent callers see each other's admissions.
    pub fn admit_if<T>(
        &self,
        service: &ServiceId,
        verb: Verb,
        decide: impl FnOnce(u64) -> (bool, T),
    ) -> (bool, T) {
        let mut deltas = self.deltas.lock().unwrap_or_else(PoisonError::into_inner);
        let current = deltas.get(service).map_or(0, |counts| *counts.get(verb));
        let (admitted, detail) = decide(current);
        if admitted {
            let slot = deltas.entry(service.clone()).or_default().get_mut(verb);
            *slot = slot.saturating_add(1);
        }
        (admitted, detail)
    }

    /// Admitted-but-not-flushed calls for the pair.
    pub fn delta(&self, service: &ServiceId, verb: Verb) -> u64 {
        self.deltas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .map_or(0, |counts| *counts.get(verb))
    }

    /// Persist pending deltas into the current 10-minute bucket.
    pub async fn flush(&self, ctx: &RequestContext) -> Result<LedgerFlushReport> {
        ctx.ensure_not_cancelled("quota.flush")?;
        let drained = std::mem::take(&mut *self.deltas.lock().unwrap_or_else(PoisonError::into_inner));
        let bucket = quota_bucket(self.clock.now());
        let mut report = LedgerFlushReport::default();

        for (service, counts) in drained {
            if counts.is_zero() {
                continue;
            }
            let row = QuotaDayRow {
                bucket,
                service: service.clone(),
                counts,
            };
            match self.store.upsert_add_day(ctx, row).await {
                Ok(()) => {
                    report.written += 1;
                    if let Err(error) = self.cache.invalidate(ctx, actual_cache_key(&service)).await
                    {
                        self.warn(
                            "quota.flush.invalidate_failed",
                            "Failed to invalidate cached usage",
                            &service,
                            &error,
                        );
                    }
                },
                Err(error) => {
                    report.failed += 1;
                    self.warn(
                        "quota.flush.row_failed",
                        "Failed to persist quota usage",
                        &service,
                        &error,
                    );
                    self.deltas
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entry(service)
                        .or_default()
                        .add_assign(&counts);
                },
            }
        }

        Ok(report)
    }

    /// Persisted `{rolling, strict}` usage of `service`, per verb.
    ///
    /// Reads through the cache; a miss sums the day rows of the last 24 hours and
    /// of the current local day, then caches the result for `cache_expiry`.
    pub async fn actual(&self, ctx: &RequestContext, service: &ServiceId) -> Result<ActualUsage> {
        let key = actual_cache_key(service);
        match self.cache.get(ctx, key.clone()).await {
            Ok(Some(value)) => {
                if let Ok(usage) = serde_json::from_value::<ActualUsage>(value) {
                    return Ok(usage);
                }
            },
            Ok(None) => {},
            Err(error) => self.warn(
                "quota.actual.cache_read_failed",
                "Failed to read cached usage; reading the store",
                service,
                &error,
            ),
        }

        let now = self.clock.now();
        let rolling_since = now
            .checked_sub_signed(TimeDelta::seconds(SECONDS_PER_DAY))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let strict_since = local_midnight(now, self.clock.local_offset());
        let rows = self
            .store
            .day_rows(
                ctx,
                DayRowQuery::since(rolling_since.min(strict_since)).for_service(service.clone()),
            )
            .await?;

        let mut usage = ActualUsage::default();
        for row in &rows {
            for (verb, count) in row.counts.iter() {
                let slot = usage.get_mut(verb);
                if row.bucket >= rolling_since {
                    slot.rolling = slot.rolling.saturating_add(*count);
                }
                if row.bucket >= strict_since {
                    slot.strict = slot.strict.saturating_add(*count);
                }
            }
        }

        let value = serde_json::to_value(usage).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                format!("failed to serialize usage: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;
        if let Err(error) = self
            .cache
            .set(ctx, key, value, self.settings.cache_expiry)
            .await
        {
            self.warn(
                "quota.actual.cache_write_failed",
                "Failed to cache usage",
                service,
                &error,
            );
        }
        Ok(usage)
    }

    /// Compact the day rows of the last three local days into year rows.
    ///
    /// Each `(day, service)` row is replaced wholesale; quota columns come from
    /// the policy as it stands now. Returns the number of rows written.
    pub async fn compile(&self, ctx: &RequestContext) -> Result<usize> {
        let now = self.clock.now();
        let offset = self.clock.local_offset();
        let today = local_date(now, offset);
        let mut written = 0;

        for back in 0..COMPILE_DAYS {
            ctx.ensure_not_cancelled("quota.compile")?;
            let Some(day) = today.checked_sub_days(chrono::Days::new(back)) else {
                continue;
            };
            let Some(next) = day.succ_opt() else {
                continue;
            };
            let query = DayRowQuery::since(local_day_start(day, offset))
                .until(local_day_start(next, offset));
            let rows = match self.store.day_rows(ctx, query).await {
                Ok(rows) => rows,
                Err(error) => {
                    self.warn_day("quota.compile.read_failed", "Failed to read day rows", day, &error);
                    continue;
                },
            };

            let mut by_service: BTreeMap<ServiceId, Vec<QuotaDayRow>> = BTreeMap::new();
            for row in rows {
                by_service.entry(row.service.clone()).or_default().push(row);
            }

            for (service, rows) in by_service {
                let year_row = QuotaYearRow::compile(day, service.clone(), &rows, |verb| {
                    self.policy.limits(&service, verb)
                });
                match self.store.replace_year(ctx, year_row).await {
                    Ok(()) => written += 1,
                    Err(error) => self.warn(
                        "quota.compile.write_failed",
                        "Failed to write year row",
                        &service,
                        &error,
                    ),
                }
            }
        }

        Ok(written)
    }

    /// `compile`, then drop day and year rows past their retention.
    pub async fn rotate(&self, ctx: &RequestContext) -> Result<RotateReport> {
        let compiled = self.compile(ctx).await?;
        let now = self.clock.now();
        let mut report = RotateReport {
            compiled,
            ..RotateReport::default()
        };

        let day_cutoff = now
            .checked_sub_signed(days(self.settings.day_retention_days))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        match self.store.delete_day_before(ctx, day_cutoff).await {
            Ok(removed) => report.day_rows_removed = removed,
            Err(error) => self.warn_day(
                "quota.rotate.day_failed",
                "Failed to prune day rows",
                local_date(day_cutoff, self.clock.local_offset()),
                &error,
            ),
        }

        let today = local_date(now, self.clock.local_offset());
        let year_cutoff = today
            .checked_sub_days(chrono::Days::new(self.settings.year_retention_days))
            .unwrap_or(NaiveDate::MIN);
        match self.store.delete_year_before(ctx, year_cutoff).await {
            Ok(removed) => report.year_rows_removed = removed,
            Err(error) => self.warn_day(
                "quota.rotate.year_failed",
                "Failed to prune year rows",
                year_cutoff,
                &error,
            ),
        }

        if let Some(logger) = self.logger.as_ref() {
            logger.info(
                "quota.rotate.completed",
                "Quota rotation completed",
                Some(log_fields([
                    ("compiled", Value::from(report.compiled)),
                    ("dayRowsRemoved", Value::from(report.day_rows_removed)),
                    ("yearRowsRemoved", Value::from(report.year_rows_removed)),
                ])),
            );
        }
        Ok(report)
    }

    /// Usage, limits, and consumption of every verb of `service`.
    pub async fn report(&self, ctx: &RequestContext, service: &ServiceId) -> Result<Vec<VerbReport>> {
        let usage = self.actual(ctx, service).await?;
        Ok(Verb::ALL
            .into_iter()
            .map(|verb| {
                let limits = self.policy.limits(service, verb);
                let usage = *usage.get(verb);
                let consumed_pct = limits
                    .filter(|limits| !limits.is_unlimited())
                    .map(|limits| 100.0 * usage.rolling as f64 / limits.count as f64);
                VerbReport {
                    verb,
                    limits,
                    usage,
                    delta: self.delta(service, verb),
                    consumed_pct,
                }
            })
            .collect())
    }

    fn warn(&self, event: &str, message: &str, service: &ServiceId, error: &ErrorEnvelope) {
        if let Some(logger) = self.logger.as_ref() {
            logger.log_failure(
                LogLevel::Warn,
                event,
                message,
                Some(service_fields(service)),
                error,
            );
        }
    }

    fn warn_day(&self, event: &str, message: &str, day: NaiveDate, error: &ErrorEnvelope) {
        if let Some(logger) = self.logger.as_ref() {
            logger.log_failure(
                LogLevel::Warn,
                event,
                message,
                Some(log_fields([("day", Value::String(day.to_string()))])),
                error,
            );
        }
    }
}

/// Cache key of the actual usage of `service`.
#[must_use]
pub fn actual_cache_key(service: &ServiceId) -> Box<str> {
    format!("quota.actual.{service}").into_boxed_str()
}

fn service_fields(service: &ServiceId) -> LogFields {
    log_fields([("service", Value::String(service.as_str().to_owned()))])
}

fn days(count: u64) -> TimeDelta {
    i64::try_from(count)
        .ok()
        .and_then(TimeDelta::try_days)
        .unwrap_or(TimeDelta::MAX)
}
