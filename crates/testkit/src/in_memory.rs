//! In-memory adapter implementations for port contracts.
//!
//! These implementations are intended for:
//! - Unit/integration tests
//! - Deterministic contract tests for the ports layer
//! - Failure injection around the stores and the cache

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeDelta, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use stratus_ports::{
    BoxFuture, CachePort, ChronoBucketRow, ChronoStorePort, ClockPort, DayRowQuery, LogEvent,
    LogFields, LogLevel, LoggerPort, QuotaDayRow, QuotaLimits, QuotaPolicyPort, QuotaStorePort,
    QuotaYearRow, ServiceId, Verb,
};
use stratus_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use tokio::sync::RwLock;

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// Logger that keeps every event for later assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base: LogFields,
}

impl RecordingLogger {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events whose name is `event`.
    pub fn events_named(&self, event: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|recorded| recorded.event.as_ref() == event)
            .collect()
    }

    /// Returns true when an event named `event` was logged at `level`.
    pub fn has(&self, level: LogLevel, event: &str) -> bool {
        self.events_named(event)
            .iter()
            .any(|recorded| recorded.level == level)
    }
}

impl LoggerPort for RecordingLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base.is_empty() {
            let mut fields = self.base.clone();
            fields.extend(event.fields.take().unwrap_or_default());
            event.fields = Some(fields);
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base = self.base.clone();
        base.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base,
        })
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Clock frozen at `now`, in UTC.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    /// Clock frozen at `now` with a local offset.
    #[must_use]
    pub const fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Clock frozen at an RFC 3339 instant.
    pub fn at(rfc3339: &str) -> std::result::Result<Self, chrono::ParseError> {
        let parsed = DateTime::parse_from_rfc3339(rfc3339)?;
        Ok(Self::with_offset(parsed.with_timezone(&Utc), *parsed.offset()))
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, seconds: i64) {
        self.advance(TimeDelta::seconds(seconds));
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
    }
}

#[derive(Debug, Default)]
struct StatsTables {
    chrono: BTreeMap<(DateTime<Utc>, Box<str>), ChronoBucketRow>,
    day: BTreeMap<(DateTime<Utc>, ServiceId), QuotaDayRow>,
    year: BTreeMap<(NaiveDate, ServiceId), QuotaYearRow>,
}

/// Chrono and quota tables kept in memory, with switchable write/read failures.
#[derive(Debug, Default)]
pub struct InMemoryStatsStore {
    tables: RwLock<StatsTables>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryStatsStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every read fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every chrono row, ordered by `(bucket, operation)`.
    pub async fn chrono_snapshot(&self) -> Vec<ChronoBucketRow> {
        self.tables.read().await.chrono.values().cloned().collect()
    }

    /// Every day row, ordered by `(bucket, service)`.
    pub async fn day_snapshot(&self) -> Vec<QuotaDayRow> {
        self.tables.read().await.day.values().cloned().collect()
    }

    /// Every year row, ordered by `(day, service)`.
    pub async fn year_snapshot(&self) -> Vec<QuotaYearRow> {
        self.tables.read().await.year.values().cloned().collect()
    }

    /// Insert a day row as-is, bypassing failure injection.
    pub async fn seed_day(&self, row: QuotaDayRow) {
        let mut tables = self.tables.write().await;
        tables
            .day
            .entry((row.bucket, row.service.clone()))
            .and_modify(|existing| existing.counts.add_assign(&row.counts))
            .or_insert(row);
    }

    fn check_write(&self, ctx: &RequestContext, operation: &'static str) -> Result<()> {
        ctx.ensure_not_cancelled(operation)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(storage_failure("write_failed", operation));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_read(&self, ctx: &RequestContext, operation: &'static str) -> Result<()> {
        ctx.ensure_not_cancelled(operation)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(storage_failure("read_failed", operation));
        }
        Ok(())
    }
}

fn storage_failure(code: &str, operation: &str) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::storage(code),
        "injected storage failure",
        ErrorClass::Retriable,
    )
    .with_metadata("operation", operation)
}

impl ChronoStorePort for InMemoryStatsStore {
    fn upsert_add(&self, ctx: &RequestContext, row: ChronoBucketRow) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_write(&ctx, "in_memory_stats.chrono_upsert")?;
            let mut tables = self.tables.write().await;
            let key = (row.bucket, Box::<str>::from(row.operation.as_str()));
            tables
                .chrono
                .entry(key)
                .and_modify(|existing| {
                    existing.count += row.count;
                    existing.duration_ms += row.duration_ms;
                })
                .or_insert(row);
            Ok(())
        })
    }

    fn rows_since(
        &self,
        ctx: &RequestContext,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<ChronoBucketRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_read(&ctx, "in_memory_stats.chrono_rows")?;
            let tables = self.tables.read().await;
            Ok(tables
                .chrono
                .values()
                .filter(|row| row.bucket >= since)
                .cloned()
                .collect())
        })
    }

    fn delete_before(
        &self,
        ctx: &RequestContext,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_write(&ctx, "in_memory_stats.chrono_delete")?;
            let mut tables = self.tables.write().await;
            let len = tables.chrono.len();
            tables.chrono.retain(|(bucket, _), _| *bucket >= before);
            Ok((len - tables.chrono.len()) as u64)
        })
    }
}

impl QuotaStorePort for InMemoryStatsStore {
    fn upsert_add_day(&self, ctx: &RequestContext, row: QuotaDayRow) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_write(&ctx, "in_memory_stats.day_upsert")?;
            let mut tables = self.tables.write().await;
            tables
                .day
                .entry((row.bucket, row.service.clone()))
                .and_modify(|existing| existing.counts.add_assign(&row.counts))
                .or_insert(row);
            Ok(())
        })
    }

    fn day_rows(
        &self,
        ctx: &RequestContext,
        query: DayRowQuery,
    ) -> BoxFuture<'_, Result<Vec<QuotaDayRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_read(&ctx, "in_memory_stats.day_rows")?;
            let tables = self.tables.read().await;
            Ok(tables
                .day
                .values()
                .filter(|row| query.matches(row))
                .cloned()
                .collect())
        })
    }

    fn replace_year(&self, ctx: &RequestContext, row: QuotaYearRow) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_write(&ctx, "in_memory_stats.year_replace")?;
            let mut tables = self.tables.write().await;
            tables.year.insert((row.day, row.service.clone()), row);
            Ok(())
        })
    }

    fn year_rows(
        &self,
        ctx: &RequestContext,
        service: Option<ServiceId>,
        since: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<QuotaYearRow>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_read(&ctx, "in_memory_stats.year_rows")?;
            let tables = self.tables.read().await;
            Ok(tables
                .year
                .values()
                .filter(|row| row.day >= since)
                .filter(|row| service.as_ref().is_none_or(|service| *service == row.service))
                .cloned()
                .collect())
        })
    }

    fn delete_day_before(
        &self,
        ctx: &RequestContext,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_write(&ctx, "in_memory_stats.day_delete")?;
            let mut tables = self.tables.write().await;
            let len = tables.day.len();
            tables.day.retain(|(bucket, _), _| *bucket >= before);
            Ok((len - tables.day.len()) as u64)
        })
    }

    fn delete_year_before(
        &self,
        ctx: &RequestContext,
        before: NaiveDate,
    ) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.check_write(&ctx, "in_memory_stats.year_delete")?;
            let mut tables = self.tables.write().await;
            let len = tables.year.len();
            tables.year.retain(|(day, _), _| *day >= before);
            Ok((len - tables.year.len()) as u64)
        })
    }
}

/// Cache whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingCache;

impl CachePort for FailingCache {
    fn get(&self, _ctx: &RequestContext, _key: Box<str>) -> BoxFuture<'_, Result<Option<Value>>> {
        Box::pin(async move { Err(storage_failure("cache_unavailable", "failing_cache.get")) })
    }

    fn set(
        &self,
        _ctx: &RequestContext,
        _key: Box<str>,
        _value: Value,
        _ttl: Duration,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Err(storage_failure("cache_unavailable", "failing_cache.set")) })
    }

    fn invalidate(&self, _ctx: &RequestContext, _key: Box<str>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            Err(storage_failure(
                "cache_unavailable",
                "failing_cache.invalidate",
            ))
        })
    }
}

/// Fixed `(service, verb)` limits table.
#[derive(Debug, Default, Clone)]
pub struct StaticPolicy {
    limits: BTreeMap<(ServiceId, Verb), QuotaLimits>,
}

impl StaticPolicy {
    /// Empty table: every pair is unlimited.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add limits for `(service, verb)`.
    #[must_use]
    pub fn with(mut self, service: &ServiceId, verb: Verb, limits: QuotaLimits) -> Self {
        self.limits.insert((service.clone(), verb), limits);
        self
    }
}

impl QuotaPolicyPort for StaticPolicy {
    fn limits(&self, service: &ServiceId, verb: Verb) -> Option<QuotaLimits> {
        self.limits.get(&(service.clone(), verb)).copied()
    }

    fn services(&self) -> Vec<ServiceId> {
        let mut services: Vec<ServiceId> =
            self.limits.keys().map(|(service, _)| service.clone()).collect();
        services.dedup();
        services
    }
}
