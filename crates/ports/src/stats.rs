//! Persistent statistics boundary contracts (chrono buckets, quota day/year tables).

use crate::BoxFuture;
use chrono::{DateTime, NaiveDate, Utc};
use stratus_domain::{ChronoBucketRow, QuotaDayRow, QuotaYearRow, ServiceId};
use stratus_shared::{RequestContext, Result};

/// Hourly chrono aggregate storage.
pub trait ChronoStorePort: Send + Sync {
    /// Add `count` and `duration_ms` into the `(bucket, operation)` row, creating it if absent.
    fn upsert_add(&self, ctx: &RequestContext, row: ChronoBucketRow) -> BoxFuture<'_, Result<()>>;

    /// Rows whose bucket is at or after `since`, oldest first.
    fn rows_since(
        &self,
        ctx: &RequestContext,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<ChronoBucketRow>>>;

    /// Delete rows whose bucket is strictly before `before`; returns the number removed.
    fn delete_before(
        &self,
        ctx: &RequestContext,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>>;
}

/// Filter for day-table reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRowQuery {
    /// Restrict to one service.
    pub service: Option<ServiceId>,
    /// Inclusive lower bound on the bucket.
    pub since: DateTime<Utc>,
    /// Exclusive upper bound on the bucket.
    pub until: Option<DateTime<Utc>>,
}

impl DayRowQuery {
    /// Rows of every service since `since`.
    #[must_use]
    pub const fn since(since: DateTime<Utc>) -> Self {
        Self {
            service: None,
            since,
            until: None,
        }
    }

    /// Restrict to `service`.
    #[must_use]
    pub fn for_service(mut self, service: ServiceId) -> Self {
        self.service = Some(service);
        self
    }

    /// Bound the range above (exclusive).
    #[must_use]
    pub const fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Returns true when `row` falls within the query.
    #[must_use]
    pub fn matches(&self, row: &QuotaDayRow) -> bool {
        self.service.as_ref().is_none_or(|service| *service == row.service)
            && row.bucket >= self.since
            && self.until.is_none_or(|until| row.bucket < until)
    }
}

/// Quota usage storage at day (10-minute) and year (calendar-day) granularity.
pub trait QuotaStorePort: Send + Sync {
    /// Add per-verb counts into the `(bucket, service)` row, creating it if absent.
    fn upsert_add_day(&self, ctx: &RequestContext, row: QuotaDayRow) -> BoxFuture<'_, Result<()>>;

    /// Day rows matching `query`, oldest first.
    fn day_rows(
        &self,
        ctx: &RequestContext,
        query: DayRowQuery,
    ) -> BoxFuture<'_, Result<Vec<QuotaDayRow>>>;

    /// Insert or replace the `(day, service)` year row.
    fn replace_year(&self, ctx: &RequestContext, row: QuotaYearRow) -> BoxFuture<'_, Result<()>>;

    /// Year rows on or after `since`, optionally for one service, oldest first.
    fn year_rows(
        &self,
        ctx: &RequestContext,
        service: Option<ServiceId>,
        since: NaiveDate,
    ) -> BoxFuture<'_, Result<Vec<QuotaYearRow>>>;

    /// Delete day rows whose bucket is strictly before `before`.
    fn delete_day_before(
        &self,
        ctx: &RequestContext,
        before: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64>>;

    /// Delete year rows whose day is strictly before `before`.
    fn delete_year_before(
        &self,
        ctx: &RequestContext,
        before: NaiveDate,
    ) -> BoxFuture<'_, Result<u64>>;
}
