//! Persistent bucket rows and the calendar arithmetic that keys them.
//!
//! All timestamps are UTC. "Local" calendar days are derived from a fixed UTC
//! offset supplied by the clock port.

use crate::quota::{QuotaLimits, Verb, VerbMap};
use crate::{OperationKey, ServiceId};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Width of a quota day-table bucket.
pub const QUOTA_BUCKET_SECS: i64 = 600;

/// Width of a chrono stats bucket.
pub const CHRONO_BUCKET_SECS: i64 = 3_600;

/// Seconds in a day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Floor a timestamp to a multiple of `width_secs` since the epoch.
#[must_use]
pub fn floor_to(timestamp: DateTime<Utc>, width_secs: i64) -> DateTime<Utc> {
    if width_secs <= 0 {
        return timestamp;
    }
    let seconds = timestamp.timestamp();
    let floored = seconds - seconds.rem_euclid(width_secs);
    DateTime::from_timestamp(floored, 0).unwrap_or(timestamp)
}

/// Start of the 10-minute quota bucket containing `timestamp`.
#[must_use]
pub fn quota_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    floor_to(timestamp, QUOTA_BUCKET_SECS)
}

/// Start of the hourly chrono bucket containing `timestamp`.
#[must_use]
pub fn chrono_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    floor_to(timestamp, CHRONO_BUCKET_SECS)
}

/// Local calendar date of `now` under `offset`.
#[must_use]
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Whole seconds elapsed since local midnight.
#[must_use]
pub fn seconds_since_local_midnight(now: DateTime<Utc>, offset: FixedOffset) -> i64 {
    i64::from(now.with_timezone(&offset).num_seconds_from_midnight())
}

/// UTC instant of local midnight for the day containing `now`.
#[must_use]
pub fn local_midnight(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let elapsed = seconds_since_local_midnight(now, offset);
    DateTime::from_timestamp(now.timestamp() - elapsed, 0).unwrap_or(now)
}

/// UTC instant at which the local calendar `day` starts.
#[must_use]
pub fn local_day_start(day: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let shift = TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    day.and_time(NaiveTime::MIN).and_utc() - shift
}

/// One 10-minute usage bucket of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDayRow {
    /// Bucket start (multiple of 10 minutes).
    pub bucket: DateTime<Utc>,
    /// Service the calls went to.
    pub service: ServiceId,
    /// Admitted calls per verb.
    pub counts: VerbMap<u64>,
}

/// Compacted usage of one verb over a local calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearVerbStats {
    /// Total calls over the day.
    pub sum: u64,
    /// Peak per-minute rate: busiest 10-minute bucket divided by ten, rounded up.
    pub rate: u64,
    /// Count quota at compaction time.
    pub count_quota: u64,
    /// Rate quota at compaction time.
    pub rate_quota: u64,
}

/// One local calendar day of usage for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaYearRow {
    /// Local calendar day.
    pub day: NaiveDate,
    /// Service the calls went to.
    pub service: ServiceId,
    /// Per-verb compacted stats.
    pub stats: VerbMap<YearVerbStats>,
}

impl QuotaYearRow {
    /// Compact the day-table rows of one service and day into a year row.
    ///
    /// `limits` is consulted now, so the quota columns reflect the policy at
    /// compaction time.
    pub fn compile<'a>(
        day: NaiveDate,
        service: ServiceId,
        rows: impl IntoIterator<Item = &'a QuotaDayRow>,
        limits: impl Fn(Verb) -> Option<QuotaLimits>,
    ) -> Self {
        let mut sums = VerbMap::<u64>::default();
        let mut peaks = VerbMap::<u64>::default();
        for row in rows {
            sums.add_assign(&row.counts);
            for (verb, count) in row.counts.iter() {
                let peak = peaks.get_mut(verb);
                *peak = (*peak).max(*count);
            }
        }
        let stats = VerbMap::from_fn(|verb| {
            let limits = limits(verb).unwrap_or_default();
            YearVerbStats {
                sum: *sums.get(verb),
                rate: peaks.get(verb).div_ceil(10),
                count_quota: limits.count,
                rate_quota: limits.rate,
            }
        });
        Self {
            day,
            service,
            stats,
        }
    }
}

/// One hourly aggregate of an instrumented operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronoBucketRow {
    /// Bucket start (top of the hour).
    pub bucket: DateTime<Utc>,
    /// Instrumented operation.
    pub operation: OperationKey,
    /// Completed runs.
    pub count: u64,
    /// Total duration of those runs, in milliseconds.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap_or_default()
    }

    #[test]
    fn quota_buckets_floor_to_ten_minutes() {
        let ts = at(1_700_000_123);
        let bucket = quota_bucket(ts);
        assert_eq!(bucket.timestamp() % 600, 0);
        assert!(ts - bucket < TimeDelta::seconds(600));
        assert_eq!(quota_bucket(bucket), bucket);
    }

    #[test]
    fn local_midnight_honors_offset() -> Result<(), Box<dyn std::error::Error>> {
        let offset = FixedOffset::east_opt(2 * 3_600).ok_or("offset")?;
        // 2023-11-14T22:13:20Z is 00:13:20 local on 2023-11-15.
        let now = at(1_700_000_000);
        assert_eq!(seconds_since_local_midnight(now, offset), 800);
        assert_eq!(local_date(now, offset).to_string(), "2023-11-15");
        let midnight = local_midnight(now, offset);
        assert_eq!(midnight, local_day_start(local_date(now, offset), offset));
        Ok(())
    }

    #[test]
    fn compile_takes_busiest_bucket_as_rate() -> Result<(), Box<dyn std::error::Error>> {
        let service = ServiceId::parse("owm")?;
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("date")?;
        let rows: Vec<QuotaDayRow> = [3u64, 7, 2]
            .iter()
            .enumerate()
            .map(|(index, count)| QuotaDayRow {
                bucket: at(1_709_251_200 + 600 * index as i64),
                service: service.clone(),
                counts: VerbMap {
                    get: *count,
                    ..VerbMap::default()
                },
            })
            .collect();
        let year = QuotaYearRow::compile(day, service, &rows, |verb| {
            (verb == Verb::Get).then_some(QuotaLimits::new(1_000, 60))
        });
        assert_eq!(year.stats.get.sum, 12);
        assert_eq!(year.stats.get.rate, 1);
        assert_eq!(year.stats.get.count_quota, 1_000);
        assert_eq!(year.stats.post, YearVerbStats::default());
        Ok(())
    }
}
