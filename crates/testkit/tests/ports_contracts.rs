//! Contract-style tests for port traits using in-memory adapters.

use chrono::{NaiveDate, TimeDelta};
use std::sync::Arc;
use stratus_domain::{
    ChronoBucketRow, CronInterval, JobOutcome, OperationKey, QuotaDayRow, QuotaLimits,
    QuotaYearRow, ServiceId, Verb, VerbMap,
};
use stratus_ports::{
    BackgroundProcess, ChronoStorePort, ClockPort, CronHostPort, DayRowQuery, LogLevel,
    LoggerPort, QuotaPolicyPort, QuotaStorePort, log_fields,
};
use stratus_shared::{ErrorEnvelope, RequestContext};
use stratus_testkit::errors::timeout_error;
use stratus_testkit::in_memory::{InMemoryStatsStore, ManualClock, RecordingLogger, StaticPolicy};
use stratus_testkit::scripted::{CountingTask, FakeCronHost, ScriptedJob};
use uuid::Uuid;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn counts(get: u64, post: u64) -> VerbMap<u64> {
    let mut map = VerbMap::<u64>::default();
    *map.get_mut(Verb::Get) = get;
    *map.get_mut(Verb::Post) = post;
    map
}

#[tokio::test]
async fn chrono_store_adds_into_existing_rows() -> TestResult {
    let ctx = RequestContext::new_tick();
    let clock = ManualClock::at("2026-03-01T10:00:00Z")?;
    let store = InMemoryStatsStore::new();
    let operation = OperationKey::parse("job.owm-fetch").map_err(ErrorEnvelope::from)?;

    for _ in 0..2 {
        store
            .upsert_add(
                &ctx,
                ChronoBucketRow {
                    bucket: clock.now(),
                    operation: operation.clone(),
                    count: 2,
                    duration_ms: 150,
                },
            )
            .await?;
    }

    let rows = store.rows_since(&ctx, clock.now()).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 4);
    assert_eq!(rows[0].duration_ms, 300);

    let removed = store
        .delete_before(&ctx, clock.now() + TimeDelta::hours(1))
        .await?;
    assert_eq!(removed, 1);
    assert!(store.chrono_snapshot().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn quota_store_filters_and_replaces() -> TestResult {
    let ctx = RequestContext::new_tick();
    let clock = ManualClock::at("2026-03-01T10:00:00Z")?;
    let store = InMemoryStatsStore::new();
    let owm = ServiceId::parse("owm").map_err(ErrorEnvelope::from)?;
    let wug = ServiceId::parse("wug").map_err(ErrorEnvelope::from)?;

    store
        .upsert_add_day(&ctx, QuotaDayRow { bucket: clock.now(), service: owm.clone(), counts: counts(3, 1) })
        .await?;
    store
        .upsert_add_day(&ctx, QuotaDayRow { bucket: clock.now(), service: owm.clone(), counts: counts(2, 0) })
        .await?;
    store
        .upsert_add_day(&ctx, QuotaDayRow { bucket: clock.now(), service: wug, counts: counts(7, 0) })
        .await?;

    let rows = store
        .day_rows(&ctx, DayRowQuery::since(clock.now()).for_service(owm.clone()))
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(*rows[0].counts.get(Verb::Get), 5);
    assert_eq!(*rows[0].counts.get(Verb::Post), 1);

    let day = NaiveDate::from_ymd_opt(2026, 3, 1).ok_or("date")?;
    let compiled = QuotaYearRow::compile(day, owm.clone(), &rows, |_| Some(QuotaLimits::new(100, 5)));
    store.replace_year(&ctx, compiled.clone()).await?;
    store.replace_year(&ctx, compiled).await?;
    let years = store.year_rows(&ctx, Some(owm), day).await?;
    assert_eq!(years.len(), 1);
    assert_eq!(years[0].stats.get(Verb::Get).sum, 5);
    Ok(())
}

#[tokio::test]
async fn injected_failures_surface_as_retriable_errors() -> TestResult {
    let ctx = RequestContext::new_tick();
    let clock = ManualClock::at("2026-03-01T10:00:00Z")?;
    let store = InMemoryStatsStore::new();
    store.fail_writes(true);
    let error = store
        .delete_day_before(&ctx, clock.now())
        .await
        .err()
        .ok_or("write should fail")?;
    assert!(error.class.is_retriable());
    store.fail_writes(false);
    assert_eq!(store.delete_day_before(&ctx, clock.now()).await?, 0);
    Ok(())
}

#[tokio::test]
async fn fake_cron_host_requires_registered_intervals() -> TestResult {
    let ctx = RequestContext::new_tick();
    let host = FakeCronHost::new();
    let task = Arc::new(CountingTask::default());

    assert!(host.schedule("stats-flush", "10_minutes", task.clone()).is_err());
    host.register_interval(CronInterval::minutes(10))?;
    host.schedule("stats-flush", "10_minutes", task.clone())?;
    assert!(host.is_scheduled("stats-flush"));
    assert!(host.fire(&ctx, "stats-flush").await?);
    assert_eq!(task.runs(), 1);

    host.unschedule("stats-flush");
    assert!(!host.fire(&ctx, "stats-flush").await?);
    assert!(host.scheduled_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn scripted_job_advances_the_clock() -> TestResult {
    let ctx = RequestContext::new_tick();
    let clock = Arc::new(ManualClock::at("2026-03-01T10:00:00Z")?);
    let start = clock.now();
    let job = ScriptedJob::new(Arc::clone(&clock))
        .then(30, JobOutcome::Paused)
        .then_fail(5, timeout_error());

    assert_eq!(job.run(&ctx, false, Uuid::nil()).await?, JobOutcome::Paused);
    assert!(job.run(&ctx, true, Uuid::nil()).await.is_err());
    assert_eq!(job.run(&ctx, true, Uuid::nil()).await?, JobOutcome::Done);
    assert_eq!(job.resume_flags(), vec![false, true, true]);
    assert_eq!((clock.now() - start).num_seconds(), 35);
    Ok(())
}

#[test]
fn recording_logger_merges_child_fields() {
    let logger = RecordingLogger::new();
    let child = logger.child(log_fields([("component", "runner".into())]));
    child.warn("runner.job_failed", "failed", Some(log_fields([("kind", "owm".into())])));

    assert!(logger.has(LogLevel::Warn, "runner.job_failed"));
    let events = logger.events_named("runner.job_failed");
    let fields = events[0].fields.clone().unwrap_or_default();
    assert_eq!(fields.len(), 2);
}

#[test]
fn static_policy_lists_services_once() -> Result<(), ErrorEnvelope> {
    let owm = ServiceId::parse("owm")?;
    let policy = StaticPolicy::new()
        .with(&owm, Verb::Get, QuotaLimits::new(1000, 60))
        .with(&owm, Verb::Post, QuotaLimits::new(10, 1));
    assert_eq!(policy.services(), vec![owm.clone()]);
    assert_eq!(policy.limits(&owm, Verb::Delete), None);
    Ok(())
}
