//! Integration tests for the chrono tracker.

mod common;

use proptest::prelude::*;
use std::sync::Arc;
use stratus_app::ChronoTracker;
use stratus_domain::{ChronoHandle, OperationKey};
use stratus_ports::LogLevel;
use stratus_shared::{RequestContext, Result};
use stratus_testkit::in_memory::{InMemoryStatsStore, ManualClock, RecordingLogger};

fn tracker(clock: &Arc<ManualClock>, store: &Arc<InMemoryStatsStore>) -> ChronoTracker {
    ChronoTracker::new(clock.clone(), store.clone(), None)
}

fn clock() -> Result<Arc<ManualClock>> {
    Ok(Arc::new(
        ManualClock::at("2026-03-14T12:10:00Z").map_err(common::parse_error)?,
    ))
}

#[tokio::test]
async fn flush_writes_one_row_per_operation_into_the_current_hour() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let clock = clock()?;
    let store = Arc::new(InMemoryStatsStore::new());
    let chrono = tracker(&clock, &store);
    let ingest = OperationKey::parse("job.ingest")?;

    for seconds in [2, 3] {
        let handle = chrono.start(ingest.clone());
        clock.advance_secs(seconds);
        assert_eq!(chrono.stop(&handle), Some(u64::try_from(seconds * 1_000).unwrap_or(0)));
    }
    let report = chrono.flush(&ctx).await?;
    assert_eq!(report.written, 1);
    assert!(chrono.snapshot().is_empty());

    let rows = store.chrono_snapshot().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].duration_ms, 5_000);
    assert_eq!(rows[0].bucket.to_rfc3339(), "2026-03-14T12:00:00+00:00");
    Ok(())
}

#[tokio::test]
async fn aborted_measurement_closes_its_handle() -> Result<()> {
    let clock = clock()?;
    let store = Arc::new(InMemoryStatsStore::new());
    let chrono = tracker(&clock, &store);
    let tick = OperationKey::parse("schedule.stats-flush")?;

    let measured = chrono.measure(tick.clone(), std::future::pending::<()>());
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(5), measured).await;
    assert!(timed_out.is_err());
    assert_eq!(chrono.open_handles(), 0);
    assert_eq!(chrono.snapshot().get(&tick).map(|aggregate| aggregate.count), Some(1));
    Ok(())
}

#[tokio::test]
async fn failed_flush_keeps_aggregates_for_the_next_attempt() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let clock = clock()?;
    let store = Arc::new(InMemoryStatsStore::new());
    let logger = RecordingLogger::new();
    let chrono = ChronoTracker::new(clock.clone(), store.clone(), Some(Arc::new(logger.clone())));
    let ingest = OperationKey::parse("job.ingest")?;

    let handle = chrono.start(ingest.clone());
    clock.advance_secs(1);
    chrono.stop(&handle);

    store.fail_writes(true);
    assert_eq!(chrono.flush(&ctx).await?.failed, 1);
    assert!(logger.has(LogLevel::Warn, "chrono.flush.row_failed"));
    assert_eq!(chrono.snapshot().get(&ingest).map(|a| a.count), Some(1));

    store.fail_writes(false);
    assert_eq!(chrono.flush(&ctx).await?.written, 1);
    assert_eq!(store.chrono_snapshot().await[0].duration_ms, 1_000);
    Ok(())
}

#[tokio::test]
async fn measure_times_the_wrapped_future() -> Result<()> {
    let clock = clock()?;
    let store = Arc::new(InMemoryStatsStore::new());
    let chrono = tracker(&clock, &store);
    let operation = OperationKey::parse("schedule.stats-flush")?;

    let value = chrono
        .measure(operation.clone(), async {
            clock.advance_secs(4);
            7
        })
        .await;
    assert_eq!(value, 7);
    assert_eq!(chrono.open_handles(), 0);
    assert_eq!(
        chrono
            .snapshot()
            .get(&operation)
            .map(|a| (a.count, a.total_duration_ms)),
        Some((1, 4_000))
    );
    Ok(())
}

proptest! {
    #[test]
    fn durations_are_never_negative_and_handles_close_once(
        offsets in proptest::collection::vec(-3_600_i64..3_600, 1..20),
    ) {
        let clock = Arc::new(ManualClock::new(chrono::DateTime::UNIX_EPOCH + chrono::TimeDelta::days(20_000)));
        let store = Arc::new(InMemoryStatsStore::new());
        let chrono = tracker(&clock, &store);
        let operation = OperationKey::parse("job.ingest").map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut expected_ms = 0_u64;

        for offset in &offsets {
            let handle = chrono.start(operation.clone());
            clock.advance_secs(*offset);
            let elapsed = chrono.stop(&handle);
            let want = u64::try_from(offset * 1_000).unwrap_or(0);
            prop_assert_eq!(elapsed, Some(want));
            expected_ms += want;
            prop_assert_eq!(chrono.stop(&handle), None);
        }

        let before = chrono.snapshot();
        prop_assert_eq!(chrono.stop(&ChronoHandle::new(operation.clone())), None);
        prop_assert_eq!(chrono.snapshot(), before);

        let aggregate = chrono.snapshot().get(&operation).copied().unwrap_or_default();
        prop_assert_eq!(aggregate.count, offsets.len() as u64);
        prop_assert_eq!(aggregate.total_duration_ms, expected_ms);
        prop_assert_eq!(chrono.open_handles(), 0);
    }
}
