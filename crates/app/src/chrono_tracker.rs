//! Start/stop instrumentation aggregated per operation and flushed into hourly buckets.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use stratus_domain::{ChronoAggregate, ChronoBucketRow, ChronoHandle, OperationKey, chrono_bucket};
use stratus_ports::{ChronoStorePort, ClockPort, LogLevel, LoggerPort, log_fields};
use stratus_shared::{RequestContext, Result};

/// Outcome of one chrono flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChronoFlushReport {
    /// Rows persisted.
    pub written: usize,
    /// Rows that failed and were restored in memory.
    pub failed: usize,
}

/// Duration/count instrumentation keyed by operation.
pub struct ChronoTracker {
    clock: Arc<dyn ClockPort>,
    store: Arc<dyn ChronoStorePort>,
    logger: Option<Arc<dyn LoggerPort>>,
    open: Mutex<HashMap<ChronoHandle, DateTime<Utc>>>,
    aggregates: Mutex<BTreeMap<OperationKey, ChronoAggregate>>,
}

impl ChronoTracker {
    /// Build a tracker over the given clock and store.
    #[must_use]
    pub fn new(
        clock: Arc<dyn ClockPort>,
        store: Arc<dyn ChronoStorePort>,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        Self {
            clock,
            store,
            logger,
            open: Mutex::new(HashMap::new()),
            aggregates: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open a fresh handle for `operation`, recording the current time.
    pub fn start(&self, operation: OperationKey) -> ChronoHandle {
        let handle = ChronoHandle::new(operation);
        let now = self.clock.now();
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.clone(), now);
        handle
    }

    /// Close `handle` and account its duration.
    ///
    /// Returns the elapsed milliseconds, or `None` for unknown or already-stopped handles.
    pub fn stop(&self, handle: &ChronoHandle) -> Option<u64> {
        let started = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)?;
        let elapsed_ms = elapsed_ms(started, self.clock.now());
        self.aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(handle.operation().clone())
            .or_default()
            .record(elapsed_ms);
        Some(elapsed_ms)
    }

    /// Run `future` between `start` and `stop` of a handle for `operation`.
    ///
    /// The handle is stopped even when the returned future is dropped mid-way.
    pub async fn measure<F, T>(&self, operation: OperationKey, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = StopOnDrop {
            tracker: self,
            handle: self.start(operation),
        };
        future.await
    }

    /// Upsert-add every non-empty aggregate into the bucket of the current hour.
    ///
    /// The in-memory map is drained up front; rows that fail to persist are merged
    /// back so a later flush retries them.
    pub async fn flush(&self, ctx: &RequestContext) -> Result<ChronoFlushReport> {
        ctx.ensure_not_cancelled("chrono.flush")?;
        let drained = std::mem::take(
            &mut *self
                .aggregates
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let bucket = chrono_bucket(self.clock.now());
        let mut report = ChronoFlushReport::default();

        for (operation, aggregate) in drained {
            if aggregate.is_empty() {
                continue;
            }
            let row = ChronoBucketRow {
                bucket,
                operation: operation.clone(),
                count: aggregate.count,
                duration_ms: aggregate.total_duration_ms,
            };
            match self.store.upsert_add(ctx, row).await {
                Ok(()) => report.written += 1,
                Err(error) => {
                    report.failed += 1;
                    if let Some(logger) = self.logger.as_ref() {
                        logger.log_failure(
                            LogLevel::Warn,
                            "chrono.flush.row_failed",
                            "Failed to persist chrono aggregate",
                            Some(log_fields([(
                                "operation",
                                Value::String(operation.as_str().to_owned()),
                            )])),
                            &error,
                        );
                    }
                    self.aggregates
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .entry(operation)
                        .or_default()
                        .merge(aggregate);
                },
            }
        }

        Ok(report)
    }

    /// Delete persisted buckets older than `now - retention`.
    pub async fn prune(&self, ctx: &RequestContext, retention: TimeDelta) -> Result<u64> {
        let now = self.clock.now();
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.store.delete_before(ctx, cutoff).await?;
        if let Some(logger) = self.logger.as_ref() {
            logger.debug(
                "chrono.prune",
                "Pruned chrono buckets",
                Some(log_fields([
                    ("removed", Value::from(removed)),
                    ("cutoff", Value::String(cutoff.to_rfc3339())),
                ])),
            );
        }
        Ok(removed)
    }

    /// Current in-memory aggregates.
    pub fn snapshot(&self) -> BTreeMap<OperationKey, ChronoAggregate> {
        self.aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of started-but-not-stopped handles.
    pub fn open_handles(&self) -> usize {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct StopOnDrop<'a> {
    tracker: &'a ChronoTracker,
    handle: ChronoHandle,
}

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.tracker.stop(&self.handle);
    }
}

fn elapsed_ms(started: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = now - started;
    let millis = delta.num_microseconds().map_or_else(
        || delta.num_milliseconds(),
        |micros| (micros + 500).div_euclid(1_000),
    );
    u64::try_from(millis).unwrap_or(0)
}
