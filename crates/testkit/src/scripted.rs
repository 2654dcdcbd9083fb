//! Scripted doubles for the cron host and background processes.

use crate::in_memory::ManualClock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use stratus_ports::{BackgroundProcess, BoxFuture, CronHostPort, CronInterval, JobOutcome, ScheduledTask};
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use uuid::Uuid;

struct Registration {
    interval: Box<str>,
    task: Arc<dyn ScheduledTask>,
}

/// Cron host that never fires on its own; tests call `fire`.
#[derive(Default)]
pub struct FakeCronHost {
    intervals: Mutex<BTreeMap<Box<str>, CronInterval>>,
    schedules: Mutex<BTreeMap<Box<str>, Registration>>,
    schedule_calls: AtomicUsize,
}

impl FakeCronHost {
    /// Empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered interval ids, sorted.
    pub fn intervals(&self) -> Vec<Box<str>> {
        self.intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Interval a schedule runs at.
    pub fn interval_of(&self, name: &str) -> Option<Box<str>> {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|registration| registration.interval.clone())
    }

    /// Successful `schedule` calls so far.
    pub fn schedule_calls(&self) -> usize {
        self.schedule_calls.load(Ordering::SeqCst)
    }

    /// Run one occurrence of `name`; returns `Ok(false)` when it is not scheduled.
    pub async fn fire(&self, ctx: &RequestContext, name: &str) -> Result<bool> {
        let task = self
            .schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|registration| Arc::clone(&registration.task));
        match task {
            Some(task) => {
                task.run(ctx).await?;
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

impl CronHostPort for FakeCronHost {
    fn register_interval(&self, interval: CronInterval) -> Result<()> {
        self.intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(interval.id.clone(), interval);
        Ok(())
    }

    fn schedule(&self, name: &str, interval_id: &str, task: Arc<dyn ScheduledTask>) -> Result<()> {
        let known = self
            .intervals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(interval_id);
        if !known {
            return Err(ErrorEnvelope::expected(
                ErrorCode::cron("unknown_interval"),
                format!("interval `{interval_id}` is not registered"),
            )
            .with_metadata("interval", interval_id));
        }
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.into(),
                Registration {
                    interval: interval_id.into(),
                    task,
                },
            );
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn unschedule(&self, name: &str) {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    fn scheduled_names(&self) -> Vec<Box<str>> {
        self.schedules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// One scripted invocation: advance the clock, then return `result`.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    /// Seconds the invocation "takes".
    pub advance_secs: i64,
    /// Result handed back to the runner.
    pub result: Result<JobOutcome>,
}

/// Background process that replays a fixed script against a manual clock.
///
/// Once the script is exhausted every further call returns `Done` instantly.
pub struct ScriptedJob {
    clock: Arc<ManualClock>,
    steps: Mutex<VecDeque<ScriptedStep>>,
    calls: Mutex<Vec<(Uuid, bool)>>,
}

impl ScriptedJob {
    /// Empty script.
    #[must_use]
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append a successful step.
    #[must_use]
    pub fn then(self, advance_secs: i64, outcome: JobOutcome) -> Self {
        self.push(ScriptedStep {
            advance_secs,
            result: Ok(outcome),
        })
    }

    /// Append a failing step.
    #[must_use]
    pub fn then_fail(self, advance_secs: i64, error: ErrorEnvelope) -> Self {
        self.push(ScriptedStep {
            advance_secs,
            result: Err(error),
        })
    }

    fn push(self, step: ScriptedStep) -> Self {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// `resume` flags of every invocation, in order.
    pub fn resume_flags(&self) -> Vec<bool> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, resume)| *resume)
            .collect()
    }

    /// Number of invocations.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl BackgroundProcess for ScriptedJob {
    fn run(&self, ctx: &RequestContext, resume: bool, id: Uuid) -> BoxFuture<'_, Result<JobOutcome>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("scripted_job.run")?;
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((id, resume));
            let step = self
                .steps
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match step {
                Some(step) => {
                    self.clock.advance_secs(step.advance_secs);
                    step.result
                },
                None => Ok(JobOutcome::Done),
            }
        })
    }
}

/// Scheduled task that only counts its runs.
#[derive(Debug, Default)]
pub struct CountingTask {
    runs: AtomicUsize,
}

impl CountingTask {
    /// Runs so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl ScheduledTask for CountingTask {
    fn run(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
