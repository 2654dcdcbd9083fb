//! Cooperative background-process runner.
//!
//! A run executes every runnable job once, then keeps resuming paused jobs
//! until the wall-clock budget is spent or nothing is left to resume. The
//! budget is checked between jobs only.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use stratus_domain::{JobDescriptor, JobKind, JobState, OperationKey};
use stratus_ports::{
    BackgroundProcess, ClockPort, JobRegistryPort, LogFields, LogLevel, LoggerPort, log_fields,
};
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use uuid::Uuid;

use crate::chrono_tracker::ChronoTracker;

/// Budget used when the platform imposes no limit (or a generous one).
pub const DEFAULT_MAX_TIME_SECS: u64 = 120;

/// Limits at or above this value fall back to `DEFAULT_MAX_TIME_SECS`.
pub const LIMIT_FALLBACK_THRESHOLD_SECS: u64 = 180;

/// Wall-clock budget of one run for a platform execution-time limit.
///
/// `0` means "no limit". Limits below 180 seconds yield two thirds of the limit,
/// rounded down; anything else yields 120 seconds.
#[must_use]
pub const fn max_time_secs(execution_time_limit_secs: u64) -> u64 {
    if execution_time_limit_secs == 0 || execution_time_limit_secs >= LIMIT_FALLBACK_THRESHOLD_SECS
    {
        DEFAULT_MAX_TIME_SECS
    } else {
        execution_time_limit_secs * 2 / 3
    }
}

type JobFactory = dyn Fn(&JobDescriptor) -> Arc<dyn BackgroundProcess> + Send + Sync;

/// Maps job kinds to factories.
#[derive(Default)]
pub struct JobCatalog {
    factories: BTreeMap<JobKind, Arc<JobFactory>>,
}

impl JobCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for `kind`, replacing any previous registration.
    pub fn register<F>(&mut self, kind: JobKind, factory: F)
    where
        F: Fn(&JobDescriptor) -> Arc<dyn BackgroundProcess> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Builder form of `register`.
    #[must_use]
    pub fn with<F>(mut self, kind: JobKind, factory: F) -> Self
    where
        F: Fn(&JobDescriptor) -> Arc<dyn BackgroundProcess> + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    /// Instantiate the job described by `descriptor`, if its kind is known.
    #[must_use]
    pub fn resolve(&self, descriptor: &JobDescriptor) -> Option<Arc<dyn BackgroundProcess>> {
        self.factories
            .get(&descriptor.kind)
            .map(|factory| factory(descriptor))
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<JobKind> {
        self.factories.keys().cloned().collect()
    }
}

/// Summary of one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Budget of the run.
    pub max_time_secs: u64,
    /// Passes started (initial pass included).
    pub passes: u32,
    /// Jobs invoked.
    pub executed: u32,
    /// Jobs that ended `Failed`.
    pub failed: u32,
    /// Jobs that ended `Paused`.
    pub paused: u32,
    /// Whole seconds spent.
    pub elapsed_secs: u64,
}

/// Runs registered background processes within a wall-clock budget.
pub struct ProcessManager {
    registry: Arc<dyn JobRegistryPort>,
    catalog: Arc<JobCatalog>,
    chrono: Arc<ChronoTracker>,
    clock: Arc<dyn ClockPort>,
    logger: Option<Arc<dyn LoggerPort>>,
    execution_time_limit_secs: u64,
}

impl ProcessManager {
    /// Build a runner from its collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<dyn JobRegistryPort>,
        catalog: Arc<JobCatalog>,
        chrono: Arc<ChronoTracker>,
        clock: Arc<dyn ClockPort>,
        logger: Option<Arc<dyn LoggerPort>>,
        execution_time_limit_secs: u64,
    ) -> Self {
        Self {
            registry,
            catalog,
            chrono,
            clock,
            logger,
            execution_time_limit_secs,
        }
    }

    /// Budget of one run, in seconds.
    #[must_use]
    pub const fn max_time_secs(&self) -> u64 {
        max_time_secs(self.execution_time_limit_secs)
    }

    /// The job registry this runner drains.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn JobRegistryPort> {
        &self.registry
    }

    /// Execute due jobs until the budget is spent.
    pub async fn run(&self, ctx: &RequestContext) -> Result<RunReport> {
        let started = self.clock.now();
        let mut report = RunReport {
            max_time_secs: self.max_time_secs(),
            ..RunReport::default()
        };

        let mut deferred = BTreeSet::new();
        let first = self
            .pass(ctx, false, started, &mut deferred, &mut report)
            .await?;
        if first > 0 {
            while report.elapsed_secs < report.max_time_secs {
                if self
                    .pass(ctx, true, started, &mut deferred, &mut report)
                    .await?
                    == 0
                {
                    break;
                }
            }
        }

        if let Some(logger) = self.logger.as_ref() {
            logger.info(
                "runner.completed",
                "Background processes run completed",
                Some(log_fields([
                    ("passes", Value::from(report.passes)),
                    ("executed", Value::from(report.executed)),
                    ("failed", Value::from(report.failed)),
                    ("paused", Value::from(report.paused)),
                    ("elapsedSecs", Value::from(report.elapsed_secs)),
                    ("maxTimeSecs", Value::from(report.max_time_secs)),
                ])),
            );
        }
        Ok(report)
    }

    /// One pass over the runnable jobs; returns how many were invoked.
    ///
    /// Jobs in `deferred` hit a retriable error earlier in this run and wait for
    /// the next one.
    async fn pass(
        &self,
        ctx: &RequestContext,
        only_paused: bool,
        started: chrono::DateTime<chrono::Utc>,
        deferred: &mut BTreeSet<Uuid>,
        report: &mut RunReport,
    ) -> Result<u32> {
        ctx.ensure_not_cancelled("runner.pass")?;
        let jobs = self.registry.runnable(ctx, only_paused).await?;
        report.passes += 1;
        let mut invoked = 0;

        for job in jobs {
            if deferred.contains(&job.id) {
                continue;
            }
            ctx.ensure_not_cancelled("runner.job")?;
            invoked += 1;
            report.executed += 1;
            match self.execute(ctx, &job).await {
                Executed::Settled(JobState::Failed) => report.failed += 1,
                Executed::Settled(JobState::Paused) => report.paused += 1,
                Executed::Settled(_) => {},
                Executed::Deferred => {
                    deferred.insert(job.id);
                },
            }

            report.elapsed_secs = u64::try_from((self.clock.now() - started).num_seconds())
                .unwrap_or(0);
            if report.elapsed_secs > report.max_time_secs {
                break;
            }
        }

        Ok(invoked)
    }

    /// Run one job and record its new state.
    ///
    /// A retriable error puts the job back in the state it was picked up in, so a
    /// resumed job keeps its resume point.
    async fn execute(&self, ctx: &RequestContext, job: &JobDescriptor) -> Executed {
        let Some(process) = self.catalog.resolve(job) else {
            let error = ErrorEnvelope::expected(
                ErrorCode::job("unknown_kind"),
                format!("no job registered for kind `{}`", job.kind),
            )
            .with_metadata("kind", job.kind.as_str());
            self.log_job_error(job, &error);
            self.transition(ctx, job, JobState::Failed).await;
            return Executed::Settled(JobState::Failed);
        };

        self.transition(ctx, job, JobState::Running).await;
        let resume = job.is_resume();
        let outcome = self
            .chrono
            .measure(OperationKey::for_job(&job.kind), process.run(ctx, resume, job.id))
            .await;

        let executed = match outcome {
            Ok(outcome) => Executed::Settled(JobState::from(outcome)),
            Err(error) => {
                self.log_job_error(job, &error);
                if error.is_cancelled() {
                    Executed::Settled(JobState::Paused)
                } else if error.class.is_retriable() {
                    Executed::Deferred
                } else {
                    Executed::Settled(JobState::Failed)
                }
            },
        };
        let next = match executed {
            Executed::Settled(state) => state,
            Executed::Deferred if job.state == JobState::Paused => JobState::Paused,
            Executed::Deferred => JobState::Ready,
        };
        self.transition(ctx, job, next).await;
        executed
    }

    async fn transition(&self, ctx: &RequestContext, job: &JobDescriptor, state: JobState) {
        if let Err(error) = self.registry.set_state(ctx, job.id, state).await {
            if let Some(logger) = self.logger.as_ref() {
                let mut fields = job_fields(job);
                fields.insert("state".into(), Value::from(state.as_str()));
                logger.log_failure(
                    LogLevel::Warn,
                    "runner.transition_failed",
                    "Failed to record job state",
                    Some(fields),
                    &error,
                );
            }
        }
    }

    fn log_job_error(&self, job: &JobDescriptor, error: &ErrorEnvelope) {
        if let Some(logger) = self.logger.as_ref() {
            logger.log_failure(
                LogLevel::Error,
                "runner.job_failed",
                "Background process failed",
                Some(job_fields(job)),
                error,
            );
        }
    }
}

/// What one invocation left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Executed {
    Settled(JobState),
    /// Retriable failure; back to its previous state until the next run.
    Deferred,
}

fn job_fields(job: &JobDescriptor) -> LogFields {
    log_fields([
        ("kind", Value::from(job.kind.as_str())),
        ("jobId", Value::String(job.id.to_string())),
    ])
}
