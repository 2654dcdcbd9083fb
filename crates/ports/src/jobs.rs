//! Background job boundary contracts.

use crate::BoxFuture;
use stratus_domain::{JobDescriptor, JobOutcome, JobState};
use stratus_shared::{RequestContext, Result};
use uuid::Uuid;

/// Storage for background process descriptors.
pub trait JobRegistryPort: Send + Sync {
    /// Runnable jobs: `Paused` only, or `Ready` and `Paused`.
    fn runnable(
        &self,
        ctx: &RequestContext,
        only_paused: bool,
    ) -> BoxFuture<'_, Result<Vec<JobDescriptor>>>;

    /// Move a job to `state`.
    fn set_state(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        state: JobState,
    ) -> BoxFuture<'_, Result<()>>;

    /// Add a new job.
    fn enqueue(&self, ctx: &RequestContext, job: JobDescriptor) -> BoxFuture<'_, Result<()>>;

    /// Look up one job.
    fn get(&self, ctx: &RequestContext, id: Uuid) -> BoxFuture<'_, Result<Option<JobDescriptor>>>;
}

/// A runnable unit of background work.
///
/// Returning `Ok(JobOutcome::Paused)` yields; the runner resumes the job on a later
/// pass with `resume = true`.
pub trait BackgroundProcess: Send + Sync {
    /// Execute (or resume) the job.
    fn run(
        &self,
        ctx: &RequestContext,
        resume: bool,
        id: Uuid,
    ) -> BoxFuture<'_, Result<JobOutcome>>;
}
