//! In-process job registry.

use stratus_ports::{BoxFuture, JobDescriptor, JobRegistryPort, JobState};
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Job registry kept in memory, in enqueue order.
///
/// State changes are checked against the job state machine; an illegal
/// transition fails with `job:invalid_transition` and leaves the job untouched.
#[derive(Debug, Default)]
pub struct MemoryJobRegistry {
    jobs: RwLock<Vec<JobDescriptor>>,
}

impl MemoryJobRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job, in enqueue order.
    pub async fn snapshot(&self) -> Vec<JobDescriptor> {
        self.jobs.read().await.clone()
    }
}

impl JobRegistryPort for MemoryJobRegistry {
    fn runnable(
        &self,
        ctx: &RequestContext,
        only_paused: bool,
    ) -> BoxFuture<'_, Result<Vec<JobDescriptor>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("job_registry.runnable")?;
            Ok(self
                .jobs
                .read()
                .await
                .iter()
                .filter(|job| job.state.is_runnable(only_paused))
                .cloned()
                .collect())
        })
    }

    fn set_state(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        state: JobState,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("job_registry.set_state")?;
            let mut jobs = self.jobs.write().await;
            let job = jobs.iter_mut().find(|job| job.id == id).ok_or_else(|| {
                ErrorEnvelope::expected(ErrorCode::job("not_found"), format!("job {id} not found"))
            })?;
            if !job.state.can_transition_to(state) {
                return Err(ErrorEnvelope::invariant(
                    ErrorCode::job("invalid_transition"),
                    format!("job {id} cannot move from {} to {state}", job.state),
                )
                .with_metadata("from", job.state.as_str())
                .with_metadata("to", state.as_str()));
            }
            job.state = state;
            drop(jobs);
            Ok(())
        })
    }

    fn enqueue(&self, ctx: &RequestContext, job: JobDescriptor) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("job_registry.enqueue")?;
            let mut jobs = self.jobs.write().await;
            if jobs.iter().any(|existing| existing.id == job.id) {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::job("duplicate"),
                    format!("job {} is already registered", job.id),
                ));
            }
            jobs.push(job);
            drop(jobs);
            Ok(())
        })
    }

    fn get(&self, ctx: &RequestContext, id: Uuid) -> BoxFuture<'_, Result<Option<JobDescriptor>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("job_registry.get")?;
            Ok(self.jobs.read().await.iter().find(|job| job.id == id).cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stratus_domain::JobKind;

    fn job(kind: &str) -> Result<JobDescriptor> {
        let kind = JobKind::parse(kind)
            .map_err(|error| ErrorEnvelope::expected(ErrorCode::invalid_input(), error.to_string()))?;
        Ok(JobDescriptor::new(kind, json!({})))
    }

    #[tokio::test]
    async fn runnable_respects_the_pass_kind() -> Result<()> {
        let ctx = RequestContext::new_tick();
        let registry = MemoryJobRegistry::new();
        let ready = job("ingest")?;
        let paused = job("backfill")?;
        registry.enqueue(&ctx, ready.clone()).await?;
        registry.enqueue(&ctx, paused.clone()).await?;
        registry.set_state(&ctx, paused.id, JobState::Running).await?;
        registry.set_state(&ctx, paused.id, JobState::Paused).await?;

        let all: Vec<Uuid> = registry.runnable(&ctx, false).await?.iter().map(|j| j.id).collect();
        assert_eq!(all, vec![ready.id, paused.id]);
        let only_paused = registry.runnable(&ctx, true).await?;
        assert_eq!(only_paused.len(), 1);
        assert_eq!(only_paused[0].id, paused.id);
        Ok(())
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() -> Result<()> {
        let ctx = RequestContext::new_tick();
        let registry = MemoryJobRegistry::new();
        let ingest = job("ingest")?;
        registry.enqueue(&ctx, ingest.clone()).await?;

        let error = registry.set_state(&ctx, ingest.id, JobState::Done).await;
        assert!(matches!(error, Err(ref e) if e.code == ErrorCode::job("invalid_transition")));
        let stored = registry.get(&ctx, ingest.id).await?;
        assert_eq!(stored.map(|j| j.state), Some(JobState::Ready));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_duplicate_jobs_fail() -> Result<()> {
        let ctx = RequestContext::new_tick();
        let registry = MemoryJobRegistry::new();
        let ingest = job("ingest")?;
        let missing = registry.set_state(&ctx, ingest.id, JobState::Running).await;
        assert!(matches!(missing, Err(ref e) if e.code == ErrorCode::job("not_found")));

        registry.enqueue(&ctx, ingest.clone()).await?;
        assert!(registry.enqueue(&ctx, ingest).await.is_err());
        assert_eq!(registry.snapshot().await.len(), 1);
        Ok(())
    }
}
