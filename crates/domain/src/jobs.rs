//! Background job descriptors and their state machine.

use crate::JobKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a background process.
///
/// ```text
/// Ready ──▶ Running ──▶ Done
///   ▲          │ ├────▶ Failed
///   │          │ └────▶ Paused ──▶ Running
///   └──────────┘ (retriable error)
/// ```
///
/// A `Ready` or `Paused` job whose kind cannot be resolved goes straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its first run (or a retry).
    Ready,
    /// Currently executing.
    Running,
    /// Yielded mid-way; resumes on the next pass.
    Paused,
    /// Finished successfully.
    Done,
    /// Finished with a non-retriable error.
    Failed,
}

impl JobState {
    /// Returns true when a pass should pick the job up.
    #[must_use]
    pub const fn is_runnable(self, only_paused: bool) -> bool {
        match self {
            Self::Paused => true,
            Self::Ready => !only_paused,
            Self::Running | Self::Done | Self::Failed => false,
        }
    }

    /// Returns true when the job will never run again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Ready | Self::Paused, Self::Running | Self::Failed)
                | (
                    Self::Running,
                    Self::Paused | Self::Done | Self::Failed | Self::Ready
                )
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A background process as stored by the job registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    /// Unique job id.
    pub id: Uuid,
    /// Kind, resolved through the job catalog.
    pub kind: JobKind,
    /// Free-form arguments handed to the job factory.
    #[serde(default)]
    pub args: serde_json::Value,
    /// Current lifecycle state.
    pub state: JobState,
}

impl JobDescriptor {
    /// New `Ready` job with a fresh id.
    #[must_use]
    pub fn new(kind: JobKind, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            args,
            state: JobState::Ready,
        }
    }

    /// Returns true when the job resumes from a pause.
    #[must_use]
    pub const fn is_resume(&self) -> bool {
        matches!(self.state, JobState::Paused)
    }
}

/// Successful result of one job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// The job finished all its work.
    Done,
    /// The job yielded and wants to be resumed.
    Paused,
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Done => Self::Done,
            JobOutcome::Paused => Self::Paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runnable_states_depend_on_pass_kind() {
        assert!(JobState::Ready.is_runnable(false));
        assert!(!JobState::Ready.is_runnable(true));
        assert!(JobState::Paused.is_runnable(true));
        assert!(!JobState::Done.is_runnable(false));
        assert!(!JobState::Running.is_runnable(false));
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        assert!(JobState::Ready.can_transition_to(JobState::Running));
        assert!(JobState::Paused.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Ready));
        assert!(!JobState::Done.can_transition_to(JobState::Running));
        assert!(!JobState::Ready.can_transition_to(JobState::Done));
        assert!(JobState::Ready.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Ready));
        assert!(JobState::Failed.is_terminal());
    }

    #[test]
    fn outcomes_map_to_states() {
        assert_eq!(JobState::from(JobOutcome::Paused), JobState::Paused);
        assert_eq!(JobState::from(JobOutcome::Done), JobState::Done);
    }
}
