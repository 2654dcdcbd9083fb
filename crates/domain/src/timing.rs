//! Chrono instrumentation values: handles and running aggregates.

use crate::OperationKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Token returned by `start` and consumed by `stop`.
///
/// The uuid suffix makes every handle unique even when many are open for the
/// same operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChronoHandle {
    operation: OperationKey,
    token: Uuid,
}

impl ChronoHandle {
    /// Mint a fresh handle for `operation`.
    #[must_use]
    pub fn new(operation: OperationKey) -> Self {
        Self {
            operation,
            token: Uuid::new_v4(),
        }
    }

    /// The operation this handle measures.
    #[must_use]
    pub const fn operation(&self) -> &OperationKey {
        &self.operation
    }

    /// Uniqueness suffix.
    #[must_use]
    pub const fn token(&self) -> Uuid {
        self.token
    }
}

impl fmt::Display for ChronoHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}#{}", self.operation, self.token.simple())
    }
}

/// Running `{count, duration}` totals for one operation since the last flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronoAggregate {
    /// Completed runs.
    pub count: u64,
    /// Total duration, in milliseconds.
    pub total_duration_ms: u64,
}

impl ChronoAggregate {
    /// Account for one completed run.
    pub const fn record(&mut self, duration_ms: u64) {
        self.count = self.count.saturating_add(1);
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
    }

    /// Fold another aggregate into this one.
    pub const fn merge(&mut self, other: Self) {
        self.count = self.count.saturating_add(other.count);
        self.total_duration_ms = self.total_duration_ms.saturating_add(other.total_duration_ms);
    }

    /// Returns true when nothing was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_for_one_operation_are_distinct() -> Result<(), crate::PrimitiveError> {
        let key = OperationKey::parse("watchdog.tick")?;
        let first = ChronoHandle::new(key.clone());
        let second = ChronoHandle::new(key);
        assert_ne!(first, second);
        assert_eq!(first.operation(), second.operation());
        assert!(first.to_string().starts_with("watchdog.tick#"));
        Ok(())
    }

    #[test]
    fn aggregates_accumulate_and_merge() {
        let mut aggregate = ChronoAggregate::default();
        assert!(aggregate.is_empty());
        aggregate.record(120);
        aggregate.record(30);
        aggregate.merge(ChronoAggregate {
            count: 2,
            total_duration_ms: 50,
        });
        assert_eq!(aggregate.count, 4);
        assert_eq!(aggregate.total_duration_ms, 200);
    }
}
