//! Cron intervals and schedule names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recurrence registered with the cron host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronInterval {
    /// Stable identifier (`3_minutes`, `6_hours`, ...).
    pub id: Box<str>,
    /// Period in seconds.
    pub seconds: u64,
    /// Human-readable label.
    pub display: Box<str>,
}

impl CronInterval {
    /// Interval of `minutes` minutes.
    #[must_use]
    pub fn minutes(minutes: u64) -> Self {
        Self {
            id: format!("{minutes}_minutes").into_boxed_str(),
            seconds: minutes.saturating_mul(60),
            display: format!("Every {minutes} minutes").into_boxed_str(),
        }
    }

    /// Interval of `hours` hours.
    #[must_use]
    pub fn hours(hours: u64) -> Self {
        Self {
            id: format!("{hours}_hours").into_boxed_str(),
            seconds: hours.saturating_mul(3_600),
            display: format!("Every {hours} hours").into_boxed_str(),
        }
    }

    /// The fixed family the watchdog registers on start.
    #[must_use]
    pub fn family() -> Vec<Self> {
        let mut family: Vec<Self> = [2, 3, 5, 6, 10, 15, 20, 30]
            .into_iter()
            .map(Self::minutes)
            .collect();
        family.push(Self::hours(4));
        family.push(Self::hours(6));
        family
    }

    /// Look up a family member by id.
    #[must_use]
    pub fn find(id: &str) -> Option<Self> {
        Self::family()
            .into_iter()
            .find(|interval| interval.id.as_ref() == id)
    }
}

impl fmt::Display for CronInterval {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.display)
    }
}

/// Names of the schedules owned by the watchdog.
pub mod names {
    /// Watchdog self-tick.
    pub const TICK: &str = "tick";
    /// Chrono and quota ledger flush.
    pub const STATS_FLUSH: &str = "stats-flush";
    /// Quota compaction and retention.
    pub const QUOTA_ROTATE: &str = "quota-rotate";
    /// Chrono retention.
    pub const CHRONO_ROTATE: &str = "chrono-rotate";
    /// Cooperative job runner.
    pub const BACKGROUND_PROCESSES: &str = "background-processes";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_covers_the_registered_intervals() {
        let ids: Vec<String> = CronInterval::family()
            .into_iter()
            .map(|interval| interval.id.into_string())
            .collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids.first().map(String::as_str), Some("2_minutes"));
        assert_eq!(ids.last().map(String::as_str), Some("6_hours"));
    }

    #[test]
    fn find_resolves_by_id() {
        assert_eq!(CronInterval::find("3_minutes").map(|i| i.seconds), Some(180));
        assert_eq!(CronInterval::find("4_hours").map(|i| i.seconds), Some(14_400));
        assert!(CronInterval::find("7_minutes").is_none());
    }
}
