//! Wall-clock boundary contract.

use chrono::{DateTime, FixedOffset, Utc};

/// Source of all wall-clock time used by the scheduler core.
pub trait ClockPort: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the site's local time zone, used for calendar-day windows.
    fn local_offset(&self) -> FixedOffset;
}
