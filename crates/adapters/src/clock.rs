//! Clock adapters.

use chrono::{DateTime, FixedOffset, Local, Offset, TimeDelta, Utc};
use std::sync::{Mutex, PoisonError};
use stratus_ports::ClockPort;

/// Wall clock; the local offset is the host's unless pinned.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    /// Clock following the host time zone.
    #[must_use]
    pub const fn new() -> Self {
        Self { offset: None }
    }

    /// Clock with a pinned local offset.
    #[must_use]
    pub const fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

/// Clock frozen at a chosen instant; used for what-if evaluations.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    /// Clock frozen at `now` with the given local offset.
    #[must_use]
    pub const fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Clock frozen at the Unix epoch, UTC.
    #[must_use]
    pub fn epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH, Utc.fix())
    }

    /// Move the frozen instant forward.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }
}

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
    }
}
