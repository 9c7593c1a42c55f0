//! Timestamps and clocks.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

const NSEC_PER_SEC: i64 = 1_000_000_000;

/// A point in time (or an offset) as whole seconds plus nanoseconds.
///
/// Values are kept normalized: `nsec` is always in `0..1_000_000_000`, so a
/// negative offset of half a second is `{ sec: -1, nsec: 500_000_000 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PpsTime {
    /// Seconds.
    pub sec: i64,
    /// Nanoseconds within the second.
    pub nsec: i32,
}

impl PpsTime {
    /// The zero time / zero offset.
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    /// Create a time, normalizing out-of-range nanoseconds.
    pub fn new(sec: i64, nsec: i64) -> Self {
        let sec = sec.saturating_add(nsec.div_euclid(NSEC_PER_SEC));
        let nsec = nsec.rem_euclid(NSEC_PER_SEC) as i32;
        Self { sec, nsec }
    }

    /// Create an offset from a signed nanosecond count.
    pub fn from_nanos(nanos: i64) -> Self {
        Self::new(0, nanos)
    }

    /// Total nanoseconds, saturating.
    pub fn as_nanos(&self) -> i64 {
        self.sec
            .saturating_mul(NSEC_PER_SEC)
            .saturating_add(i64::from(self.nsec))
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Utc::now().into()
    }

    /// Add an offset, normalizing the result.
    pub fn add_offset(self, offset: PpsTime) -> Self {
        Self::new(
            self.sec.saturating_add(offset.sec),
            i64::from(self.nsec) + i64::from(offset.nsec),
        )
    }

    /// Whether this is exactly zero.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<DateTime<Utc>> for PpsTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::new(dt.timestamp(), i64::from(dt.timestamp_subsec_nanos()))
    }
}

impl From<Duration> for PpsTime {
    fn from(d: Duration) -> Self {
        Self {
            sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            nsec: d.subsec_nanos() as i32,
        }
    }
}

impl fmt::Display for PpsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}.{:09}", self.sec, self.nsec)
    }
}

/// Source of timestamps for captured edges.
///
/// Implementations must be callable from the dispatch context: no blocking
/// and no allocation.
pub trait Clock: Send + Sync {
    /// Read the current time.
    fn now(&self) -> PpsTime;
}

/// The system real-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PpsTime {
        PpsTime::now()
    }
}
