//! Trace time.
//!
//! Trace timestamps are integer nanoseconds on the trace clock. Inferred events
//! do not have an exact time: they are bounded by the interval between the last
//! coherent event and the incoherent one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A point on the trace clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from a nanosecond value.
    #[must_use]
    pub const fn new(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the nanosecond value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// A closed interval `[start, end]` of trace time.
///
/// Used as the window in which an inferred event could have happened.
///
/// # Examples
///
/// ```
/// use tracecoherence::{TimeBounds, Timestamp};
///
/// let bounds = TimeBounds::new(Timestamp::new(13), Timestamp::new(19)).unwrap();
/// assert_eq!(bounds.interpolate(1, 1), Timestamp::new(16));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeBounds {
    /// Start of the window (inclusive).
    pub start: Timestamp,

    /// End of the window (inclusive).
    pub end: Timestamp,
}

impl TimeBounds {
    /// Creates a window from two timestamps.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidTimeBounds` if `start > end`.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidTimeBounds { start, end });
        }
        Ok(Self { start, end })
    }

    /// Duration of the window in nanoseconds.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.end.0 - self.start.0
    }

    /// Check if a timestamp falls within this window.
    #[must_use]
    pub fn contains(&self, time: Timestamp) -> bool {
        time >= self.start && time <= self.end
    }

    /// Places the `rank`-th of `count` events evenly inside the window.
    ///
    /// The window is cut into `count + 1` equal steps (integer division), so
    /// rank 1 of 1 lands in the middle and no event sits on a bound.
    #[must_use]
    pub fn interpolate(&self, rank: u64, count: u64) -> Timestamp {
        let step = self.duration() / (count + 1);
        let offset = step.saturating_mul(rank).min(self.duration());
        Timestamp(self.start.0 + offset)
    }
}

impl fmt::Display for TimeBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_rejects_inverted() {
        assert!(TimeBounds::new(Timestamp::new(5), Timestamp::new(4)).is_err());
        assert!(TimeBounds::new(Timestamp::new(5), Timestamp::new(5)).is_ok());
    }

    #[test]
    fn test_interpolate_middle() {
        let bounds = TimeBounds::new(Timestamp::new(13), Timestamp::new(19)).unwrap();
        assert_eq!(bounds.interpolate(1, 1), Timestamp::new(16));
    }

    #[test]
    fn test_interpolate_spreads_ranks() {
        let bounds = TimeBounds::new(Timestamp::new(100), Timestamp::new(200)).unwrap();
        let ts: Vec<u64> = (1..=3).map(|r| bounds.interpolate(r, 3).value()).collect();
        assert_eq!(ts, vec![125, 150, 175]);
        assert!(ts.iter().all(|t| bounds.contains(Timestamp::new(*t))));
    }

    #[test]
    fn test_interpolate_empty_window() {
        let bounds = TimeBounds::new(Timestamp::new(7), Timestamp::new(7)).unwrap();
        assert_eq!(bounds.interpolate(2, 4), Timestamp::new(7));
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::new(1) < Timestamp::new(2));
        assert_eq!(format!("{}", Timestamp::new(42)), "42");
    }
}
