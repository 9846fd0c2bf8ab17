//! Logical time: tags and intervals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A non-negative span of logical or physical time, in nanoseconds.
///
/// Stored signed so that it composes with tag timestamps without casts.
/// Topology validation rejects negative delays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Interval(pub i64);

impl Interval {
    /// Zero delay: strict causal ordering.
    pub const ZERO: Self = Interval(0);

    /// Create from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Interval(nanos)
    }

    /// Create from microseconds.
    pub const fn from_micros(micros: i64) -> Self {
        Interval(micros * 1_000)
    }

    /// Create from milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Interval(millis * 1_000_000)
    }

    /// Create from seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Interval(secs * 1_000_000_000)
    }

    /// Get the raw nanosecond value.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Whether this is the zero interval.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// A logical instant: `(timestamp, microstep)`.
///
/// Field order matters: the derived `Ord` compares `time` first and uses
/// `microstep` to break ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Timestamp in nanoseconds.
    pub time: i64,
    /// Microstep within the timestamp.
    pub microstep: u32,
}

impl Tag {
    /// Sentinel smaller than every other tag: "no tag known yet".
    pub const NEVER: Self = Tag {
        time: i64::MIN,
        microstep: 0,
    };

    /// Sentinel larger than every other tag.
    ///
    /// Used as the effective completion of a federate that has resigned, so
    /// that it never bounds anyone downstream again.
    pub const FOREVER: Self = Tag {
        time: i64::MAX,
        microstep: u32::MAX,
    };

    /// Create a new tag.
    pub const fn new(time: i64, microstep: u32) -> Self {
        Self { time, microstep }
    }

    /// Tag at the given timestamp with microstep zero.
    pub const fn at(time: i64) -> Self {
        Self { time, microstep: 0 }
    }

    /// Whether this is the `NEVER` sentinel.
    pub fn is_never(&self) -> bool {
        *self == Self::NEVER
    }

    /// Whether this is the `FOREVER` sentinel.
    pub fn is_forever(&self) -> bool {
        *self == Self::FOREVER
    }

    /// The earliest tag at which something sent at `self` over a connection
    /// with the given minimum delay can arrive.
    ///
    /// Sentinels are absorbing. A zero delay leaves the tag unchanged. A
    /// positive delay shifts the timestamp (saturating) and keeps the
    /// microstep, which keeps the mapping strictly monotone.
    pub fn delayed(self, delay: Interval) -> Self {
        if self.is_never() || self.is_forever() || delay.is_zero() {
            return self;
        }
        match self.time.checked_add(delay.as_nanos()) {
            Some(time) => Tag::new(time, self.microstep),
            None => Tag::FOREVER,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            write!(f, "NEVER")
        } else if self.is_forever() {
            write!(f, "FOREVER")
        } else {
            write!(f, "({}, {})", self.time, self.microstep)
        }
    }
}

/// Current physical time as nanoseconds since the Unix epoch.
pub fn physical_time_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_ordering() {
        assert!(Tag::new(100, 0) < Tag::new(100, 1));
        assert!(Tag::new(100, 5) < Tag::new(101, 0));
        assert!(Tag::NEVER < Tag::new(i64::MIN, 1));
        assert!(Tag::NEVER < Tag::new(0, 0));
        assert!(Tag::new(i64::MAX, 0) < Tag::FOREVER);
    }

    #[test]
    fn test_delay_zero_is_identity() {
        let tag = Tag::new(100, 3);
        assert_eq!(tag.delayed(Interval::ZERO), tag);
    }

    #[test]
    fn test_delay_shifts_time_and_keeps_microstep() {
        let tag = Tag::new(100, 3);
        assert_eq!(tag.delayed(Interval::from_nanos(10)), Tag::new(110, 3));
    }

    #[test]
    fn test_delay_sentinels_absorb() {
        assert_eq!(Tag::NEVER.delayed(Interval::from_secs(1)), Tag::NEVER);
        assert_eq!(Tag::FOREVER.delayed(Interval::from_secs(1)), Tag::FOREVER);
    }

    #[test]
    fn test_delay_saturates_to_forever() {
        let tag = Tag::new(i64::MAX - 5, 0);
        assert_eq!(tag.delayed(Interval::from_nanos(10)), Tag::FOREVER);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag::NEVER.to_string(), "NEVER");
        assert_eq!(Tag::FOREVER.to_string(), "FOREVER");
        assert_eq!(Tag::new(500, 2).to_string(), "(500, 2)");
    }

    #[test]
    fn test_interval_units() {
        assert_eq!(Interval::from_millis(100).as_nanos(), 100_000_000);
        assert_eq!(Interval::from_micros(100).as_nanos(), 100_000);
        assert_eq!(Interval::from_secs(1).as_nanos(), 1_000_000_000);
    }
}
