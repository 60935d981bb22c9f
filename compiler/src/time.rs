// time.rs: Logical time values
//
// Delays, safe-to-process offsets and network latency bounds are all
// non-negative logical durations. They are stored as nanoseconds with a
// distinguished `FOREVER`, and written as time literals (`5 msec`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::parser::{parse_time, TimeParseError};

/// A unit of logical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    Nsec,
    Usec,
    Msec,
    Sec,
    Min,
    Hour,
    Day,
    Week,
}

/// Units from largest to smallest, for display normalization.
const UNITS_DESCENDING: [TimeUnit; 8] = [
    TimeUnit::Week,
    TimeUnit::Day,
    TimeUnit::Hour,
    TimeUnit::Min,
    TimeUnit::Sec,
    TimeUnit::Msec,
    TimeUnit::Usec,
    TimeUnit::Nsec,
];

impl TimeUnit {
    /// Nanoseconds in one of this unit.
    pub fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nsec => 1,
            TimeUnit::Usec => 1_000,
            TimeUnit::Msec => 1_000_000,
            TimeUnit::Sec => 1_000_000_000,
            TimeUnit::Min => 60 * 1_000_000_000,
            TimeUnit::Hour => 3_600 * 1_000_000_000,
            TimeUnit::Day => 86_400 * 1_000_000_000,
            TimeUnit::Week => 604_800 * 1_000_000_000,
        }
    }

    /// Resolve a unit suffix, accepting the usual singular/plural aliases.
    pub fn from_suffix(s: &str) -> Option<Self> {
        let unit = match s {
            "ns" | "nsec" | "nsecs" => TimeUnit::Nsec,
            "us" | "usec" | "usecs" => TimeUnit::Usec,
            "ms" | "msec" | "msecs" => TimeUnit::Msec,
            "s" | "sec" | "secs" | "second" | "seconds" => TimeUnit::Sec,
            "min" | "mins" | "minute" | "minutes" => TimeUnit::Min,
            "h" | "hour" | "hours" => TimeUnit::Hour,
            "d" | "day" | "days" => TimeUnit::Day,
            "week" | "weeks" => TimeUnit::Week,
            _ => return None,
        };
        Some(unit)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Nsec => "nsec",
            TimeUnit::Usec => "usec",
            TimeUnit::Msec => "msec",
            TimeUnit::Sec => "sec",
            TimeUnit::Min => "min",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
        };
        write!(f, "{}", s)
    }
}

/// A non-negative logical duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TimeValue {
    nanos: u64,
}

impl TimeValue {
    pub const ZERO: TimeValue = TimeValue { nanos: 0 };
    pub const FOREVER: TimeValue = TimeValue { nanos: u64::MAX };

    pub fn from_nanos(nanos: u64) -> Self {
        TimeValue { nanos }
    }

    /// `magnitude` units, or `None` on overflow.
    pub fn from_parts(magnitude: u64, unit: TimeUnit) -> Option<Self> {
        let nanos = magnitude.checked_mul(unit.nanos())?;
        // u64::MAX is reserved for FOREVER.
        if nanos == u64::MAX {
            return None;
        }
        Some(TimeValue { nanos })
    }

    pub fn as_nanos(self) -> u64 {
        self.nanos
    }

    pub fn is_zero(self) -> bool {
        self.nanos == 0
    }

    pub fn is_forever(self) -> bool {
        self == Self::FOREVER
    }

    /// Sum, saturating at `FOREVER`.
    pub fn saturating_add(self, other: TimeValue) -> TimeValue {
        TimeValue {
            nanos: self.nanos.saturating_add(other.nanos),
        }
    }

    /// Difference, clamped at zero. `FOREVER` minus anything finite stays `FOREVER`.
    pub fn saturating_sub(self, other: TimeValue) -> TimeValue {
        if self.is_forever() && !other.is_forever() {
            return self;
        }
        TimeValue {
            nanos: self.nanos.saturating_sub(other.nanos),
        }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_forever() {
            return write!(f, "forever");
        }
        if self.is_zero() {
            return write!(f, "0");
        }
        for unit in UNITS_DESCENDING {
            if self.nanos % unit.nanos() == 0 {
                return write!(f, "{} {}", self.nanos / unit.nanos(), unit);
            }
        }
        write!(f, "{} nsec", self.nanos)
    }
}

impl FromStr for TimeValue {
    type Err = Vec<TimeParseError>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time(s)
    }
}

/// Render parse errors as a single line for CLI and serde messages.
pub fn describe_errors(errors: &[TimeParseError]) -> String {
    errors
        .iter()
        .map(|e| format!("{} (at {}..{})", e.message, e.span.start, e.span.end))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_time(&text).map_err(|errors| {
            serde::de::Error::custom(format!(
                "invalid time value '{}': {}",
                text,
                describe_errors(&errors)
            ))
        })
    }
}
