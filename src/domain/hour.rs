//! Hour-aligned timestamps and inclusive hour ranges.
//!
//! All timestamps are naive UTC. A range `[start, end]` includes both end
//! hours, so it covers the half-open interval `[start, end + 1h)`.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

/// Storage format for hourly timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M",
];

pub fn one_hour() -> Duration {
    Duration::hours(1)
}

/// Truncate a timestamp to the start of its hour.
pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    let secs = i64::from(ts.minute()) * 60 + i64::from(ts.second());
    ts - Duration::seconds(secs) - Duration::nanoseconds(i64::from(ts.nanosecond()))
}

/// Parse a UTC timestamp in any of the formats the exchanges and the
/// database produce. A bare date is read as midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ACCEPTED_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HourRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl HourRange {
    /// Both ends are floored to the hour. Returns `None` when `end < start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        let start = floor_to_hour(start);
        let end = floor_to_hour(end);
        if end < start {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn single(hour: NaiveDateTime) -> Self {
        let hour = floor_to_hour(hour);
        Self {
            start: hour,
            end: hour,
        }
    }

    /// Every hour of the given calendar days, `00:00` of `first` through
    /// `23:00` of `last`.
    pub fn covering_dates(first: NaiveDate, last: NaiveDate) -> Option<Self> {
        let end = last.and_time(NaiveTime::MIN) + Duration::hours(23);
        Self::new(first.and_time(NaiveTime::MIN), end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Number of hourly slots in the range.
    pub fn len(&self) -> usize {
        ((self.end - self.start).num_hours() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn intersect(&self, other: &HourRange) -> Option<HourRange> {
        HourRange::new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest range containing both.
    pub fn hull(&self, other: &HourRange) -> HourRange {
        HourRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn hours(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        let start = self.start;
        (0..self.len() as i64).map(move |i| start + Duration::hours(i))
    }
}

impl fmt::Display for HourRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {}",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}
