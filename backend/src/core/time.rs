//! Payout interval arithmetic
//!
//! Investments accrue at exact boundaries anchored to the purchase instant:
//! `start_time + k * interval_length` for `k = 1..=total_periods`. Boundaries
//! are never rounded to wall-clock hours or midnights.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payout interval of an investment
///
/// # Example
/// ```
/// use mining_yield_core_rs::Interval;
/// use chrono::{TimeZone, Utc};
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();
/// let first = Interval::Daily.boundary(start, 1);
/// assert_eq!(first, Utc.with_ymd_and_hms(2024, 1, 2, 16, 0, 0).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// One payout per hour
    Hourly,
    /// One payout per day
    Daily,
}

impl Interval {
    /// Length of one period
    pub fn length(&self) -> Duration {
        match self {
            Interval::Hourly => Duration::hours(1),
            Interval::Daily => Duration::days(1),
        }
    }

    /// Exact boundary of period `k` (1-indexed) for an investment anchored
    /// at `start`
    pub fn boundary(&self, start: DateTime<Utc>, k: u32) -> DateTime<Utc> {
        match self {
            Interval::Hourly => start + Duration::hours(i64::from(k)),
            Interval::Daily => start + Duration::days(i64::from(k)),
        }
    }

    /// Number of whole periods elapsed between `start` and `until`
    ///
    /// Returns 0 when `until <= start`. A boundary that falls exactly on
    /// `until` counts as elapsed.
    ///
    /// # Example
    /// ```
    /// use mining_yield_core_rs::Interval;
    /// use chrono::{Duration, TimeZone, Utc};
    ///
    /// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    /// let later = start + Duration::minutes(125);
    /// assert_eq!(Interval::Hourly.periods_between(start, later), 2);
    /// ```
    pub fn periods_between(&self, start: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
        if until <= start {
            return 0;
        }
        let elapsed = until - start;
        match self {
            Interval::Hourly => elapsed.num_hours(),
            Interval::Daily => elapsed.num_days(),
        }
    }

    /// Maturity instant: `start + total_periods * interval_length`
    pub fn maturity(&self, start: DateTime<Utc>, total_periods: u32) -> DateTime<Utc> {
        self.boundary(start, total_periods)
    }

    /// Canonical lowercase name, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Hourly => "hourly",
            Interval::Daily => "daily",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an interval name fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIntervalError(pub String);

impl fmt::Display for ParseIntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown interval type: {}", self.0)
    }
}

impl std::error::Error for ParseIntervalError {}

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Interval::Hourly),
            "daily" => Ok(Interval::Daily),
            other => Err(ParseIntervalError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_periods_between_before_start() {
        assert_eq!(Interval::Hourly.periods_between(at(12, 0), at(11, 0)), 0);
        assert_eq!(Interval::Hourly.periods_between(at(12, 0), at(12, 0)), 0);
    }

    #[test]
    fn test_boundary_counts_when_exactly_reached() {
        assert_eq!(Interval::Hourly.periods_between(at(12, 0), at(13, 0)), 1);
        assert_eq!(Interval::Hourly.periods_between(at(12, 0), at(13, 59)), 1);
    }

    #[test]
    fn test_parse_roundtrip() {
        assert_eq!("hourly".parse::<Interval>().unwrap(), Interval::Hourly);
        assert_eq!("daily".parse::<Interval>().unwrap(), Interval::Daily);
        assert!("weekly".parse::<Interval>().is_err());
    }
}
