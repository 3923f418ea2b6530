//! Accrual calculator
//!
//! Pure computation with no side effects: given an investment snapshot and a
//! reference instant, decide which period boundaries are due but not yet
//! recorded. Calling it twice with the same inputs returns the same outputs,
//! which is what lets the recorder re-run it against fresh state inside a
//! transaction.
//!
//! # Algorithm
//!
//! Boundaries sit at `start_time + k * L` for `k = 1..=total_periods`. A
//! boundary is due when it is at or before `min(now, end_time)` and after
//! the last recorded boundary. The walk starts just past `last_accrual_time`
//! (from boundary 1 when nothing is recorded) and stops at the first future
//! boundary; everything before it is returned as due. A gap in scheduling
//! therefore yields several due boundaries in one call: the catch-up
//! guarantee.

use crate::models::investment::Investment;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One due payout period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuePeriod {
    /// 1-indexed period number
    pub period_index: u32,

    /// Exact boundary instant: `start_time + period_index * L`
    pub accrual_time: DateTime<Utc>,

    /// Payout amount for this period, already rounded
    pub amount: Decimal,
}

/// Result of one calculator pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualSchedule {
    /// Due boundaries in ascending order, not yet recorded
    pub due: Vec<DuePeriod>,

    /// Earliest boundary still in the future, or `None` when no periods
    /// remain
    pub next_boundary: Option<DateTime<Utc>>,
}

impl AccrualSchedule {
    /// Sum of the due payout amounts
    pub fn total_amount(&self) -> Decimal {
        self.due
            .iter()
            .fold(Decimal::ZERO, |acc, period| acc + period.amount)
    }

    /// Check whether anything is due
    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

/// Compute the due periods for `investment` as of `now`
///
/// Non-active investments yield an empty schedule: a completed position has
/// nothing left to pay and a cancelled one never pays again.
///
/// # Example
/// ```
/// use mining_yield_core_rs::accrual::due_periods;
/// use mining_yield_core_rs::{Interval, Investment};
/// use chrono::{Duration, TimeZone, Utc};
/// use rust_decimal::Decimal;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let inv = Investment::new(
///     "user_1".to_string(),
///     Decimal::from(1000),
///     Decimal::new(24, 3), // 2.4% daily-equivalent -> 1.00 per hour
///     Interval::Hourly,
///     24,
///     start,
/// );
///
/// // Five hours without a run: one call returns all five boundaries.
/// let schedule = due_periods(&inv, start + Duration::hours(5));
/// assert_eq!(schedule.due.len(), 5);
/// assert_eq!(schedule.next_boundary, Some(start + Duration::hours(6)));
/// ```
pub fn due_periods(investment: &Investment, now: DateTime<Utc>) -> AccrualSchedule {
    if !investment.is_active() {
        return AccrualSchedule {
            due: Vec::new(),
            next_boundary: None,
        };
    }

    let interval = investment.interval();
    let start = investment.start_time();
    let cutoff = now.min(investment.end_time());
    let amount = investment.period_amount();

    // Resume just past the last recorded boundary. The marker always sits
    // exactly on a boundary (ledger normalization enforces it), so the
    // period count up to it is exact.
    let first_unrecorded = match investment.last_accrual_time() {
        Some(marker) => interval.periods_between(start, marker) + 1,
        None => 1,
    };

    let mut due = Vec::new();
    for k in first_unrecorded..=i64::from(investment.total_periods()) {
        let boundary = interval.boundary(start, k as u32);
        if boundary > cutoff {
            return AccrualSchedule {
                due,
                next_boundary: Some(boundary),
            };
        }
        due.push(DuePeriod {
            period_index: k as u32,
            accrual_time: boundary,
            amount,
        });
    }

    AccrualSchedule {
        due,
        next_boundary: None,
    }
}
