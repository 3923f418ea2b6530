//! Investment model
//!
//! A purchased, time-bounded mining-engine position. Each investment carries:
//! - An immutable terms snapshot captured at purchase (principal, rate,
//!   interval, period count, start/end instants)
//! - Mutable accrual state (last recorded boundary, running total, status)
//!
//! The terms are frozen at purchase and never re-read from the engine
//! template that produced them; repricing a template must not shift the
//! economics of positions already in flight.
//!
//! CRITICAL: All money values are `Decimal`, rounded to 8 fractional digits
//! at the point a payout amount is computed, never re-derived from totals.

use crate::core::time::Interval;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits every payout amount is rounded to
pub const AMOUNT_SCALE: u32 = 8;

/// Hours in one day, used to derive the hourly payout from the
/// daily-equivalent rate
const HOURS_PER_DAY: i64 = 24;

/// Investment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    /// Accruing payouts until maturity
    Active,

    /// All periods recorded and maturity reached; terminal
    Completed,

    /// Cancelled by an external action before maturity; terminal
    Cancelled,
}

/// Errors that can occur during investment state transitions
#[derive(Debug, Error, PartialEq)]
pub enum InvestmentError {
    #[error("investment is cancelled and cannot transition to {attempted:?}")]
    Cancelled { attempted: InvestmentStatus },

    #[error("accrued total cannot decrease: current {current}, proposed {proposed}")]
    ShrinkingTotal { current: Decimal, proposed: Decimal },

    #[error("last accrual marker {marker} is after maturity {maturity}")]
    MarkerPastMaturity {
        marker: DateTime<Utc>,
        maturity: DateTime<Utc>,
    },
}

/// A purchased mining-engine position
///
/// # Example
/// ```
/// use mining_yield_core_rs::{Interval, Investment};
/// use chrono::{Duration, TimeZone, Utc};
/// use rust_decimal::Decimal;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 16, 0, 0).unwrap();
/// let inv = Investment::new(
///     "user_1".to_string(),
///     Decimal::from(500),
///     Decimal::new(12, 2), // 12% daily-equivalent
///     Interval::Hourly,
///     2,
///     start,
/// );
///
/// assert_eq!(inv.end_time(), start + Duration::hours(2));
/// assert_eq!(inv.period_amount(), Decimal::new(25, 1)); // 500 * 0.12 / 24
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    /// Unique investment identifier (UUID)
    id: String,

    /// Owning account reference (opaque to the engine)
    owner_id: String,

    /// Invested principal, frozen at purchase
    principal: Decimal,

    /// Daily-equivalent rate as a fraction (0.12 = 12% per day), frozen at
    /// purchase
    rate: Decimal,

    /// Payout interval
    interval: Interval,

    /// Total number of payout periods
    total_periods: u32,

    /// Purchase instant; boundaries are anchored here
    start_time: DateTime<Utc>,

    /// Maturity instant: `start_time + total_periods * interval_length`
    end_time: DateTime<Utc>,

    /// Boundary of the most recently recorded payout, if any
    last_accrual_time: Option<DateTime<Utc>>,

    /// Sum of all recorded payout amounts
    total_accrued: Decimal,

    /// Current lifecycle status
    status: InvestmentStatus,
}

impl Investment {
    /// Create a new active investment purchased at `start_time`
    ///
    /// # Panics
    /// Panics if `principal <= 0`, `rate <= 0`, or `total_periods == 0`.
    pub fn new(
        owner_id: String,
        principal: Decimal,
        rate: Decimal,
        interval: Interval,
        total_periods: u32,
        start_time: DateTime<Utc>,
    ) -> Self {
        assert!(principal > Decimal::ZERO, "principal must be positive");
        assert!(rate > Decimal::ZERO, "rate must be positive");
        assert!(total_periods > 0, "total_periods must be positive");

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            principal,
            rate,
            interval,
            total_periods,
            start_time,
            end_time: interval.maturity(start_time, total_periods),
            last_accrual_time: None,
            total_accrued: Decimal::ZERO,
            status: InvestmentStatus::Active,
        }
    }

    /// Restore an investment with all fields preserved (snapshot loading)
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot(
        id: String,
        owner_id: String,
        principal: Decimal,
        rate: Decimal,
        interval: Interval,
        total_periods: u32,
        start_time: DateTime<Utc>,
        last_accrual_time: Option<DateTime<Utc>>,
        total_accrued: Decimal,
        status: InvestmentStatus,
    ) -> Self {
        Self {
            id,
            owner_id,
            principal,
            rate,
            interval,
            total_periods,
            start_time,
            end_time: interval.maturity(start_time, total_periods),
            last_accrual_time,
            total_accrued,
            status,
        }
    }

    /// Get investment ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get owner account ID
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Get invested principal
    pub fn principal(&self) -> Decimal {
        self.principal
    }

    /// Get daily-equivalent rate fraction
    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Get payout interval
    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Get total payout period count
    pub fn total_periods(&self) -> u32 {
        self.total_periods
    }

    /// Get purchase instant
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Get maturity instant
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Get the boundary of the most recently recorded payout
    pub fn last_accrual_time(&self) -> Option<DateTime<Utc>> {
        self.last_accrual_time
    }

    /// Get the running total of recorded payouts
    pub fn total_accrued(&self) -> Decimal {
        self.total_accrued
    }

    /// Get current status
    pub fn status(&self) -> InvestmentStatus {
        self.status
    }

    /// Check if the investment is still accruing
    pub fn is_active(&self) -> bool {
        self.status == InvestmentStatus::Active
    }

    /// Check if maturity has been reached at `now`
    ///
    /// # Boundary Semantics
    /// - `now < end_time`: not matured (returns `false`)
    /// - `now == end_time`: matured; the final boundary is due (returns `true`)
    /// - `now > end_time`: matured (returns `true`)
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    /// Payout amount for one period, rounded to [`AMOUNT_SCALE`] digits
    ///
    /// The stored rate is daily-equivalent, so an hourly position pays
    /// `principal * rate / 24` per period and a daily position pays
    /// `principal * rate`.
    pub fn period_amount(&self) -> Decimal {
        let raw = match self.interval {
            Interval::Hourly => self.principal * self.rate / Decimal::from(HOURS_PER_DAY),
            Interval::Daily => self.principal * self.rate,
        };
        raw.round_dp(AMOUNT_SCALE)
    }

    /// Apply an accrual state update produced inside a ledger transaction
    ///
    /// Validates that the update cannot violate the accrual invariants:
    /// totals never shrink, the marker never passes maturity, and terminal
    /// `Cancelled` is never left.
    pub(crate) fn apply_accrual_update(
        &mut self,
        last_accrual_time: Option<DateTime<Utc>>,
        total_accrued: Decimal,
        status: InvestmentStatus,
    ) -> Result<(), InvestmentError> {
        if self.status == InvestmentStatus::Cancelled && status != InvestmentStatus::Cancelled {
            return Err(InvestmentError::Cancelled { attempted: status });
        }
        if total_accrued < self.total_accrued {
            return Err(InvestmentError::ShrinkingTotal {
                current: self.total_accrued,
                proposed: total_accrued,
            });
        }
        if let Some(marker) = last_accrual_time {
            if marker > self.end_time {
                return Err(InvestmentError::MarkerPastMaturity {
                    marker,
                    maturity: self.end_time,
                });
            }
        }

        self.last_accrual_time = last_accrual_time;
        self.total_accrued = total_accrued;
        self.status = status;
        Ok(())
    }

    /// Mark the investment cancelled (external administrative action)
    ///
    /// Idempotent for already-cancelled positions; a completed position
    /// cannot be cancelled.
    pub fn cancel(&mut self) -> Result<(), InvestmentError> {
        match self.status {
            InvestmentStatus::Active => {
                self.status = InvestmentStatus::Cancelled;
                Ok(())
            }
            InvestmentStatus::Cancelled => Ok(()),
            InvestmentStatus::Completed => Err(InvestmentError::Cancelled {
                attempted: InvestmentStatus::Cancelled,
            }),
        }
    }
}
