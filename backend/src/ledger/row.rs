//! Storage-row normalization
//!
//! Storage layers and host processes hand the engine loosely-typed rows:
//! nullable accrual markers, missing totals, absent statuses. All of that is
//! resolved here, in one explicit step at the ledger boundary, so that no
//! optional numeric field ever reaches the calculator.

use crate::core::time::Interval;
use crate::models::investment::{Investment, InvestmentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors detected while normalizing a row
#[derive(Debug, Error, PartialEq)]
pub enum RowError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(Decimal),

    #[error("rate must be positive, got {0}")]
    NonPositiveRate(Decimal),

    #[error("total_periods must be at least 1")]
    ZeroPeriods,

    #[error("stored end_time {stored} does not match derived maturity {derived}")]
    InconsistentMaturity {
        stored: DateTime<Utc>,
        derived: DateTime<Utc>,
    },

    #[error("last_accrual_time {0} does not fall on a period boundary")]
    MisalignedAccrualMarker(DateTime<Utc>),

    #[error("total_accrued must not be negative, got {0}")]
    NegativeTotal(Decimal),
}

/// A loosely-typed investment row as storage or a host process provides it
///
/// `normalize` maps this into a fully-typed [`Investment`], applying the
/// defaults exactly once: fresh UUID when `id` is absent, `None` marker,
/// zero total, `active` status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentRow {
    /// Investment ID; generated when absent (new purchase)
    pub id: Option<String>,

    /// Owner reference
    pub owner_id: String,

    /// Invested principal
    pub principal: Decimal,

    /// Daily-equivalent rate fraction
    pub rate: Decimal,

    /// Payout interval
    pub interval: Interval,

    /// Total payout period count
    pub total_periods: u32,

    /// Purchase instant
    pub start_time: DateTime<Utc>,

    /// Stored maturity, when present; validated against the derived value
    pub end_time: Option<DateTime<Utc>>,

    /// Most recently recorded boundary, when any payouts exist
    pub last_accrual_time: Option<DateTime<Utc>>,

    /// Running payout total; defaults to zero
    pub total_accrued: Option<Decimal>,

    /// Lifecycle status; defaults to `active`
    pub status: Option<InvestmentStatus>,
}

impl InvestmentRow {
    /// Row for a brand-new purchase with only the immutable terms set
    pub fn new_purchase(
        owner_id: String,
        principal: Decimal,
        rate: Decimal,
        interval: Interval,
        total_periods: u32,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            owner_id,
            principal,
            rate,
            interval,
            total_periods,
            start_time,
            end_time: None,
            last_accrual_time: None,
            total_accrued: None,
            status: None,
        }
    }

    /// Validate the row and produce a fully-typed investment
    pub fn normalize(self) -> Result<Investment, RowError> {
        if self.principal <= Decimal::ZERO {
            return Err(RowError::NonPositivePrincipal(self.principal));
        }
        if self.rate <= Decimal::ZERO {
            return Err(RowError::NonPositiveRate(self.rate));
        }
        if self.total_periods == 0 {
            return Err(RowError::ZeroPeriods);
        }

        let derived_end = self.interval.maturity(self.start_time, self.total_periods);
        if let Some(stored) = self.end_time {
            if stored != derived_end {
                return Err(RowError::InconsistentMaturity {
                    stored,
                    derived: derived_end,
                });
            }
        }

        if let Some(marker) = self.last_accrual_time {
            let k = self.interval.periods_between(self.start_time, marker);
            let exact = k >= 1
                && k <= i64::from(self.total_periods)
                && self.interval.boundary(self.start_time, k as u32) == marker;
            if !exact {
                return Err(RowError::MisalignedAccrualMarker(marker));
            }
        }

        let total_accrued = self.total_accrued.unwrap_or(Decimal::ZERO);
        if total_accrued < Decimal::ZERO {
            return Err(RowError::NegativeTotal(total_accrued));
        }

        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Investment::from_snapshot(
            id,
            self.owner_id,
            self.principal,
            self.rate,
            self.interval,
            self.total_periods,
            self.start_time,
            self.last_accrual_time,
            total_accrued,
            self.status.unwrap_or(InvestmentStatus::Active),
        ))
    }
}
