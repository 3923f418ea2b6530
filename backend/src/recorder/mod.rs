//! Earnings recorder
//!
//! Turns the calculator's due-period list into durable state changes,
//! exactly once per period, under a single atomic unit of work per
//! investment.
//!
//! # Recording Flow
//!
//! ```text
//! with_transaction(investment_id):
//!   1. Fresh read of the investment (never a caller-supplied snapshot)
//!   2. Re-run the accrual calculator against that fresh state
//!   3. insert-if-absent per due boundary; a key collision means another
//!      run recorded the period first and is silently skipped
//!   4. Advance total_accrued / last_accrual_time by what THIS call
//!      actually inserted; credit the owner's account by the same amount
//!   5. If maturity is reached, close the investment out even when nothing
//!      new was inserted
//! ```
//!
//! # Critical Invariants
//!
//! - **Idempotency**: re-invoking with identical inputs changes nothing
//! - **Atomicity**: all writes for one investment commit together or roll
//!   back together; one failing investment never blocks its siblings
//! - **No overshoot**: nothing is recorded past `min(now, end_time)`

use crate::accrual::{due_periods, DuePeriod};
use crate::ledger::{InsertOutcome, Ledger, LedgerError};
use crate::models::investment::InvestmentStatus;
use crate::models::payout::PayoutEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors surfaced by a recording attempt
#[derive(Debug, Error, PartialEq)]
pub enum RecorderError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Why an investment was skipped without recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// No investment with that ID exists
    NotFound,

    /// The investment is completed or cancelled
    NotActive,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => f.write_str("not found"),
            SkipReason::NotActive => f.write_str("not active"),
        }
    }
}

/// Result of one recording attempt for one investment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Investment the attempt was for
    pub investment_id: String,

    /// Owner of the investment (empty when skipped as not found)
    pub owner_id: String,

    /// Periods newly recorded by this call (collisions excluded)
    pub recorded: Vec<DuePeriod>,

    /// Sum of the newly recorded amounts
    pub amount: Decimal,

    /// Investment's running total after this call
    pub total_accrued: Decimal,

    /// True when this call transitioned the investment to `completed`
    pub completed: bool,

    /// Set when the attempt was a no-op skip
    pub skipped: Option<SkipReason>,
}

impl RecordOutcome {
    fn skipped(investment_id: &str, reason: SkipReason) -> Self {
        Self {
            investment_id: investment_id.to_string(),
            owner_id: String::new(),
            recorded: Vec::new(),
            amount: Decimal::ZERO,
            total_accrued: Decimal::ZERO,
            completed: false,
            skipped: Some(reason),
        }
    }

    /// Number of periods newly recorded
    pub fn newly_recorded(&self) -> usize {
        self.recorded.len()
    }
}

/// Record every due period for one investment as of `now`
///
/// Not-found and not-active investments are reported as skips, not errors.
/// Storage failures roll the whole unit of work back and propagate; the
/// accrual marker is then unchanged, so the next run retries transparently.
pub fn record_due(
    ledger: &dyn Ledger,
    investment_id: &str,
    now: DateTime<Utc>,
) -> Result<RecordOutcome, RecorderError> {
    let mut outcome: Option<RecordOutcome> = None;

    ledger.with_transaction(investment_id, &mut |txn| {
        let investment = match txn.investment(investment_id) {
            Some(investment) => investment,
            None => {
                outcome = Some(RecordOutcome::skipped(investment_id, SkipReason::NotFound));
                return Ok(());
            }
        };

        if !investment.is_active() {
            outcome = Some(RecordOutcome::skipped(investment_id, SkipReason::NotActive));
            return Ok(());
        }

        let schedule = due_periods(&investment, now);

        let mut recorded: Vec<DuePeriod> = Vec::new();
        let mut amount = Decimal::ZERO;
        for period in schedule.due {
            let event = PayoutEvent::new(
                investment_id.to_string(),
                period.accrual_time,
                period.amount,
                now,
                None,
            );
            match txn.insert_payout_if_absent(event) {
                InsertOutcome::Inserted => {
                    amount += period.amount;
                    recorded.push(period);
                }
                // Another run won the race for this boundary; its
                // transaction carries the matching total update.
                InsertOutcome::AlreadyExists => {}
            }
        }

        let matured = investment.is_matured(now);
        let last_accrual_time = recorded
            .last()
            .map(|period| period.accrual_time)
            .or(investment.last_accrual_time());
        let total_accrued = investment.total_accrued() + amount;
        let status = if matured {
            InvestmentStatus::Completed
        } else {
            InvestmentStatus::Active
        };

        if !recorded.is_empty() || matured {
            txn.update_accrual(investment_id, last_accrual_time, total_accrued, status)?;
        }
        if amount > Decimal::ZERO {
            txn.credit_owner(investment.owner_id(), amount);
        }

        outcome = Some(RecordOutcome {
            investment_id: investment_id.to_string(),
            owner_id: investment.owner_id().to_string(),
            recorded,
            amount,
            total_accrued,
            completed: matured,
            skipped: None,
        });
        Ok(())
    })?;

    Ok(outcome.expect("transaction closure always sets an outcome"))
}
