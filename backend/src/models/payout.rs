//! Payout event model
//!
//! One recorded payout for one period of one investment. Identity is the
//! composite `(investment_id, accrual_time)` pair, the idempotency key that
//! makes repeated and concurrent accrual runs safe. Events are immutable
//! once written; the engine never updates or deletes them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single recorded payout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutEvent {
    /// Investment this payout belongs to
    investment_id: String,

    /// Exact period boundary the payout is for: `start_time + k * L`
    accrual_time: DateTime<Utc>,

    /// Payout amount, rounded once at computation time
    amount: Decimal,

    /// Instant the event was written (the run's reference time)
    created_at: DateTime<Utc>,

    /// Optional free-text note
    note: Option<String>,
}

impl PayoutEvent {
    /// Create a new payout event
    pub fn new(
        investment_id: String,
        accrual_time: DateTime<Utc>,
        amount: Decimal,
        created_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Self {
        Self {
            investment_id,
            accrual_time,
            amount,
            created_at,
            note,
        }
    }

    /// Get the owning investment ID
    pub fn investment_id(&self) -> &str {
        &self.investment_id
    }

    /// Get the period boundary this payout is for
    pub fn accrual_time(&self) -> DateTime<Utc> {
        self.accrual_time
    }

    /// Get the payout amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Get the instant the event was written
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the optional note
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Composite identity key
    pub fn key(&self) -> (String, DateTime<Utc>) {
        (self.investment_id.clone(), self.accrual_time)
    }
}
