//! Owner account model
//!
//! The account-balance collaborator of the accrual engine: when a payout is
//! recorded, the owner's spendable balance and lifetime earnings move inside
//! the same unit of work as the payout event itself.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spendable balance and lifetime earnings for one owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Owner identifier (opaque to the engine)
    owner_id: String,

    /// Spendable balance
    available_balance: Decimal,

    /// Lifetime earnings counter; only ever increases
    total_earned: Decimal,
}

impl Account {
    /// Create an empty account for `owner_id`
    pub fn new(owner_id: String) -> Self {
        Self {
            owner_id,
            available_balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
        }
    }

    /// Restore an account with all fields preserved (snapshot loading)
    pub fn from_snapshot(
        owner_id: String,
        available_balance: Decimal,
        total_earned: Decimal,
    ) -> Self {
        Self {
            owner_id,
            available_balance,
            total_earned,
        }
    }

    /// Get owner ID
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Get spendable balance
    pub fn available_balance(&self) -> Decimal {
        self.available_balance
    }

    /// Get lifetime earnings
    pub fn total_earned(&self) -> Decimal {
        self.total_earned
    }

    /// Credit a recorded payout to this account
    ///
    /// # Panics
    /// Panics if `amount` is negative; payouts are never reversed.
    pub fn credit(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "credit amount must not be negative");
        self.available_balance += amount;
        self.total_earned += amount;
    }
}
