//! Investment ledger contract
//!
//! The ledger is the only shared mutable resource in the engine. This module
//! defines the storage contract the accrual engine needs, not a persistence
//! technology. The crate ships [`MemoryLedger`], the in-memory implementation
//! used by tests and the FFI host; a database-backed implementation satisfies
//! the same traits.
//!
//! # Critical Invariants
//!
//! 1. **Idempotency key**: at most one payout event per
//!    `(investment_id, accrual_time)` pair. [`LedgerTxn::insert_payout_if_absent`]
//!    reports a collision as [`InsertOutcome::AlreadyExists`], an explicit
//!    value, never an error code to sniff.
//! 2. **Per-investment atomicity**: everything done inside
//!    [`Ledger::with_transaction`] commits together or not at all. The
//!    boundary is one investment, never the whole batch.
//! 3. **Conservation**: an investment's `total_accrued` equals the sum of its
//!    recorded payout amounts after every committed transaction.

pub mod memory;
pub mod row;
pub mod snapshot;

pub use memory::MemoryLedger;
pub use row::{InvestmentRow, RowError};
pub use snapshot::{LedgerSnapshot, SnapshotError};

use crate::models::account::Account;
use crate::models::investment::{Investment, InvestmentStatus};
use crate::models::payout::PayoutEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by ledger operations
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("investment not found: {0}")]
    NotFound(String),

    #[error("investment state rejected: {0}")]
    InvalidState(#[from] crate::models::investment::InvestmentError),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of an insert-if-absent on the idempotency key
///
/// `AlreadyExists` is the intended signal that another run recorded the same
/// period first; callers treat it as success and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The payout event was written by this call
    Inserted,

    /// A payout event with the same `(investment_id, accrual_time)` key was
    /// already present; nothing was written
    AlreadyExists,
}

/// Mutating operations available inside one per-investment transaction
///
/// A transaction sees a consistent view: the investment read here reflects
/// every previously committed transaction, which is why the recorder re-runs
/// the calculator against it rather than against a stale snapshot.
pub trait LedgerTxn {
    /// Fresh read of an investment inside the transaction
    fn investment(&self, id: &str) -> Option<Investment>;

    /// Insert a payout event unless its idempotency key is already taken
    fn insert_payout_if_absent(&mut self, event: PayoutEvent) -> InsertOutcome;

    /// Update the investment's accrual state and status
    fn update_accrual(
        &mut self,
        id: &str,
        last_accrual_time: Option<DateTime<Utc>>,
        total_accrued: Decimal,
        status: InvestmentStatus,
    ) -> Result<(), LedgerError>;

    /// Credit a recorded payout to the owning account
    fn credit_owner(&mut self, owner_id: &str, amount: Decimal);
}

/// Read/write contract of the investment ledger
pub trait Ledger: Send + Sync {
    /// All investments currently in `active` status
    ///
    /// `now` lets storage implementations push the maturity partition down
    /// into the query; implementations may ignore it and return every active
    /// row. Ordered by `start_time` for deterministic batch runs.
    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Investment>, LedgerError>;

    /// All investments regardless of status (diagnostics read)
    fn list_all(&self) -> Result<Vec<Investment>, LedgerError>;

    /// Read one investment
    fn get_investment(&self, id: &str) -> Result<Option<Investment>, LedgerError>;

    /// All payout events for one investment, ascending by `accrual_time`
    fn payout_events(&self, investment_id: &str) -> Result<Vec<PayoutEvent>, LedgerError>;

    /// Read one owner account
    fn account(&self, owner_id: &str) -> Result<Option<Account>, LedgerError>;

    /// Run `work` as one atomic unit scoped to `investment_id`
    ///
    /// If `work` returns an error, every write it performed is rolled back
    /// and the error is propagated. Transactions for different investments
    /// never interfere with each other's committed state.
    fn with_transaction(
        &self,
        investment_id: &str,
        work: &mut dyn FnMut(&mut dyn LedgerTxn) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError>;
}
