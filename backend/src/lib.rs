//! Mining Yield Core - Rust Accrual Engine
//!
//! Deterministic accrual engine for time-bounded mining-engine investment
//! positions: decides which payout periods are due, records each exactly
//! once, and closes positions at maturity.
//!
//! # Architecture
//!
//! - **core**: Payout intervals and boundary arithmetic
//! - **models**: Domain types (Investment, PayoutEvent, Account, events)
//! - **ledger**: Storage contract, in-memory ledger, snapshots
//! - **accrual**: Pure due-period calculator
//! - **recorder**: Transactional earnings recording
//! - **scheduler**: Run-class batches with overlap guards
//! - **diagnostics**: Read-only reconciliation and health audit
//!
//! # Critical Invariants
//!
//! 1. All money values are `Decimal`, rounded once per period to 8 digits
//! 2. At most one payout event per (investment, accrual boundary)
//! 3. Every entry point takes an explicit "now"; the engine never reads
//!    the wall clock, so runs are replayable
//! 4. FFI boundary is minimal and optional

// Module declarations
pub mod accrual;
pub mod core;
pub mod diagnostics;
pub mod ledger;
pub mod models;
pub mod recorder;
pub mod scheduler;

// Re-exports for convenience
pub use accrual::{due_periods, AccrualSchedule, DuePeriod};
pub use self::core::time::Interval;
pub use diagnostics::{HealthReport, HealthStatus, HealthThresholds};
pub use ledger::{
    InsertOutcome, InvestmentRow, Ledger, LedgerError, LedgerSnapshot, LedgerTxn, MemoryLedger,
};
pub use models::{
    account::Account,
    event::{EngineEvent, EventLog},
    investment::{Investment, InvestmentError, InvestmentStatus},
    payout::PayoutEvent,
};
pub use recorder::{record_due, RecordOutcome, RecorderError, SkipReason};
pub use scheduler::{
    BatchOptions, CompletionNotice, EngineHealth, RunClass, RunReport, Scheduler, SchedulerConfig,
    SchedulerError,
};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn mining_yield_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::engine::PyEngine>()?;
    Ok(())
}
