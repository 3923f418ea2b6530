//! Pure accrual computation

pub mod calculator;

pub use calculator::{due_periods, AccrualSchedule, DuePeriod};
