//! FFI boundary for the operational host layer
//!
//! Exposes the trigger interface (batch runs, single triggers, health) to
//! Python. Kept minimal: parse inputs, delegate, convert reports.

pub mod engine;
pub mod types;
