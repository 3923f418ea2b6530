//! Core primitives: payout intervals and boundary arithmetic

pub mod time;
