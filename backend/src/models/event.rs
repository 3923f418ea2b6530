//! Engine event logging for auditing and replay.
//!
//! Every significant state change the engine makes is captured as a typed
//! event. The log enables:
//! - Auditing (verify each payout was recorded exactly once, and when)
//! - Debugging (reconstruct what a batch run did)
//! - Downstream consumers (an external notifier reads completions)
//!
//! The engine only appends; it never sends anything anywhere itself.

use crate::scheduler::RunClass;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Engine event capturing a state change or run outcome.
///
/// All events carry the reference instant (`at`) of the run that produced
/// them, so a catch-up run that records old boundaries is still attributable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A payout period was recorded
    PayoutRecorded {
        at: DateTime<Utc>,
        investment_id: String,
        period_index: u32,
        accrual_time: DateTime<Utc>,
        amount: Decimal,
    },

    /// An investment reached maturity and was closed out
    InvestmentCompleted {
        at: DateTime<Utc>,
        investment_id: String,
        owner_id: String,
        total_accrued: Decimal,
    },

    /// An investment was skipped (not found or not active)
    InvestmentSkipped {
        at: DateTime<Utc>,
        investment_id: String,
        reason: String,
    },

    /// Recording failed for one investment; its unit of work rolled back
    InvestmentFailed {
        at: DateTime<Utc>,
        investment_id: String,
        error: String,
    },

    /// A batch run started
    RunStarted {
        at: DateTime<Utc>,
        class: RunClass,
        dry_run: bool,
    },

    /// A trigger fired while its run-class was already running
    RunSkipped {
        at: DateTime<Utc>,
        class: RunClass,
        reason: String,
    },

    /// A batch run finished
    RunCompleted {
        at: DateTime<Utc>,
        class: RunClass,
        processed: usize,
        periods_recorded: usize,
        total_amount: Decimal,
        failed: usize,
    },

    /// Consecutive fully-failed runs crossed the operator-alert threshold
    AlertRaised {
        at: DateTime<Utc>,
        class: RunClass,
        consecutive_failures: u32,
    },
}

impl EngineEvent {
    /// Reference instant of the run that produced this event
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::PayoutRecorded { at, .. }
            | EngineEvent::InvestmentCompleted { at, .. }
            | EngineEvent::InvestmentSkipped { at, .. }
            | EngineEvent::InvestmentFailed { at, .. }
            | EngineEvent::RunStarted { at, .. }
            | EngineEvent::RunSkipped { at, .. }
            | EngineEvent::RunCompleted { at, .. }
            | EngineEvent::AlertRaised { at, .. } => *at,
        }
    }
}

/// Append-only log of engine events
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<EngineEvent>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn log(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    /// Number of logged events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in append order
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Events concerning one investment
    pub fn events_for_investment(&self, investment_id: &str) -> Vec<&EngineEvent> {
        self.events
            .iter()
            .filter(|event| match event {
                EngineEvent::PayoutRecorded { investment_id: id, .. }
                | EngineEvent::InvestmentCompleted { investment_id: id, .. }
                | EngineEvent::InvestmentSkipped { investment_id: id, .. }
                | EngineEvent::InvestmentFailed { investment_id: id, .. } => {
                    id.as_str() == investment_id
                }
                _ => false,
            })
            .collect()
    }
}
