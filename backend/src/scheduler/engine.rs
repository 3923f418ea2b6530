//! Scheduler engine
//!
//! Drives batch accrual runs over the ledger:
//! - Enumerates active investments (in-flight plus matured-but-open)
//! - Invokes the earnings recorder per investment, isolating failures
//! - Enforces single-flight execution per run-class via explicit state
//!   owned by this component, never ambient process globals
//! - Aggregates run reports, escalates consecutive fully-failed runs, and
//!   accumulates completion notices for an external notifier
//!
//! The scheduler is cadence-agnostic: it exposes "run now" operations and
//! leaves timers or cron wiring to the operational layer. An overlapping
//! scheduled trigger is dropped, never queued; the next tick catches up
//! through the calculator's catch-up guarantee.

use crate::diagnostics::{self, HealthReport, HealthThresholds};
use crate::ledger::{Ledger, LedgerError};
use crate::core::time::Interval;
use crate::models::event::{EngineEvent, EventLog};
use crate::models::investment::Investment;
use crate::recorder::{record_due, RecordOutcome, RecorderError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// ============================================================================
// Run classes
// ============================================================================

/// Named category of batch run with its own overlap guard
///
/// Multiple classes may run concurrently; two runs of the same class may
/// not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunClass {
    /// High-cadence sweep, typically every few minutes
    Frequent,

    /// Slower full sweep with completion forcing
    Intensive,

    /// Operator-initiated maintenance pass
    Maintenance,
}

impl RunClass {
    /// All run classes, for status reporting
    pub fn all() -> [RunClass; 3] {
        [RunClass::Frequent, RunClass::Intensive, RunClass::Maintenance]
    }

    /// Canonical lowercase name, matching the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            RunClass::Frequent => "frequent",
            RunClass::Intensive => "intensive",
            RunClass::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for RunClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunClass {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frequent" => Ok(RunClass::Frequent),
            "intensive" => Ok(RunClass::Intensive),
            "maintenance" => Ok(RunClass::Maintenance),
            other => Err(SchedulerError::UnknownRunClass(other.to_string())),
        }
    }
}

// ============================================================================
// Configuration and reports
// ============================================================================

/// Options for one batch invocation
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Bypass the overlap guard (manual runs only)
    pub force: bool,

    /// Report what would be processed without invoking the recorder
    pub dry_run: bool,

    /// Restrict the in-flight sweep to one interval type
    pub interval_filter: Option<Interval>,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Consecutive fully-failed runs of one class before an operator alert
    pub alert_threshold: u32,

    /// Thresholds for the health audit
    pub health: HealthThresholds,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            health: HealthThresholds::default(),
        }
    }
}

/// Scheduler error types
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A manual, unforced trigger collided with a running batch
    #[error("run class {0} is already running")]
    AlreadyRunning(RunClass),

    #[error("unknown run class: {0}")]
    UnknownRunClass(String),

    /// Batch-level ledger failure (enumeration, not per-investment work)
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Per-investment outcome within one run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentRunDetail {
    pub investment_id: String,
    pub newly_recorded: usize,
    pub amount: Decimal,
    pub completed: bool,
    pub skipped: Option<String>,
    pub error: Option<String>,
}

/// Aggregated result of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run class, or `None` for a single-investment trigger
    pub class: Option<RunClass>,

    /// Reference instant of the run
    pub at: DateTime<Utc>,

    pub dry_run: bool,

    /// Investments examined
    pub processed: usize,

    /// Periods newly recorded across the run
    pub periods_recorded: usize,

    /// Sum of newly recorded amounts
    pub total_amount: Decimal,

    /// Investments transitioned to `completed`
    pub completed: usize,

    /// No-op skips (not found / not active)
    pub skipped: usize,

    /// Investments whose unit of work failed and rolled back
    pub failed: usize,

    pub details: Vec<InvestmentRunDetail>,
}

/// Status of one run class, for health reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunClassStatus {
    pub class: RunClass,
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Health of the whole engine: audit result plus run-class status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHealth {
    pub report: HealthReport,
    pub runs: Vec<RunClassStatus>,
}

/// Notice that an investment reached maturity and closed, for an external
/// notifier to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub investment_id: String,
    pub owner_id: String,
    pub total_accrued: Decimal,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Default, Clone)]
struct RunClassState {
    running: bool,
    last_run_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

/// Batch scheduler over a shared ledger
///
/// All methods take `&self`; run-class flags, the event log, and pending
/// completion notices live behind locks so scheduled and manual triggers
/// can race safely from different threads.
pub struct Scheduler {
    ledger: Arc<dyn Ledger>,
    config: SchedulerConfig,
    classes: Mutex<HashMap<RunClass, RunClassState>>,
    event_log: Mutex<EventLog>,
    completions: Mutex<Vec<CompletionNotice>>,
}

impl Scheduler {
    /// Create a scheduler over `ledger`
    pub fn new(ledger: Arc<dyn Ledger>, config: SchedulerConfig) -> Self {
        Self {
            ledger,
            config,
            classes: Mutex::new(HashMap::new()),
            event_log: Mutex::new(EventLog::new()),
            completions: Mutex::new(Vec::new()),
        }
    }

    /// Scheduled trigger: run `class` now, or skip silently when the class
    /// is already running
    ///
    /// Returns `Ok(None)` on an overlap skip. The skip is logged; the next
    /// tick will catch up on anything this one missed.
    pub fn run_scheduled(
        &self,
        class: RunClass,
        now: DateTime<Utc>,
    ) -> Result<Option<RunReport>, SchedulerError> {
        match self.acquire(class) {
            Some(guard) => {
                let report = self.execute(class, &BatchOptions::default(), now, guard)?;
                Ok(Some(report))
            }
            None => {
                self.log(EngineEvent::RunSkipped {
                    at: now,
                    class,
                    reason: "already running".to_string(),
                });
                Ok(None)
            }
        }
    }

    /// Manual trigger: run `class` now with explicit options
    ///
    /// Rejects with [`SchedulerError::AlreadyRunning`] on overlap unless
    /// `force` is set; a forced run proceeds without touching the running
    /// flag of the batch it overlaps.
    pub fn run_batch(
        &self,
        class: RunClass,
        opts: &BatchOptions,
        now: DateTime<Utc>,
    ) -> Result<RunReport, SchedulerError> {
        match self.acquire(class) {
            Some(guard) => self.execute(class, opts, now, guard),
            None if opts.force => self.execute(class, opts, now, RunGuard::detached(self)),
            None => {
                self.log(EngineEvent::RunSkipped {
                    at: now,
                    class,
                    reason: "rejected: already running".to_string(),
                });
                Err(SchedulerError::AlreadyRunning(class))
            }
        }
    }

    /// Run the recorder for a single investment, outside any run class
    ///
    /// Overlap with batch runs is harmless: the per-investment transaction
    /// and the idempotency key make concurrent recording safe.
    pub fn trigger_single(
        &self,
        investment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RunReport, SchedulerError> {
        let outcome = record_due(self.ledger.as_ref(), investment_id, now)?;
        let detail = self.absorb_outcome(&outcome, now);

        Ok(RunReport {
            class: None,
            at: now,
            dry_run: false,
            processed: 1,
            periods_recorded: detail.newly_recorded,
            total_amount: detail.amount,
            completed: usize::from(detail.completed),
            skipped: usize::from(detail.skipped.is_some()),
            failed: 0,
            details: vec![detail],
        })
    }

    /// Health audit plus per-class run status
    pub fn get_health(&self, now: DateTime<Utc>) -> Result<EngineHealth, SchedulerError> {
        let report = diagnostics::audit(self.ledger.as_ref(), &self.config.health, now)?;

        let classes = self.classes.lock().expect("scheduler lock poisoned");
        let runs = RunClass::all()
            .iter()
            .map(|class| {
                let state = classes.get(class).cloned().unwrap_or_default();
                RunClassStatus {
                    class: *class,
                    running: state.running,
                    last_run_at: state.last_run_at,
                    consecutive_failures: state.consecutive_failures,
                }
            })
            .collect();

        Ok(EngineHealth { report, runs })
    }

    /// Drain accumulated completion notices for the external notifier
    pub fn drain_completions(&self) -> Vec<CompletionNotice> {
        std::mem::take(&mut *self.completions.lock().expect("scheduler lock poisoned"))
    }

    /// Copy of the event log
    pub fn events(&self) -> Vec<EngineEvent> {
        self.event_log
            .lock()
            .expect("scheduler lock poisoned")
            .events()
            .to_vec()
    }

    /// Number of logged events
    pub fn event_count(&self) -> usize {
        self.event_log.lock().expect("scheduler lock poisoned").len()
    }

    /// Last run instant of a class
    pub fn last_run_at(&self, class: RunClass) -> Option<DateTime<Utc>> {
        self.classes
            .lock()
            .expect("scheduler lock poisoned")
            .get(&class)
            .and_then(|state| state.last_run_at)
    }

    /// Consecutive fully-failed runs of a class
    pub fn consecutive_failures(&self, class: RunClass) -> u32 {
        self.classes
            .lock()
            .expect("scheduler lock poisoned")
            .get(&class)
            .map(|state| state.consecutive_failures)
            .unwrap_or(0)
    }

    /// Check whether a class is currently running
    pub fn is_running(&self, class: RunClass) -> bool {
        self.classes
            .lock()
            .expect("scheduler lock poisoned")
            .get(&class)
            .map(|state| state.running)
            .unwrap_or(false)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn log(&self, event: EngineEvent) {
        self.event_log
            .lock()
            .expect("scheduler lock poisoned")
            .log(event);
    }

    /// Try to take the running flag for `class`
    fn acquire(&self, class: RunClass) -> Option<RunGuard<'_>> {
        let mut classes = self.classes.lock().expect("scheduler lock poisoned");
        let state = classes.entry(class).or_default();
        if state.running {
            return None;
        }
        state.running = true;
        Some(RunGuard {
            scheduler: self,
            class: Some(class),
        })
    }

    /// Execute one batch run; `_guard` releases the running flag on every
    /// exit path
    fn execute(
        &self,
        class: RunClass,
        opts: &BatchOptions,
        now: DateTime<Utc>,
        _guard: RunGuard<'_>,
    ) -> Result<RunReport, SchedulerError> {
        self.log(EngineEvent::RunStarted {
            at: now,
            class,
            dry_run: opts.dry_run,
        });

        let active = match self.ledger.list_active(now) {
            Ok(active) => active,
            Err(err) => {
                self.note_batch_failure(class, now);
                return Err(err.into());
            }
        };

        // In-flight sweep honors the interval filter; matured positions are
        // always swept so completion is never delayed by a filtered run.
        let (in_flight, matured): (Vec<Investment>, Vec<Investment>) = active
            .into_iter()
            .partition(|inv| inv.end_time() > now);
        let in_flight: Vec<Investment> = in_flight
            .into_iter()
            .filter(|inv| {
                opts.interval_filter
                    .map_or(true, |interval| inv.interval() == interval)
            })
            .collect();

        let targets: Vec<Investment> = in_flight.into_iter().chain(matured).collect();

        if opts.dry_run {
            let details: Vec<InvestmentRunDetail> = targets
                .iter()
                .map(|inv| InvestmentRunDetail {
                    investment_id: inv.id().to_string(),
                    newly_recorded: 0,
                    amount: Decimal::ZERO,
                    completed: false,
                    skipped: None,
                    error: None,
                })
                .collect();
            let report = RunReport {
                class: Some(class),
                at: now,
                dry_run: true,
                processed: details.len(),
                periods_recorded: 0,
                total_amount: Decimal::ZERO,
                completed: 0,
                skipped: 0,
                failed: 0,
                details,
            };
            self.log(EngineEvent::RunCompleted {
                at: now,
                class,
                processed: report.processed,
                periods_recorded: 0,
                total_amount: Decimal::ZERO,
                failed: 0,
            });
            return Ok(report);
        }

        let mut report = RunReport {
            class: Some(class),
            at: now,
            dry_run: false,
            processed: 0,
            periods_recorded: 0,
            total_amount: Decimal::ZERO,
            completed: 0,
            skipped: 0,
            failed: 0,
            details: Vec::with_capacity(targets.len()),
        };

        for investment in &targets {
            match record_due(self.ledger.as_ref(), investment.id(), now) {
                Ok(outcome) => {
                    let detail = self.absorb_outcome(&outcome, now);
                    report.periods_recorded += detail.newly_recorded;
                    report.total_amount += detail.amount;
                    report.completed += usize::from(detail.completed);
                    report.skipped += usize::from(detail.skipped.is_some());
                    report.details.push(detail);
                }
                Err(err) => {
                    // Rolled back in full; the marker did not advance, so
                    // the next run retries this investment transparently.
                    let message = err.to_string();
                    self.log(EngineEvent::InvestmentFailed {
                        at: now,
                        investment_id: investment.id().to_string(),
                        error: message.clone(),
                    });
                    report.failed += 1;
                    report.details.push(InvestmentRunDetail {
                        investment_id: investment.id().to_string(),
                        newly_recorded: 0,
                        amount: Decimal::ZERO,
                        completed: false,
                        skipped: None,
                        error: Some(message),
                    });
                }
            }
        }
        report.processed = report.details.len();

        // A run counts as failed only when nothing in it succeeded; one bad
        // investment among healthy siblings is not an outage.
        let run_failed = report.failed > 0 && report.failed == report.processed;
        self.finish_run(class, now, run_failed);

        self.log(EngineEvent::RunCompleted {
            at: now,
            class,
            processed: report.processed,
            periods_recorded: report.periods_recorded,
            total_amount: report.total_amount,
            failed: report.failed,
        });

        Ok(report)
    }

    /// Log the events for one recording outcome and collect its detail
    fn absorb_outcome(&self, outcome: &RecordOutcome, now: DateTime<Utc>) -> InvestmentRunDetail {
        for period in &outcome.recorded {
            self.log(EngineEvent::PayoutRecorded {
                at: now,
                investment_id: outcome.investment_id.clone(),
                period_index: period.period_index,
                accrual_time: period.accrual_time,
                amount: period.amount,
            });
        }

        if let Some(reason) = outcome.skipped {
            self.log(EngineEvent::InvestmentSkipped {
                at: now,
                investment_id: outcome.investment_id.clone(),
                reason: reason.to_string(),
            });
        } else if outcome.completed {
            self.log(EngineEvent::InvestmentCompleted {
                at: now,
                investment_id: outcome.investment_id.clone(),
                owner_id: outcome.owner_id.clone(),
                total_accrued: outcome.total_accrued,
            });
            self.completions
                .lock()
                .expect("scheduler lock poisoned")
                .push(CompletionNotice {
                    investment_id: outcome.investment_id.clone(),
                    owner_id: outcome.owner_id.clone(),
                    total_accrued: outcome.total_accrued,
                    at: now,
                });
        }

        InvestmentRunDetail {
            investment_id: outcome.investment_id.clone(),
            newly_recorded: outcome.newly_recorded(),
            amount: outcome.amount,
            completed: outcome.completed,
            skipped: outcome.skipped.map(|reason| reason.to_string()),
            error: None,
        }
    }

    fn finish_run(&self, class: RunClass, now: DateTime<Utc>, run_failed: bool) {
        let consecutive = {
            let mut classes = self.classes.lock().expect("scheduler lock poisoned");
            let state = classes.entry(class).or_default();
            state.last_run_at = Some(now);
            if run_failed {
                state.consecutive_failures += 1;
            } else {
                state.consecutive_failures = 0;
            }
            state.consecutive_failures
        };

        if run_failed && consecutive >= self.config.alert_threshold {
            self.log(EngineEvent::AlertRaised {
                at: now,
                class,
                consecutive_failures: consecutive,
            });
        }
    }

    /// Enumeration failed before any investment was processed
    fn note_batch_failure(&self, class: RunClass, now: DateTime<Utc>) {
        self.finish_run(class, now, true);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// RAII release of a run-class running flag
///
/// A forced run that bypassed the guard holds a detached instance, so
/// dropping it never clears the flag of the batch it overlapped.
struct RunGuard<'a> {
    scheduler: &'a Scheduler,
    class: Option<RunClass>,
}

impl<'a> RunGuard<'a> {
    fn detached(scheduler: &'a Scheduler) -> Self {
        Self {
            scheduler,
            class: None,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(class) = self.class {
            let mut classes = self
                .scheduler
                .classes
                .lock()
                .expect("scheduler lock poisoned");
            if let Some(state) = classes.get_mut(&class) {
                state.running = false;
            }
        }
    }
}
