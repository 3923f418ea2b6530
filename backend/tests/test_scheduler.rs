//! Tests for the batch scheduler
//!
//! Covers run reports, the overlap guard, force and dry-run flags, interval
//! filtering, completion sweeps, error escalation, and the end-to-end
//! purchase scenario.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mining_yield_core_rs::ledger::{Ledger, LedgerError, LedgerTxn, MemoryLedger};
use mining_yield_core_rs::scheduler::{
    BatchOptions, RunClass, Scheduler, SchedulerConfig, SchedulerError,
};
use mining_yield_core_rs::{
    Account, EngineEvent, Interval, Investment, InvestmentStatus, PayoutEvent,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn seed(ledger: &MemoryLedger, owner: &str, interval: Interval, periods: u32) -> String {
    let inv = Investment::new(
        owner.to_string(),
        dec!(1000),
        dec!(0.024),
        interval,
        periods,
        start(),
    );
    let id = inv.id().to_string();
    ledger.insert_investment(inv);
    id
}

fn scheduler_over(ledger: Arc<dyn Ledger>) -> Scheduler {
    Scheduler::new(ledger, SchedulerConfig::default())
}

// ==========================================
// Batch runs
// ==========================================

#[test]
fn test_batch_processes_all_active_investments() {
    let ledger = Arc::new(MemoryLedger::new());
    let a = seed(&ledger, "user_1", Interval::Hourly, 24);
    let b = seed(&ledger, "user_2", Interval::Hourly, 24);

    let scheduler = scheduler_over(ledger.clone());
    let report = scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::hours(2))
        .unwrap()
        .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.periods_recorded, 4);
    assert_eq!(report.total_amount, dec!(4.00));
    assert_eq!(report.failed, 0);
    assert_eq!(ledger.payout_events(&a).unwrap().len(), 2);
    assert_eq!(ledger.payout_events(&b).unwrap().len(), 2);
    assert_eq!(
        scheduler.last_run_at(RunClass::Frequent),
        Some(start() + Duration::hours(2))
    );
}

#[test]
fn test_matured_positions_swept_even_with_filter() {
    let ledger = Arc::new(MemoryLedger::new());
    let hourly = seed(&ledger, "user_1", Interval::Hourly, 2); // matures at +2h
    let daily = seed(&ledger, "user_2", Interval::Daily, 30);

    let scheduler = scheduler_over(ledger.clone());
    let opts = BatchOptions {
        interval_filter: Some(Interval::Daily),
        ..Default::default()
    };

    // At +3h the hourly position is past maturity: the daily filter must
    // not stop it from being closed out.
    let report = scheduler
        .run_batch(RunClass::Intensive, &opts, start() + Duration::hours(3))
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.completed, 1);

    let inv = ledger.get_investment(&hourly).unwrap().unwrap();
    assert_eq!(inv.status(), InvestmentStatus::Completed);

    // The in-flight daily position was swept too (no boundary due yet).
    let detail = report
        .details
        .iter()
        .find(|d| d.investment_id == daily)
        .unwrap();
    assert_eq!(detail.newly_recorded, 0);
}

#[test]
fn test_interval_filter_restricts_in_flight_sweep() {
    let ledger = Arc::new(MemoryLedger::new());
    let hourly = seed(&ledger, "user_1", Interval::Hourly, 24);
    seed(&ledger, "user_2", Interval::Daily, 30);

    let scheduler = scheduler_over(ledger.clone());
    let opts = BatchOptions {
        interval_filter: Some(Interval::Hourly),
        ..Default::default()
    };
    let report = scheduler
        .run_batch(RunClass::Frequent, &opts, start() + Duration::hours(2))
        .unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.details[0].investment_id, hourly);
}

#[test]
fn test_dry_run_reports_without_recording() {
    let ledger = Arc::new(MemoryLedger::new());
    let id = seed(&ledger, "user_1", Interval::Hourly, 24);

    let scheduler = scheduler_over(ledger.clone());
    let opts = BatchOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = scheduler
        .run_batch(RunClass::Maintenance, &opts, start() + Duration::hours(5))
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.processed, 1);
    assert_eq!(report.periods_recorded, 0);
    assert!(ledger.payout_events(&id).unwrap().is_empty());
}

#[test]
fn test_trigger_single_matches_batch_shape() {
    let ledger = Arc::new(MemoryLedger::new());
    let id = seed(&ledger, "user_1", Interval::Hourly, 24);

    let scheduler = scheduler_over(ledger.clone());
    let report = scheduler
        .trigger_single(&id, start() + Duration::hours(3))
        .unwrap();

    assert_eq!(report.class, None);
    assert_eq!(report.processed, 1);
    assert_eq!(report.periods_recorded, 3);
    assert_eq!(report.details[0].investment_id, id);
}

// ==========================================
// Overlap guard
// ==========================================

/// Ledger whose next `list_active` blocks until the gate opens, to hold a
/// batch run in flight from a test thread
struct GatedLedger {
    inner: MemoryLedger,
    stall_next: AtomicBool,
    gate: Mutex<bool>,
    opened: Condvar,
}

impl GatedLedger {
    fn new(inner: MemoryLedger) -> Self {
        Self {
            inner,
            stall_next: AtomicBool::new(false),
            gate: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    fn stall_next(&self) {
        self.stall_next.store(true, Ordering::SeqCst);
    }

    fn open_gate(&self) {
        let mut open = self.gate.lock().unwrap();
        *open = true;
        self.opened.notify_all();
    }
}

impl Ledger for GatedLedger {
    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Investment>, LedgerError> {
        if self.stall_next.swap(false, Ordering::SeqCst) {
            let mut open = self.gate.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
        }
        self.inner.list_active(now)
    }

    fn list_all(&self) -> Result<Vec<Investment>, LedgerError> {
        self.inner.list_all()
    }

    fn get_investment(&self, id: &str) -> Result<Option<Investment>, LedgerError> {
        self.inner.get_investment(id)
    }

    fn payout_events(&self, investment_id: &str) -> Result<Vec<PayoutEvent>, LedgerError> {
        self.inner.payout_events(investment_id)
    }

    fn account(&self, owner_id: &str) -> Result<Option<Account>, LedgerError> {
        self.inner.account(owner_id)
    }

    fn with_transaction(
        &self,
        investment_id: &str,
        work: &mut dyn FnMut(&mut dyn LedgerTxn) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        self.inner.with_transaction(investment_id, work)
    }
}

fn wait_until_running(scheduler: &Scheduler, class: RunClass) {
    for _ in 0..500 {
        if scheduler.is_running(class) {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    panic!("run class never entered running state");
}

#[test]
fn test_overlapping_triggers_skip_reject_and_force() {
    let inner = MemoryLedger::new();
    seed(&inner, "user_1", Interval::Hourly, 24);
    let ledger = Arc::new(GatedLedger::new(inner));
    let scheduler = Arc::new(scheduler_over(ledger.clone()));

    ledger.stall_next();
    let slow = {
        let scheduler = Arc::clone(&scheduler);
        std::thread::spawn(move || {
            scheduler
                .run_scheduled(RunClass::Frequent, start() + Duration::hours(1))
                .unwrap()
        })
    };
    wait_until_running(&scheduler, RunClass::Frequent);

    // Scheduled overlap: dropped silently.
    let skipped = scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::hours(1))
        .unwrap();
    assert!(skipped.is_none());

    // Manual overlap: explicit rejection.
    let rejected = scheduler.run_batch(
        RunClass::Frequent,
        &BatchOptions::default(),
        start() + Duration::hours(1),
    );
    assert!(matches!(
        rejected,
        Err(SchedulerError::AlreadyRunning(RunClass::Frequent))
    ));

    // Forced manual run proceeds; the idempotency key makes the race safe.
    let forced = scheduler
        .run_batch(
            RunClass::Frequent,
            &BatchOptions {
                force: true,
                ..Default::default()
            },
            start() + Duration::hours(1),
        )
        .unwrap();
    assert_eq!(forced.failed, 0);

    // A different run class is not blocked by frequent's guard.
    let other = scheduler
        .run_scheduled(RunClass::Intensive, start() + Duration::hours(1))
        .unwrap();
    assert!(other.is_some());

    ledger.open_gate();
    let report = slow.join().unwrap().unwrap();
    assert_eq!(report.failed, 0);

    // Guard released after the slow run finished.
    assert!(!scheduler.is_running(RunClass::Frequent));
    assert!(scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::hours(2))
        .unwrap()
        .is_some());

    // Exactly one event per boundary despite three overlapping runs.
    let events_total = ledger.inner.payout_event_count();
    assert_eq!(events_total, 2);
}

// ==========================================
// Error escalation
// ==========================================

/// Ledger whose transactions always fail
struct DownLedger {
    inner: MemoryLedger,
}

impl Ledger for DownLedger {
    fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Investment>, LedgerError> {
        self.inner.list_active(now)
    }

    fn list_all(&self) -> Result<Vec<Investment>, LedgerError> {
        self.inner.list_all()
    }

    fn get_investment(&self, id: &str) -> Result<Option<Investment>, LedgerError> {
        self.inner.get_investment(id)
    }

    fn payout_events(&self, investment_id: &str) -> Result<Vec<PayoutEvent>, LedgerError> {
        self.inner.payout_events(investment_id)
    }

    fn account(&self, owner_id: &str) -> Result<Option<Account>, LedgerError> {
        self.inner.account(owner_id)
    }

    fn with_transaction(
        &self,
        _investment_id: &str,
        _work: &mut dyn FnMut(&mut dyn LedgerTxn) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        Err(LedgerError::Unavailable("storage down".to_string()))
    }
}

#[test]
fn test_consecutive_fully_failed_runs_raise_alert() {
    let inner = MemoryLedger::new();
    seed(&inner, "user_1", Interval::Hourly, 24);
    let scheduler = Scheduler::new(
        Arc::new(DownLedger { inner }),
        SchedulerConfig {
            alert_threshold: 3,
            ..Default::default()
        },
    );

    for i in 1..=3u32 {
        let report = scheduler
            .run_scheduled(RunClass::Frequent, start() + Duration::hours(i64::from(i)))
            .unwrap()
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(scheduler.consecutive_failures(RunClass::Frequent), i);
    }

    let alerts = scheduler
        .events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::AlertRaised { .. }))
        .count();
    assert_eq!(alerts, 1);
}

#[test]
fn test_partial_failure_does_not_escalate() {
    // One poisoned investment among healthy siblings: the batch continues
    // and the failure counter stays at zero.
    struct HalfFaulty {
        inner: MemoryLedger,
        fail_id: String,
    }

    impl Ledger for HalfFaulty {
        fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Investment>, LedgerError> {
            self.inner.list_active(now)
        }
        fn list_all(&self) -> Result<Vec<Investment>, LedgerError> {
            self.inner.list_all()
        }
        fn get_investment(&self, id: &str) -> Result<Option<Investment>, LedgerError> {
            self.inner.get_investment(id)
        }
        fn payout_events(&self, investment_id: &str) -> Result<Vec<PayoutEvent>, LedgerError> {
            self.inner.payout_events(investment_id)
        }
        fn account(&self, owner_id: &str) -> Result<Option<Account>, LedgerError> {
            self.inner.account(owner_id)
        }
        fn with_transaction(
            &self,
            investment_id: &str,
            work: &mut dyn FnMut(&mut dyn LedgerTxn) -> Result<(), LedgerError>,
        ) -> Result<(), LedgerError> {
            if investment_id == self.fail_id {
                return Err(LedgerError::Unavailable("row lock timeout".to_string()));
            }
            self.inner.with_transaction(investment_id, work)
        }
    }

    let inner = MemoryLedger::new();
    let bad = seed(&inner, "user_1", Interval::Hourly, 24);
    let good = seed(&inner, "user_2", Interval::Hourly, 24);
    let scheduler = Scheduler::new(
        Arc::new(HalfFaulty {
            inner,
            fail_id: bad.clone(),
        }),
        SchedulerConfig::default(),
    );

    let report = scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::hours(2))
        .unwrap()
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 2);
    assert_eq!(scheduler.consecutive_failures(RunClass::Frequent), 0);

    let good_detail = report
        .details
        .iter()
        .find(|d| d.investment_id == good)
        .unwrap();
    assert_eq!(good_detail.newly_recorded, 2);
}

// ==========================================
// Completion notices and the purchase scenario
// ==========================================

#[test]
fn test_completion_notices_drain_once() {
    let ledger = Arc::new(MemoryLedger::new());
    let id = seed(&ledger, "user_1", Interval::Hourly, 2);

    let scheduler = scheduler_over(ledger.clone());
    scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::hours(3))
        .unwrap();

    let notices = scheduler.drain_completions();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].investment_id, id);
    assert_eq!(notices[0].owner_id, "user_1");
    assert_eq!(notices[0].total_accrued, dec!(2.00));

    assert!(scheduler.drain_completions().is_empty());
}

#[test]
fn test_purchase_scenario_end_to_end() {
    // principal 500, hourly, daily-equivalent rate 12%, 2 periods.
    let ledger = Arc::new(MemoryLedger::new());
    let inv = Investment::new(
        "user_1".to_string(),
        dec!(500),
        dec!(0.12),
        Interval::Hourly,
        2,
        start(),
    );
    let id = inv.id().to_string();
    ledger.insert_investment(inv);
    let scheduler = scheduler_over(ledger.clone());

    // T+0:30 -> nothing due yet.
    let report = scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::minutes(30))
        .unwrap()
        .unwrap();
    assert_eq!(report.periods_recorded, 0);

    // T+1:05 -> one payout of 2.50 at T+1h.
    let report = scheduler
        .run_scheduled(RunClass::Frequent, start() + Duration::minutes(65))
        .unwrap()
        .unwrap();
    assert_eq!(report.periods_recorded, 1);
    assert_eq!(report.total_amount, dec!(2.50));
    let events = ledger.payout_events(&id).unwrap();
    assert_eq!(events[0].accrual_time(), start() + Duration::hours(1));

    // T+2:10 -> one more payout at T+2h, then completed with 5.00 total.
    let report = scheduler
        .run_scheduled(
            RunClass::Frequent,
            start() + Duration::hours(2) + Duration::minutes(10),
        )
        .unwrap()
        .unwrap();
    assert_eq!(report.periods_recorded, 1);
    assert_eq!(report.completed, 1);

    let inv = ledger.get_investment(&id).unwrap().unwrap();
    assert_eq!(inv.status(), InvestmentStatus::Completed);
    assert_eq!(inv.total_accrued(), dec!(5.00));
    assert_eq!(inv.last_accrual_time(), Some(start() + Duration::hours(2)));

    let account = ledger.account("user_1").unwrap().unwrap();
    assert_eq!(account.available_balance(), dec!(5.00));
}
