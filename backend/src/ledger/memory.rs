//! In-memory ledger
//!
//! Reference implementation of the [`Ledger`] contract backed by plain maps
//! behind one mutex. Transactions serialize on the lock, which makes the
//! per-investment atomicity and the idempotency-key uniqueness trivially
//! exact; rollback is copy-on-first-write undo applied when the transaction
//! closure fails.

use crate::ledger::row::{InvestmentRow, RowError};
use crate::ledger::{InsertOutcome, Ledger, LedgerError, LedgerTxn};
use crate::models::account::Account;
use crate::models::investment::{Investment, InvestmentStatus};
use crate::models::payout::PayoutEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

type PayoutKey = (String, DateTime<Utc>);

#[derive(Debug, Default)]
struct LedgerState {
    investments: HashMap<String, Investment>,

    /// Payout events keyed by the composite idempotency key; BTreeMap keeps
    /// each investment's events contiguous and ascending by accrual time
    payouts: BTreeMap<PayoutKey, PayoutEvent>,

    accounts: HashMap<String, Account>,
}

impl LedgerState {
    fn payout_range(&self, investment_id: &str) -> Vec<PayoutEvent> {
        let low = (investment_id.to_string(), DateTime::<Utc>::MIN_UTC);
        let high = (investment_id.to_string(), DateTime::<Utc>::MAX_UTC);
        self.payouts
            .range(low..=high)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

/// In-memory [`Ledger`] implementation
///
/// # Example
/// ```
/// use mining_yield_core_rs::{Interval, Investment, MemoryLedger};
/// use mining_yield_core_rs::ledger::Ledger;
/// use chrono::{TimeZone, Utc};
/// use rust_decimal::Decimal;
///
/// let ledger = MemoryLedger::new();
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let inv = Investment::new(
///     "user_1".to_string(),
///     Decimal::from(500),
///     Decimal::new(12, 2),
///     Interval::Hourly,
///     2,
///     start,
/// );
/// let id = inv.id().to_string();
/// ledger.insert_investment(inv);
///
/// assert!(ledger.get_investment(&id).unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-typed investment
    ///
    /// # Panics
    /// Panics if the investment ID already exists.
    pub fn insert_investment(&self, investment: Investment) {
        let mut state = self.lock();
        let id = investment.id().to_string();
        assert!(
            !state.investments.contains_key(&id),
            "investment ID {} already exists",
            id
        );
        state.investments.insert(id, investment);
    }

    /// Seed raw storage rows through the normalization step
    ///
    /// Returns the resulting investment IDs in input order.
    pub fn load_rows(&self, rows: Vec<InvestmentRow>) -> Result<Vec<String>, RowError> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let investment = row.normalize()?;
            ids.push(investment.id().to_string());
            self.insert_investment(investment);
        }
        Ok(ids)
    }

    /// Seed a payout event directly, bypassing the recorder
    ///
    /// Intended for reconstructing ledger state in tests and snapshot
    /// restoration; the uniqueness guarantee still holds.
    ///
    /// # Panics
    /// Panics if the idempotency key is already taken.
    pub fn insert_payout_unchecked(&self, event: PayoutEvent) {
        let mut state = self.lock();
        let key = event.key();
        assert!(
            !state.payouts.contains_key(&key),
            "payout event for ({}, {}) already exists",
            key.0,
            key.1
        );
        state.payouts.insert(key, event);
    }

    /// Seed an owner account
    pub fn insert_account(&self, account: Account) {
        let mut state = self.lock();
        state
            .accounts
            .insert(account.owner_id().to_string(), account);
    }

    /// Total number of payout events across all investments
    pub fn payout_event_count(&self) -> usize {
        self.lock().payouts.len()
    }

    pub(crate) fn all_payouts(&self) -> Vec<PayoutEvent> {
        self.lock().payouts.values().cloned().collect()
    }

    pub(crate) fn all_accounts(&self) -> Vec<Account> {
        let state = self.lock();
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.owner_id().cmp(b.owner_id()));
        accounts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("ledger lock poisoned")
    }

    fn sorted(mut investments: Vec<Investment>) -> Vec<Investment> {
        investments.sort_by(|a, b| {
            a.start_time()
                .cmp(&b.start_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        investments
    }
}

impl Ledger for MemoryLedger {
    fn list_active(&self, _now: DateTime<Utc>) -> Result<Vec<Investment>, LedgerError> {
        let state = self.lock();
        let active = state
            .investments
            .values()
            .filter(|inv| inv.is_active())
            .cloned()
            .collect();
        Ok(Self::sorted(active))
    }

    fn list_all(&self) -> Result<Vec<Investment>, LedgerError> {
        let state = self.lock();
        Ok(Self::sorted(state.investments.values().cloned().collect()))
    }

    fn get_investment(&self, id: &str) -> Result<Option<Investment>, LedgerError> {
        Ok(self.lock().investments.get(id).cloned())
    }

    fn payout_events(&self, investment_id: &str) -> Result<Vec<PayoutEvent>, LedgerError> {
        Ok(self.lock().payout_range(investment_id))
    }

    fn account(&self, owner_id: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self.lock().accounts.get(owner_id).cloned())
    }

    fn with_transaction(
        &self,
        _investment_id: &str,
        work: &mut dyn FnMut(&mut dyn LedgerTxn) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock();
        let mut txn = MemoryTxn {
            state: &mut *state,
            undo_investments: HashMap::new(),
            undo_payouts: HashMap::new(),
            undo_accounts: HashMap::new(),
        };

        match work(&mut txn) {
            Ok(()) => Ok(()),
            Err(err) => {
                txn.roll_back();
                Err(err)
            }
        }
    }
}

/// One open transaction over the in-memory state
///
/// Records the original value of every entry it touches; `roll_back`
/// restores them in the failure path.
struct MemoryTxn<'a> {
    state: &'a mut LedgerState,
    undo_investments: HashMap<String, Option<Investment>>,
    undo_payouts: HashMap<PayoutKey, Option<PayoutEvent>>,
    undo_accounts: HashMap<String, Option<Account>>,
}

impl MemoryTxn<'_> {
    fn roll_back(self) {
        for (id, original) in self.undo_investments {
            match original {
                Some(investment) => {
                    self.state.investments.insert(id, investment);
                }
                None => {
                    self.state.investments.remove(&id);
                }
            }
        }
        for (key, original) in self.undo_payouts {
            match original {
                Some(event) => {
                    self.state.payouts.insert(key, event);
                }
                None => {
                    self.state.payouts.remove(&key);
                }
            }
        }
        for (owner_id, original) in self.undo_accounts {
            match original {
                Some(account) => {
                    self.state.accounts.insert(owner_id, account);
                }
                None => {
                    self.state.accounts.remove(&owner_id);
                }
            }
        }
    }
}

impl LedgerTxn for MemoryTxn<'_> {
    fn investment(&self, id: &str) -> Option<Investment> {
        self.state.investments.get(id).cloned()
    }

    fn insert_payout_if_absent(&mut self, event: PayoutEvent) -> InsertOutcome {
        let key = event.key();
        if self.state.payouts.contains_key(&key) {
            return InsertOutcome::AlreadyExists;
        }
        self.undo_payouts.entry(key.clone()).or_insert(None);
        self.state.payouts.insert(key, event);
        InsertOutcome::Inserted
    }

    fn update_accrual(
        &mut self,
        id: &str,
        last_accrual_time: Option<DateTime<Utc>>,
        total_accrued: Decimal,
        status: InvestmentStatus,
    ) -> Result<(), LedgerError> {
        let investment = self
            .state
            .investments
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        self.undo_investments
            .entry(id.to_string())
            .or_insert_with(|| Some(investment.clone()));

        investment.apply_accrual_update(last_accrual_time, total_accrued, status)?;
        Ok(())
    }

    fn credit_owner(&mut self, owner_id: &str, amount: Decimal) {
        let original = self.state.accounts.get(owner_id).cloned();
        self.undo_accounts
            .entry(owner_id.to_string())
            .or_insert(original);

        self.state
            .accounts
            .entry(owner_id.to_string())
            .or_insert_with(|| Account::new(owner_id.to_string()))
            .credit(amount);
    }
}
