//! Ledger snapshots - save/restore ledger state
//!
//! Serializes the complete ledger (investments, payout events, accounts)
//! with a SHA-256 integrity hash, and restores it into a fresh in-memory
//! ledger. Used for pause/resume of demo deployments and for rebuilding
//! known states in tests.
//!
//! # Critical Invariants
//!
//! - **Conservation**: restored totals still equal the sum of restored
//!   payout amounts
//! - **Key uniqueness**: a snapshot carrying duplicate idempotency keys is
//!   rejected at restore time
//! - **Integrity**: content tampering is detected via the embedded hash

use crate::ledger::memory::MemoryLedger;
use crate::ledger::Ledger;
use crate::models::account::Account;
use crate::models::investment::Investment;
use crate::models::payout::PayoutEvent;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during snapshot capture or restoration
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("integrity hash mismatch: snapshot was modified or corrupted")]
    IntegrityMismatch,

    #[error("duplicate payout event for ({investment_id}, {accrual_time})")]
    DuplicatePayout {
        investment_id: String,
        accrual_time: String,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Complete ledger state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// All investments, ordered by ID for a stable hash
    pub investments: Vec<Investment>,

    /// All payout events, ordered by idempotency key
    pub payout_events: Vec<PayoutEvent>,

    /// All owner accounts, ordered by owner ID
    pub accounts: Vec<Account>,

    /// SHA-256 over the serialized content above
    pub integrity_hash: String,
}

impl LedgerSnapshot {
    /// Capture the current state of an in-memory ledger
    pub fn capture(ledger: &MemoryLedger) -> Result<Self, SnapshotError> {
        let mut investments = ledger
            .list_all()
            .expect("in-memory ledger reads are infallible");
        investments.sort_by(|a, b| a.id().cmp(b.id()));

        let payout_events = ledger.all_payouts();
        let accounts = ledger.all_accounts();

        let integrity_hash = Self::content_hash(&investments, &payout_events, &accounts)?;
        Ok(Self {
            investments,
            payout_events,
            accounts,
            integrity_hash,
        })
    }

    /// Recompute the integrity hash after editing the content
    ///
    /// For snapshot-editing tooling; restore still validates key
    /// uniqueness, so rehashing cannot smuggle duplicates in.
    pub fn rehash(&mut self) -> Result<(), SnapshotError> {
        self.integrity_hash =
            Self::content_hash(&self.investments, &self.payout_events, &self.accounts)?;
        Ok(())
    }

    /// Verify the embedded integrity hash against the content
    pub fn verify(&self) -> Result<bool, SnapshotError> {
        let expected =
            Self::content_hash(&self.investments, &self.payout_events, &self.accounts)?;
        Ok(expected == self.integrity_hash)
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string (integrity is checked at restore time)
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    fn content_hash(
        investments: &[Investment],
        payout_events: &[PayoutEvent],
        accounts: &[Account],
    ) -> Result<String, SnapshotError> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(investments)?);
        hasher.update(serde_json::to_vec(payout_events)?);
        hasher.update(serde_json::to_vec(accounts)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl MemoryLedger {
    /// Capture a snapshot of this ledger
    pub fn snapshot(&self) -> Result<LedgerSnapshot, SnapshotError> {
        LedgerSnapshot::capture(self)
    }

    /// Rebuild a ledger from a snapshot, verifying integrity and key
    /// uniqueness
    pub fn restore(snapshot: &LedgerSnapshot) -> Result<MemoryLedger, SnapshotError> {
        if !snapshot.verify()? {
            return Err(SnapshotError::IntegrityMismatch);
        }

        let mut seen: HashSet<(String, chrono::DateTime<chrono::Utc>)> = HashSet::new();
        for event in &snapshot.payout_events {
            if !seen.insert(event.key()) {
                return Err(SnapshotError::DuplicatePayout {
                    investment_id: event.investment_id().to_string(),
                    accrual_time: event.accrual_time().to_rfc3339(),
                });
            }
        }

        let ledger = MemoryLedger::new();
        for investment in &snapshot.investments {
            ledger.insert_investment(investment.clone());
        }
        for event in &snapshot.payout_events {
            ledger.insert_payout_unchecked(event.clone());
        }
        for account in &snapshot.accounts {
            ledger.insert_account(account.clone());
        }
        Ok(ledger)
    }
}
