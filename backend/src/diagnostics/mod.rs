//! Reconciliation & health diagnostics
//!
//! Independent read-only audit of ledger state. Never on the accrual write
//! path, so it can run on any cadence without interfering with batch runs.
//!
//! For each active investment the audit compares how many periods should
//! have been recorded by now (`(min(now, end_time) - start_time) / L`,
//! capped at the period count) against how many payout events actually
//! exist. Investments whose gap reaches the configured tolerance are
//! reported as behind schedule, and the aggregate count maps to an overall
//! health status through configurable thresholds.

use crate::ledger::{Ledger, LedgerError};
use crate::models::investment::InvestmentStatus;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds driving behind-schedule detection and the health rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Minimum gap, in whole periods, for an investment to count as behind
    /// schedule
    pub tolerance_periods: u32,

    /// Behind-schedule count above which the system is `degraded`
    pub degraded_behind: usize,

    /// Behind-schedule count above which the system is `critical`
    pub critical_behind: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            tolerance_periods: 1,
            degraded_behind: 10,
            critical_behind: 50,
        }
    }
}

/// Overall system health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// One investment that is behind its payout schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehindSchedule {
    pub investment_id: String,
    pub owner_id: String,

    /// Periods that should have been recorded by now
    pub expected_periods: u32,

    /// Payout events actually recorded
    pub recorded_periods: u32,

    /// `expected - recorded`
    pub gap: u32,
}

/// System-wide payout activity summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub total_investments: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,

    /// Total payout events recorded across all investments
    pub payout_events: usize,

    /// Sum of `total_accrued` across all investments
    pub total_accrued: Decimal,
}

/// Result of one reconciliation audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub behind_schedule: Vec<BehindSchedule>,
    pub activity: ActivitySummary,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Number of behind-schedule investments
    pub fn behind_count(&self) -> usize {
        self.behind_schedule.len()
    }
}

/// Audit the ledger as of `now`
///
/// Reads only; the ledger is never written, which is what makes this safe
/// to run concurrently with batch runs.
pub fn audit(
    ledger: &dyn Ledger,
    thresholds: &HealthThresholds,
    now: DateTime<Utc>,
) -> Result<HealthReport, LedgerError> {
    let investments = ledger.list_all()?;

    let mut behind_schedule = Vec::new();
    let mut activity = ActivitySummary {
        total_investments: investments.len(),
        active: 0,
        completed: 0,
        cancelled: 0,
        payout_events: 0,
        total_accrued: Decimal::ZERO,
    };

    for investment in &investments {
        match investment.status() {
            InvestmentStatus::Active => activity.active += 1,
            InvestmentStatus::Completed => activity.completed += 1,
            InvestmentStatus::Cancelled => activity.cancelled += 1,
        }
        activity.total_accrued += investment.total_accrued();

        let recorded = ledger.payout_events(investment.id())?.len();
        activity.payout_events += recorded;

        if !investment.is_active() {
            continue;
        }

        let cutoff = now.min(investment.end_time());
        let expected = investment
            .interval()
            .periods_between(investment.start_time(), cutoff)
            .min(i64::from(investment.total_periods())) as u32;
        let recorded = recorded as u32;
        let gap = expected.saturating_sub(recorded);

        if gap >= thresholds.tolerance_periods && gap > 0 {
            behind_schedule.push(BehindSchedule {
                investment_id: investment.id().to_string(),
                owner_id: investment.owner_id().to_string(),
                expected_periods: expected,
                recorded_periods: recorded,
                gap,
            });
        }
    }

    let status = if behind_schedule.len() > thresholds.critical_behind {
        HealthStatus::Critical
    } else if behind_schedule.len() > thresholds.degraded_behind {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Ok(HealthReport {
        status,
        behind_schedule,
        activity,
        generated_at: now,
    })
}
