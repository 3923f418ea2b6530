//! PyO3 wrapper for the accrual engine
//!
//! This class is the entry point for a Python host process (HTTP layer,
//! admin tooling, cron wiring) to drive the engine.

use crate::ledger::MemoryLedger;
use crate::scheduler::{BatchOptions, RunClass, Scheduler, SchedulerConfig};
use chrono::{DateTime, Utc};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::sync::Arc;

use super::types::{
    account_to_py, completion_to_py, health_to_py, investment_to_py, parse_datetime,
    parse_investment_row, payout_to_py, report_to_py,
};

fn resolve_now(now: Option<&str>) -> PyResult<DateTime<Utc>> {
    match now {
        Some(value) => parse_datetime(value),
        // The host boundary is the only place the wall clock enters.
        None => Ok(Utc::now()),
    }
}

fn parse_class(class: &str) -> PyResult<RunClass> {
    class
        .parse()
        .map_err(|e| PyValueError::new_err(format!("{e}")))
}

fn parse_config(config: Option<&Bound<'_, PyDict>>) -> PyResult<SchedulerConfig> {
    let mut scheduler_config = SchedulerConfig::default();
    if let Some(config) = config {
        if let Some(value) = config.get_item("alert_threshold")? {
            scheduler_config.alert_threshold = value.extract()?;
        }
        if let Some(value) = config.get_item("tolerance_periods")? {
            scheduler_config.health.tolerance_periods = value.extract()?;
        }
        if let Some(value) = config.get_item("degraded_behind")? {
            scheduler_config.health.degraded_behind = value.extract()?;
        }
        if let Some(value) = config.get_item("critical_behind")? {
            scheduler_config.health.critical_behind = value.extract()?;
        }
    }
    Ok(scheduler_config)
}

/// Python wrapper for the accrual engine
///
/// # Example (from Python)
///
/// ```python
/// from mining_yield_core_rs import Engine
///
/// engine = Engine()
/// inv_id = engine.add_investment({
///     "owner_id": "user_1",
///     "principal": 500.0,
///     "rate": 0.12,
///     "interval": "hourly",
///     "total_periods": 2,
///     "start_time": "2024-01-01T00:00:00Z",
/// })
/// report = engine.run_batch("frequent")
/// print(report["periods_recorded"], report["total_amount"])
/// ```
#[pyclass(name = "Engine")]
pub struct PyEngine {
    ledger: Arc<MemoryLedger>,
    scheduler: Scheduler,
}

impl PyEngine {
    fn with_ledger(ledger: Arc<MemoryLedger>, config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::new(ledger.clone(), config);
        Self { ledger, scheduler }
    }
}

#[pymethods]
impl PyEngine {
    /// Create an engine over a fresh in-memory ledger
    ///
    /// Recognized config keys: `alert_threshold`, `tolerance_periods`,
    /// `degraded_behind`, `critical_behind`.
    #[new]
    #[pyo3(signature = (config=None))]
    fn new(config: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        Ok(Self::with_ledger(
            Arc::new(MemoryLedger::new()),
            parse_config(config)?,
        ))
    }

    /// Seed one investment from a loose dict; returns its ID
    fn add_investment(&self, fields: &Bound<'_, PyDict>) -> PyResult<String> {
        let row = parse_investment_row(fields)?;
        let ids = self
            .ledger
            .load_rows(vec![row])
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(ids.into_iter().next().expect("one row in, one id out"))
    }

    /// Run a batch for `class`
    #[pyo3(signature = (class, force=false, dry_run=false, interval_filter=None, now=None))]
    fn run_batch(
        &self,
        py: Python<'_>,
        class: &str,
        force: bool,
        dry_run: bool,
        interval_filter: Option<&str>,
        now: Option<&str>,
    ) -> PyResult<Py<PyDict>> {
        let opts = BatchOptions {
            force,
            dry_run,
            interval_filter: interval_filter
                .map(|value| {
                    value
                        .parse()
                        .map_err(|e| PyValueError::new_err(format!("{e}")))
                })
                .transpose()?,
        };
        let report = self
            .scheduler
            .run_batch(parse_class(class)?, &opts, resolve_now(now)?)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(report_to_py(py, &report)?.into())
    }

    /// Scheduled trigger; returns `None` on an overlap skip
    #[pyo3(signature = (class, now=None))]
    fn run_scheduled(
        &self,
        py: Python<'_>,
        class: &str,
        now: Option<&str>,
    ) -> PyResult<Option<Py<PyDict>>> {
        let report = self
            .scheduler
            .run_scheduled(parse_class(class)?, resolve_now(now)?)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        match report {
            Some(report) => Ok(Some(report_to_py(py, &report)?.into())),
            None => Ok(None),
        }
    }

    /// Run the recorder for one investment
    #[pyo3(signature = (investment_id, now=None))]
    fn trigger_single(
        &self,
        py: Python<'_>,
        investment_id: &str,
        now: Option<&str>,
    ) -> PyResult<Py<PyDict>> {
        let report = self
            .scheduler
            .trigger_single(investment_id, resolve_now(now)?)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(report_to_py(py, &report)?.into())
    }

    /// Health audit plus per-class run status
    #[pyo3(signature = (now=None))]
    fn get_health(&self, py: Python<'_>, now: Option<&str>) -> PyResult<Py<PyDict>> {
        let health = self
            .scheduler
            .get_health(resolve_now(now)?)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        Ok(health_to_py(py, &health)?.into())
    }

    /// Read one investment
    fn investment(&self, py: Python<'_>, id: &str) -> PyResult<Option<Py<PyDict>>> {
        use crate::ledger::Ledger;
        let investment = self
            .ledger
            .get_investment(id)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        match investment {
            Some(investment) => Ok(Some(investment_to_py(py, &investment)?.into())),
            None => Ok(None),
        }
    }

    /// Read one owner account
    fn account(&self, py: Python<'_>, owner_id: &str) -> PyResult<Option<Py<PyDict>>> {
        use crate::ledger::Ledger;
        let account = self
            .ledger
            .account(owner_id)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        match account {
            Some(account) => Ok(Some(account_to_py(py, &account)?.into())),
            None => Ok(None),
        }
    }

    /// All payout events for one investment, ascending by boundary
    fn payout_events(&self, py: Python<'_>, investment_id: &str) -> PyResult<Py<PyList>> {
        use crate::ledger::Ledger;
        let events = self
            .ledger
            .payout_events(investment_id)
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        let list = PyList::empty_bound(py);
        for event in &events {
            list.append(payout_to_py(py, event)?)?;
        }
        Ok(list.into())
    }

    /// Drain accumulated completion notices
    fn drain_completions(&self, py: Python<'_>) -> PyResult<Py<PyList>> {
        let list = PyList::empty_bound(py);
        for notice in self.scheduler.drain_completions() {
            list.append(completion_to_py(py, &notice)?)?;
        }
        Ok(list.into())
    }

    /// Number of logged engine events
    fn event_count(&self) -> usize {
        self.scheduler.event_count()
    }

    /// Serialize the ledger to a snapshot JSON string
    fn snapshot_json(&self) -> PyResult<String> {
        let snapshot = self
            .ledger
            .snapshot()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        snapshot
            .to_json()
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))
    }

    /// Rebuild an engine from a snapshot JSON string
    #[staticmethod]
    #[pyo3(signature = (json, config=None))]
    fn from_snapshot_json(json: &str, config: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let snapshot = crate::ledger::LedgerSnapshot::from_json(json)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let ledger = MemoryLedger::restore(&snapshot)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self::with_ledger(Arc::new(ledger), parse_config(config)?))
    }
}
