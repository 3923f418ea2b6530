//! Conversions between Python values and engine types

use crate::core::time::Interval;
use crate::ledger::InvestmentRow;
use crate::models::account::Account;
use crate::models::investment::{Investment, InvestmentStatus};
use crate::models::payout::PayoutEvent;
use crate::scheduler::{CompletionNotice, EngineHealth, InvestmentRunDetail, RunReport};
use chrono::{DateTime, Utc};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Parse an RFC 3339 timestamp
pub fn parse_datetime(value: &str) -> PyResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PyValueError::new_err(format!("invalid timestamp {value:?}: {e}")))
}

/// Convert a Python float into a `Decimal`
pub fn parse_decimal(value: f64) -> PyResult<Decimal> {
    Decimal::try_from(value)
        .map_err(|e| PyValueError::new_err(format!("invalid decimal {value}: {e}")))
}

fn dec_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

fn get_required<'py, T: FromPyObject<'py>>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<T> {
    dict.get_item(key)?
        .ok_or_else(|| PyValueError::new_err(format!("missing required field: {key}")))?
        .extract()
}

fn get_optional<'py, T: FromPyObject<'py>>(
    dict: &Bound<'py, PyDict>,
    key: &str,
) -> PyResult<Option<T>> {
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => Ok(Some(value.extract()?)),
        _ => Ok(None),
    }
}

/// Parse a loose investment dict into a storage row
///
/// The row goes through the same normalization step as any other storage
/// input; defaults and validation are not duplicated here.
pub fn parse_investment_row(dict: &Bound<'_, PyDict>) -> PyResult<InvestmentRow> {
    let interval: String = get_required(dict, "interval")?;
    let interval: Interval = interval
        .parse()
        .map_err(|e| PyValueError::new_err(format!("{e}")))?;

    let start_time: String = get_required(dict, "start_time")?;
    let principal: f64 = get_required(dict, "principal")?;
    let rate: f64 = get_required(dict, "rate")?;

    let status = match get_optional::<String>(dict, "status")? {
        Some(name) => Some(match name.as_str() {
            "active" => InvestmentStatus::Active,
            "completed" => InvestmentStatus::Completed,
            "cancelled" => InvestmentStatus::Cancelled,
            other => {
                return Err(PyValueError::new_err(format!("unknown status: {other}")));
            }
        }),
        None => None,
    };

    let last_accrual_time = match get_optional::<String>(dict, "last_accrual_time")? {
        Some(value) => Some(parse_datetime(&value)?),
        None => None,
    };
    let total_accrued = match get_optional::<f64>(dict, "total_accrued")? {
        Some(value) => Some(parse_decimal(value)?),
        None => None,
    };

    Ok(InvestmentRow {
        id: get_optional(dict, "id")?,
        owner_id: get_required(dict, "owner_id")?,
        principal: parse_decimal(principal)?,
        rate: parse_decimal(rate)?,
        interval,
        total_periods: get_required(dict, "total_periods")?,
        start_time: parse_datetime(&start_time)?,
        end_time: None,
        last_accrual_time,
        total_accrued,
        status,
    })
}

fn detail_to_py<'py>(
    py: Python<'py>,
    detail: &InvestmentRunDetail,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("investment_id", &detail.investment_id)?;
    dict.set_item("newly_recorded", detail.newly_recorded)?;
    dict.set_item("amount", dec_to_f64(detail.amount))?;
    dict.set_item("completed", detail.completed)?;
    dict.set_item("skipped", detail.skipped.as_deref())?;
    dict.set_item("error", detail.error.as_deref())?;
    Ok(dict)
}

/// Convert a run report into a Python dict
pub fn report_to_py<'py>(py: Python<'py>, report: &RunReport) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("class", report.class.map(|class| class.as_str()))?;
    dict.set_item("at", report.at.to_rfc3339())?;
    dict.set_item("dry_run", report.dry_run)?;
    dict.set_item("processed", report.processed)?;
    dict.set_item("periods_recorded", report.periods_recorded)?;
    dict.set_item("total_amount", dec_to_f64(report.total_amount))?;
    dict.set_item("completed", report.completed)?;
    dict.set_item("skipped", report.skipped)?;
    dict.set_item("failed", report.failed)?;

    let details = PyList::empty_bound(py);
    for detail in &report.details {
        details.append(detail_to_py(py, detail)?)?;
    }
    dict.set_item("details", details)?;
    Ok(dict)
}

/// Convert engine health into a Python dict
pub fn health_to_py<'py>(py: Python<'py>, health: &EngineHealth) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    let status = match health.report.status {
        crate::diagnostics::HealthStatus::Healthy => "healthy",
        crate::diagnostics::HealthStatus::Degraded => "degraded",
        crate::diagnostics::HealthStatus::Critical => "critical",
    };
    dict.set_item("status", status)?;
    dict.set_item("behind_schedule_count", health.report.behind_count())?;
    dict.set_item("generated_at", health.report.generated_at.to_rfc3339())?;

    let behind = PyList::empty_bound(py);
    for entry in &health.report.behind_schedule {
        let item = PyDict::new_bound(py);
        item.set_item("investment_id", &entry.investment_id)?;
        item.set_item("owner_id", &entry.owner_id)?;
        item.set_item("expected_periods", entry.expected_periods)?;
        item.set_item("recorded_periods", entry.recorded_periods)?;
        item.set_item("gap", entry.gap)?;
        behind.append(item)?;
    }
    dict.set_item("behind_schedule", behind)?;

    let activity = PyDict::new_bound(py);
    activity.set_item("total_investments", health.report.activity.total_investments)?;
    activity.set_item("active", health.report.activity.active)?;
    activity.set_item("completed", health.report.activity.completed)?;
    activity.set_item("cancelled", health.report.activity.cancelled)?;
    activity.set_item("payout_events", health.report.activity.payout_events)?;
    activity.set_item(
        "total_accrued",
        dec_to_f64(health.report.activity.total_accrued),
    )?;
    dict.set_item("activity", activity)?;

    let runs = PyList::empty_bound(py);
    for run in &health.runs {
        let item = PyDict::new_bound(py);
        item.set_item("class", run.class.as_str())?;
        item.set_item("running", run.running)?;
        item.set_item("last_run_at", run.last_run_at.map(|at| at.to_rfc3339()))?;
        item.set_item("consecutive_failures", run.consecutive_failures)?;
        runs.append(item)?;
    }
    dict.set_item("runs", runs)?;
    Ok(dict)
}

/// Convert an investment into a Python dict
pub fn investment_to_py<'py>(
    py: Python<'py>,
    investment: &Investment,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("id", investment.id())?;
    dict.set_item("owner_id", investment.owner_id())?;
    dict.set_item("principal", dec_to_f64(investment.principal()))?;
    dict.set_item("rate", dec_to_f64(investment.rate()))?;
    dict.set_item("interval", investment.interval().as_str())?;
    dict.set_item("total_periods", investment.total_periods())?;
    dict.set_item("start_time", investment.start_time().to_rfc3339())?;
    dict.set_item("end_time", investment.end_time().to_rfc3339())?;
    dict.set_item(
        "last_accrual_time",
        investment.last_accrual_time().map(|at| at.to_rfc3339()),
    )?;
    dict.set_item("total_accrued", dec_to_f64(investment.total_accrued()))?;
    let status = match investment.status() {
        InvestmentStatus::Active => "active",
        InvestmentStatus::Completed => "completed",
        InvestmentStatus::Cancelled => "cancelled",
    };
    dict.set_item("status", status)?;
    Ok(dict)
}

/// Convert an account into a Python dict
pub fn account_to_py<'py>(py: Python<'py>, account: &Account) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("owner_id", account.owner_id())?;
    dict.set_item("available_balance", dec_to_f64(account.available_balance()))?;
    dict.set_item("total_earned", dec_to_f64(account.total_earned()))?;
    Ok(dict)
}

/// Convert a payout event into a Python dict
pub fn payout_to_py<'py>(py: Python<'py>, event: &PayoutEvent) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("investment_id", event.investment_id())?;
    dict.set_item("accrual_time", event.accrual_time().to_rfc3339())?;
    dict.set_item("amount", dec_to_f64(event.amount()))?;
    dict.set_item("created_at", event.created_at().to_rfc3339())?;
    dict.set_item("note", event.note())?;
    Ok(dict)
}

/// Convert a completion notice into a Python dict
pub fn completion_to_py<'py>(
    py: Python<'py>,
    notice: &CompletionNotice,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("investment_id", &notice.investment_id)?;
    dict.set_item("owner_id", &notice.owner_id)?;
    dict.set_item("total_accrued", dec_to_f64(notice.total_accrued))?;
    dict.set_item("at", notice.at.to_rfc3339())?;
    Ok(dict)
}
