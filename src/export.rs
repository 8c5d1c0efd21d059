use crate::error::{PlanningError, Result};
use crate::reconciliation::{MonthlyPerformance, ReconciledRecord};
use crate::schema::AccuracyStatus;
use chrono::NaiveDate;
use serde::Serialize;

/// Writes records as CSV with a header row taken from the field names.
pub fn to_csv<T: Serialize>(data: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| PlanningError::ExportError(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| PlanningError::ExportError(format!("UTF-8 conversion error: {}", e)))
}

pub fn to_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// One flat line per reconciled month, for tabular export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSummaryRow {
    pub month: NaiveDate,
    pub accuracy: f64,
    pub mape: Option<f64>,
    pub total_records: usize,
    pub under: usize,
    pub accurate: usize,
    pub over: usize,
    pub no_forecast: usize,
    pub total_forecast_qty: f64,
    pub total_po_qty: f64,
}

pub fn monthly_summary_rows(performance: &MonthlyPerformance) -> Vec<MonthSummaryRow> {
    performance
        .values()
        .map(|p| MonthSummaryRow {
            month: p.month,
            accuracy: p.accuracy,
            mape: p.mape,
            total_records: p.total_records,
            under: p.count(AccuracyStatus::Under),
            accurate: p.count(AccuracyStatus::Accurate),
            over: p.count(AccuracyStatus::Over),
            no_forecast: p.count(AccuracyStatus::NoForecast),
            total_forecast_qty: p.total_forecast_qty(),
            total_po_qty: p.total_po_qty(),
        })
        .collect()
}

/// Every reconciled row across all months, month by month.
pub fn monthly_detail_rows(performance: &MonthlyPerformance) -> Vec<ReconciledRecord> {
    performance
        .values()
        .flat_map(|p| p.records.iter().cloned())
        .collect()
}
