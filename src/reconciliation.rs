//! Forecast (Rofo) vs purchase-order reconciliation.
//!
//! Forecast and PO quantities are summed per (SKU, month) and inner-joined on
//! that key. Joined rows with a zero forecast are kept and classified
//! [`AccuracyStatus::NoForecast`]; they carry no percentage error and never
//! enter the accuracy mean.

use crate::catalog::ProductCatalog;
use crate::schema::{AccuracyStatus, AccuracyThresholds, SkuKeyed, TransactionRecord};
use crate::utils::{last_n_months, mean, percentage_of};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRecord {
    pub sku_id: String,
    pub month: NaiveDate,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub tier: Option<String>,
    pub forecast_qty: f64,
    pub po_qty: f64,
    /// PO / forecast × 100, or 0 when there is no forecast.
    pub fulfillment_ratio: f64,
    pub accuracy_status: AccuracyStatus,
    /// |ratio − 100|; `None` for NoForecast rows.
    pub absolute_percentage_error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthPerformance {
    pub month: NaiveDate,
    /// 100 − MAPE over rows with a forecast; 0 when there are none.
    pub accuracy: f64,
    pub mape: Option<f64>,
    pub status_counts: BTreeMap<AccuracyStatus, usize>,
    pub status_percentages: BTreeMap<AccuracyStatus, f64>,
    pub forecast_qty_by_status: BTreeMap<AccuracyStatus, f64>,
    pub po_qty_by_status: BTreeMap<AccuracyStatus, f64>,
    pub total_records: usize,
    pub records: Vec<ReconciledRecord>,
}

impl MonthPerformance {
    pub fn count(&self, status: AccuracyStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    pub fn records_with_status(&self, status: AccuracyStatus) -> Vec<&ReconciledRecord> {
        self.records
            .iter()
            .filter(|r| r.accuracy_status == status)
            .collect()
    }

    pub fn total_forecast_qty(&self) -> f64 {
        self.records.iter().map(|r| r.forecast_qty).sum()
    }

    pub fn total_po_qty(&self) -> f64 {
        self.records.iter().map(|r| r.po_qty).sum()
    }
}

pub type MonthlyPerformance = BTreeMap<NaiveDate, MonthPerformance>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBias {
    pub month: NaiveDate,
    pub avg_bias: f64,
    pub avg_bias_percentage: f64,
    pub over_forecast_skus: usize,
    pub under_forecast_skus: usize,
}

#[derive(Clone)]
struct JoinedRow {
    sku_id: String,
    month: NaiveDate,
    forecast_qty: f64,
    po_qty: f64,
}

impl SkuKeyed for JoinedRow {
    fn sku_id(&self) -> &str {
        &self.sku_id
    }
}

/// Sums quantities per (SKU, month). Duplicate rows in a sheet add up.
pub fn sum_by_sku_month(records: &[TransactionRecord]) -> BTreeMap<(String, NaiveDate), f64> {
    let mut totals: BTreeMap<(String, NaiveDate), f64> = BTreeMap::new();
    for record in records {
        *totals
            .entry((record.sku_id.clone(), record.month))
            .or_insert(0.0) += record.quantity;
    }
    totals
}

pub fn fulfillment_ratio(forecast_qty: f64, po_qty: f64) -> f64 {
    percentage_of(po_qty, forecast_qty)
}

/// Bucket for a row that has a forecast. Both thresholds belong to Accurate.
pub fn classify_ratio(ratio: f64, thresholds: &AccuracyThresholds) -> AccuracyStatus {
    if ratio < thresholds.under {
        AccuracyStatus::Under
    } else if ratio > thresholds.over {
        AccuracyStatus::Over
    } else {
        AccuracyStatus::Accurate
    }
}

/// Joins forecast and PO on (SKU, month) and classifies every joined row.
/// Output is ordered by SKU, then month.
pub fn reconcile(
    forecast: &[TransactionRecord],
    purchase_orders: &[TransactionRecord],
    catalog: &ProductCatalog,
    thresholds: &AccuracyThresholds,
) -> Vec<ReconciledRecord> {
    let forecast_totals = sum_by_sku_month(forecast);
    let po_totals = sum_by_sku_month(purchase_orders);

    let joined: Vec<JoinedRow> = forecast_totals
        .iter()
        .filter_map(|(key, forecast_qty)| {
            po_totals.get(key).map(|po_qty| JoinedRow {
                sku_id: key.0.clone(),
                month: key.1,
                forecast_qty: *forecast_qty,
                po_qty: *po_qty,
            })
        })
        .collect();

    catalog
        .enrich(&joined)
        .into_iter()
        .map(|enriched| {
            let row = enriched.row;
            let (ratio, status, ape) = if row.forecast_qty > 0.0 {
                let ratio = fulfillment_ratio(row.forecast_qty, row.po_qty);
                (
                    ratio,
                    classify_ratio(ratio, thresholds),
                    Some((ratio - 100.0).abs()),
                )
            } else {
                (0.0, AccuracyStatus::NoForecast, None)
            };

            ReconciledRecord {
                sku_id: row.sku_id,
                month: row.month,
                product_name: enriched.info.product_name,
                brand: enriched.info.brand,
                tier: enriched.info.tier,
                forecast_qty: row.forecast_qty,
                po_qty: row.po_qty,
                fulfillment_ratio: ratio,
                accuracy_status: status,
                absolute_percentage_error: ape,
            }
        })
        .collect()
}

/// Accuracy score and bucket breakdown for one month's reconciled rows.
pub fn summarize_month(month: NaiveDate, records: Vec<ReconciledRecord>) -> MonthPerformance {
    let errors: Vec<f64> = records
        .iter()
        .filter_map(|r| r.absolute_percentage_error)
        .collect();
    let mape = mean(&errors);
    let accuracy = mape.map(|m| 100.0 - m).unwrap_or(0.0);

    let total_records = records.len();
    let mut status_counts = BTreeMap::new();
    let mut forecast_qty_by_status = BTreeMap::new();
    let mut po_qty_by_status = BTreeMap::new();
    for status in AccuracyStatus::ALL {
        status_counts.insert(status, 0usize);
        forecast_qty_by_status.insert(status, 0.0);
        po_qty_by_status.insert(status, 0.0);
    }
    for record in &records {
        *status_counts.entry(record.accuracy_status).or_insert(0) += 1;
        *forecast_qty_by_status
            .entry(record.accuracy_status)
            .or_insert(0.0) += record.forecast_qty;
        *po_qty_by_status.entry(record.accuracy_status).or_insert(0.0) += record.po_qty;
    }

    let status_percentages = status_counts
        .iter()
        .map(|(status, count)| {
            let pct = if total_records > 0 {
                *count as f64 / total_records as f64 * 100.0
            } else {
                0.0
            };
            (*status, pct)
        })
        .collect();

    MonthPerformance {
        month,
        accuracy,
        mape,
        status_counts,
        status_percentages,
        forecast_qty_by_status,
        po_qty_by_status,
        total_records,
        records,
    }
}

/// Per-month accuracy over every month present in forecast or PO data. Months
/// where the join is empty (e.g. forecast horizon without POs yet) are omitted.
pub fn monthly_performance(
    forecast: &[TransactionRecord],
    purchase_orders: &[TransactionRecord],
    catalog: &ProductCatalog,
    thresholds: &AccuracyThresholds,
) -> MonthlyPerformance {
    let mut performance = BTreeMap::new();

    if forecast.is_empty() || purchase_orders.is_empty() {
        return performance;
    }

    let mut by_month: BTreeMap<NaiveDate, Vec<ReconciledRecord>> = BTreeMap::new();
    for record in reconcile(forecast, purchase_orders, catalog, thresholds) {
        by_month.entry(record.month).or_default().push(record);
    }

    let candidate_months: BTreeSet<NaiveDate> = forecast
        .iter()
        .chain(purchase_orders.iter())
        .map(|r| r.month)
        .collect();

    for month in candidate_months {
        match by_month.remove(&month) {
            Some(records) => {
                performance.insert(month, summarize_month(month, records));
            }
            None => debug!("No forecast/PO overlap for {}; month skipped", month),
        }
    }

    performance
}

/// The most recent `n` reconciled months, ascending.
pub fn recent_performance(performance: &MonthlyPerformance, n: usize) -> MonthlyPerformance {
    last_n_months(performance.keys().copied(), n)
        .into_iter()
        .filter_map(|month| performance.get(&month).map(|p| (month, p.clone())))
        .collect()
}

/// Systematic over/under forecasting per month common to both inputs.
pub fn forecast_bias(
    forecast: &[TransactionRecord],
    purchase_orders: &[TransactionRecord],
) -> Vec<MonthlyBias> {
    let forecast_totals = sum_by_sku_month(forecast);
    let po_totals = sum_by_sku_month(purchase_orders);

    let mut biases: BTreeMap<NaiveDate, Vec<(f64, f64)>> = BTreeMap::new();
    for (key, forecast_qty) in &forecast_totals {
        if let Some(po_qty) = po_totals.get(key) {
            let bias = po_qty - forecast_qty;
            let bias_pct = percentage_of(bias, *forecast_qty);
            biases.entry(key.1).or_default().push((bias, bias_pct));
        }
    }

    biases
        .into_iter()
        .map(|(month, rows)| {
            let bias: Vec<f64> = rows.iter().map(|(b, _)| *b).collect();
            let bias_pct: Vec<f64> = rows.iter().map(|(_, p)| *p).collect();
            MonthlyBias {
                month,
                avg_bias: mean(&bias).unwrap_or(0.0),
                avg_bias_percentage: mean(&bias_pct).unwrap_or(0.0),
                over_forecast_skus: bias.iter().filter(|b| **b > 0.0).count(),
                under_forecast_skus: bias.iter().filter(|b| **b < 0.0).count(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::RawTable;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::from_table(
            &RawTable::from_csv_str(
                "Product_Master",
                "SKU_ID,Product_Name,Brand,SKU_Tier,Status\nA1,Alpha,X,T1,Active\nB1,Beta,Y,T2,Active\nC1,Gamma,Y,T2,Active\n",
            )
            .unwrap(),
        )
        .value
    }

    fn rec(sku: &str, m: NaiveDate, qty: f64) -> TransactionRecord {
        TransactionRecord::new(sku, m, qty)
    }

    #[test]
    fn test_exact_fulfillment_scores_100() {
        let jan = month(2025, 1);
        let perf = monthly_performance(
            &[rec("A1", jan, 100.0)],
            &[rec("A1", jan, 100.0)],
            &catalog(),
            &AccuracyThresholds::default(),
        );

        let jan_perf = perf.get(&jan).unwrap();
        assert_eq!(jan_perf.accuracy, 100.0);
        assert_eq!(jan_perf.total_records, 1);
        assert_eq!(jan_perf.count(AccuracyStatus::Accurate), 1);
    }

    #[test]
    fn test_under_fulfillment_scenario() {
        let jan = month(2025, 1);
        let perf = monthly_performance(
            &[rec("A1", jan, 100.0)],
            &[rec("A1", jan, 90.0)],
            &catalog(),
            &AccuracyThresholds::default(),
        );

        let jan_perf = perf.get(&jan).unwrap();
        let row = &jan_perf.records[0];
        assert!((row.fulfillment_ratio - 90.0).abs() < 1e-9);
        assert_eq!(row.accuracy_status, AccuracyStatus::Accurate);
        assert_eq!(row.brand.as_deref(), Some("X"));
        assert_eq!(row.tier.as_deref(), Some("T1"));
        assert!((jan_perf.accuracy - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_are_inclusive_for_accurate() {
        let thresholds = AccuracyThresholds::default();
        assert_eq!(classify_ratio(79.99, &thresholds), AccuracyStatus::Under);
        assert_eq!(classify_ratio(80.0, &thresholds), AccuracyStatus::Accurate);
        assert_eq!(classify_ratio(120.0, &thresholds), AccuracyStatus::Accurate);
        assert_eq!(classify_ratio(120.01, &thresholds), AccuracyStatus::Over);

        let custom = AccuracyThresholds {
            under: 90.0,
            over: 110.0,
        };
        assert_eq!(classify_ratio(85.0, &custom), AccuracyStatus::Under);
    }

    #[test]
    fn test_zero_forecast_rows_excluded_from_accuracy() {
        let jan = month(2025, 1);
        let forecast = vec![rec("A1", jan, 100.0), rec("B1", jan, 0.0)];
        let po = vec![rec("A1", jan, 150.0), rec("B1", jan, 40.0)];

        let perf = monthly_performance(&forecast, &po, &catalog(), &AccuracyThresholds::default());
        let jan_perf = perf.get(&jan).unwrap();

        assert_eq!(jan_perf.total_records, 2);
        assert_eq!(jan_perf.count(AccuracyStatus::Over), 1);
        assert_eq!(jan_perf.count(AccuracyStatus::NoForecast), 1);
        assert_eq!(jan_perf.mape, Some(50.0));
        assert_eq!(jan_perf.accuracy, 50.0);

        let no_forecast = jan_perf.records_with_status(AccuracyStatus::NoForecast);
        assert_eq!(no_forecast[0].fulfillment_ratio, 0.0);
        assert!(no_forecast[0].absolute_percentage_error.is_none());
    }

    #[test]
    fn test_month_with_only_no_forecast_rows_scores_zero() {
        let jan = month(2025, 1);
        let perf = monthly_performance(
            &[rec("A1", jan, 0.0)],
            &[rec("A1", jan, 10.0)],
            &catalog(),
            &AccuracyThresholds::default(),
        );
        let jan_perf = perf.get(&jan).unwrap();
        assert_eq!(jan_perf.mape, None);
        assert_eq!(jan_perf.accuracy, 0.0);
        assert_eq!(jan_perf.status_percentages[&AccuracyStatus::NoForecast], 100.0);
    }

    #[test]
    fn test_accurate_rows_have_small_error() {
        let jan = month(2025, 1);
        let forecast: Vec<_> = (0..50)
            .map(|i| rec(&format!("S{}", i), jan, 100.0))
            .collect();
        let po: Vec<_> = (0..50)
            .map(|i| rec(&format!("S{}", i), jan, 60.0 + i as f64 * 2.0))
            .collect();

        let rows = reconcile(&forecast, &po, &catalog(), &AccuracyThresholds::default());
        assert_eq!(rows.len(), 50);
        for row in rows
            .iter()
            .filter(|r| r.accuracy_status == AccuracyStatus::Accurate)
        {
            assert!(row.absolute_percentage_error.unwrap() <= 20.0);
        }
        // SKUs outside the catalog still join, with no descriptive attributes
        assert!(rows[0].brand.is_none());
    }

    #[test]
    fn test_unmatched_months_are_omitted() {
        let jan = month(2025, 1);
        let feb = month(2025, 2);
        let forecast = vec![rec("A1", jan, 100.0), rec("A1", feb, 100.0)];
        let po = vec![rec("A1", jan, 100.0)];

        let perf = monthly_performance(&forecast, &po, &catalog(), &AccuracyThresholds::default());
        assert_eq!(perf.len(), 1);
        assert!(perf.contains_key(&jan));
    }

    #[test]
    fn test_duplicate_rows_sum_before_join() {
        let jan = month(2025, 1);
        let forecast = vec![rec("A1", jan, 50.0), rec("A1", jan, 50.0)];
        let po = vec![rec("A1", jan, 90.0)];

        let rows = reconcile(&forecast, &po, &catalog(), &AccuracyThresholds::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].forecast_qty, 100.0);
    }

    #[test]
    fn test_empty_inputs_give_empty_performance() {
        let jan = month(2025, 1);
        let thresholds = AccuracyThresholds::default();
        assert!(monthly_performance(&[], &[rec("A1", jan, 1.0)], &catalog(), &thresholds).is_empty());
        assert!(monthly_performance(&[rec("A1", jan, 1.0)], &[], &catalog(), &thresholds).is_empty());
    }

    #[test]
    fn test_recent_performance_picks_latest_months() {
        let months: Vec<NaiveDate> = vec![month(2024, 10), month(2024, 12), month(2025, 1), month(2025, 3)];
        let forecast: Vec<_> = months.iter().map(|m| rec("A1", *m, 100.0)).collect();
        let po: Vec<_> = months.iter().map(|m| rec("A1", *m, 95.0)).collect();

        let perf = monthly_performance(&forecast, &po, &catalog(), &AccuracyThresholds::default());
        let recent = recent_performance(&perf, 3);
        let keys: Vec<NaiveDate> = recent.keys().copied().collect();
        assert_eq!(keys, vec![month(2024, 12), month(2025, 1), month(2025, 3)]);
    }

    #[test]
    fn test_forecast_bias() {
        let jan = month(2025, 1);
        let forecast = vec![rec("A1", jan, 100.0), rec("B1", jan, 50.0), rec("C1", jan, 0.0)];
        let po = vec![rec("A1", jan, 120.0), rec("B1", jan, 40.0), rec("C1", jan, 10.0)];

        let bias = forecast_bias(&forecast, &po);
        assert_eq!(bias.len(), 1);
        let jan_bias = &bias[0];
        assert!((jan_bias.avg_bias - (20.0 - 10.0 + 10.0) / 3.0).abs() < 1e-9);
        assert!((jan_bias.avg_bias_percentage - (20.0 - 20.0 + 0.0) / 3.0).abs() < 1e-9);
        assert_eq!(jan_bias.over_forecast_skus, 2);
        assert_eq!(jan_bias.under_forecast_skus, 1);
    }
}
