//! Brand, tier and deviation rollups over the reconciled and sales tables.

use crate::catalog::ProductCatalog;
use crate::coverage::UNASSIGNED_TIER;
use crate::reconciliation::{sum_by_sku_month, MonthlyPerformance, ReconciledRecord};
use crate::schema::{AccuracyStatus, PlanningConfig, SkuKeyed, TransactionRecord};
use crate::utils::{mean, percentage_of};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const UNKNOWN_BRAND: &str = "Unknown";

/// Groups borrowed rows by `key_fn`, keys in ascending order.
pub fn group_rows<'a, T, K, F>(rows: &'a [T], key_fn: F) -> BTreeMap<K, Vec<&'a T>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a T>> = BTreeMap::new();
    for row in rows {
        groups.entry(key_fn(row)).or_default().push(row);
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Brand,
    Tier,
}

impl GroupKey {
    pub fn key_of(&self, record: &ReconciledRecord) -> String {
        match self {
            GroupKey::Brand => record.brand.as_deref().unwrap_or(UNKNOWN_BRAND),
            GroupKey::Tier => record.tier.as_deref().unwrap_or(UNASSIGNED_TIER),
        }
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPerformance {
    pub group: String,
    pub sku_count: usize,
    pub total_forecast: f64,
    pub total_po: f64,
    pub accuracy: f64,
    pub po_vs_forecast_ratio: f64,
    pub qty_difference: f64,
    pub under: usize,
    pub accurate: usize,
    pub over: usize,
    pub no_forecast: usize,
}

/// Accuracy rollup per brand or tier, best accuracy first.
pub fn performance_by(records: &[ReconciledRecord], key: GroupKey) -> Vec<GroupPerformance> {
    let mut rows: Vec<GroupPerformance> = group_rows(records, |r| key.key_of(r))
        .into_iter()
        .map(|(group, members)| {
            let total_forecast: f64 = members.iter().map(|r| r.forecast_qty).sum();
            let total_po: f64 = members.iter().map(|r| r.po_qty).sum();
            let errors: Vec<f64> = members
                .iter()
                .filter_map(|r| r.absolute_percentage_error)
                .collect();
            let count = |status: AccuracyStatus| {
                members
                    .iter()
                    .filter(|r| r.accuracy_status == status)
                    .count()
            };

            GroupPerformance {
                sku_count: members.len(),
                total_forecast,
                total_po,
                accuracy: mean(&errors).map(|m| 100.0 - m).unwrap_or(0.0),
                po_vs_forecast_ratio: percentage_of(total_po, total_forecast),
                qty_difference: total_po - total_forecast,
                under: count(AccuracyStatus::Under),
                accurate: count(AccuracyStatus::Accurate),
                over: count(AccuracyStatus::Over),
                no_forecast: count(AccuracyStatus::NoForecast),
                group,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.accuracy
            .total_cmp(&a.accuracy)
            .then_with(|| a.group.cmp(&b.group))
    });
    rows
}

/// Brand rollup for the latest reconciled month.
pub fn brand_performance(monthly: &MonthlyPerformance) -> Vec<GroupPerformance> {
    latest_performance_by(monthly, GroupKey::Brand)
}

/// Tier rollup for the latest reconciled month.
pub fn tier_performance(monthly: &MonthlyPerformance) -> Vec<GroupPerformance> {
    latest_performance_by(monthly, GroupKey::Tier)
}

fn latest_performance_by(monthly: &MonthlyPerformance, key: GroupKey) -> Vec<GroupPerformance> {
    monthly
        .values()
        .next_back()
        .map(|latest| performance_by(&latest.records, key))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationRecord {
    pub sku_id: String,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub tier: Option<String>,
    pub sales_qty: f64,
    pub forecast_qty: f64,
    /// 0 when the SKU has no PO in the reference month.
    pub po_qty: f64,
    pub sales_vs_forecast_ratio: f64,
    pub sales_vs_po_ratio: f64,
    pub forecast_deviation: f64,
    pub po_deviation: f64,
}

impl SkuKeyed for DeviationRecord {
    fn sku_id(&self) -> &str {
        &self.sku_id
    }
}

impl DeviationRecord {
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.forecast_deviation > threshold || self.po_deviation > threshold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotals {
    pub forecast: f64,
    pub po: f64,
    pub sales: f64,
    pub sales_vs_forecast_ratio: f64,
    pub sales_vs_po_ratio: f64,
    pub po_vs_forecast_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesVsForecastDeviation {
    pub reference_month: NaiveDate,
    pub records: Vec<DeviationRecord>,
    /// Rows beyond the deviation threshold, largest forecast deviation first.
    pub high_deviation: Vec<DeviationRecord>,
    pub avg_forecast_deviation: Option<f64>,
    pub avg_po_deviation: Option<f64>,
    pub totals: MonthTotals,
}

impl SalesVsForecastDeviation {
    pub fn total_skus_compared(&self) -> usize {
        self.records.len()
    }
}

fn totals_for(records: &[TransactionRecord], month: NaiveDate) -> BTreeMap<String, f64> {
    sum_by_sku_month(records)
        .into_iter()
        .filter(|((_, m), _)| *m == month)
        .map(|((sku_id, _), qty)| (sku_id, qty))
        .collect()
}

/// Compares actual sales with forecast and PO for the latest month present in
/// all three inputs. Only SKUs with a positive forecast are compared; a
/// missing PO counts as 0. Returns `None` when no common month exists.
pub fn sales_vs_forecast(
    sales: &[TransactionRecord],
    forecast: &[TransactionRecord],
    purchase_orders: &[TransactionRecord],
    catalog: &ProductCatalog,
    config: &PlanningConfig,
) -> Option<SalesVsForecastDeviation> {
    let months = |records: &[TransactionRecord]| -> BTreeSet<NaiveDate> {
        records.iter().map(|r| r.month).collect()
    };
    let forecast_months = months(forecast);
    let po_months = months(purchase_orders);
    let reference_month = months(sales)
        .into_iter()
        .filter(|m| forecast_months.contains(m) && po_months.contains(m))
        .next_back()?;

    let sales_by_sku = totals_for(sales, reference_month);
    let forecast_by_sku = totals_for(forecast, reference_month);
    let po_by_sku = totals_for(purchase_orders, reference_month);

    let rows: Vec<DeviationRecord> = sales_by_sku
        .iter()
        .filter_map(|(sku_id, sales_qty)| {
            let forecast_qty = *forecast_by_sku.get(sku_id).filter(|f| **f > 0.0)?;
            let po_qty = po_by_sku.get(sku_id).copied().unwrap_or(0.0);
            let sales_vs_forecast_ratio = percentage_of(*sales_qty, forecast_qty);
            let sales_vs_po_ratio = percentage_of(*sales_qty, po_qty);
            Some(DeviationRecord {
                sku_id: sku_id.clone(),
                product_name: None,
                brand: None,
                tier: None,
                sales_qty: *sales_qty,
                forecast_qty,
                po_qty,
                sales_vs_forecast_ratio,
                sales_vs_po_ratio,
                forecast_deviation: (sales_vs_forecast_ratio - 100.0).abs(),
                po_deviation: (sales_vs_po_ratio - 100.0).abs(),
            })
        })
        .collect();

    let records: Vec<DeviationRecord> = catalog
        .enrich(&rows)
        .into_iter()
        .map(|enriched| DeviationRecord {
            product_name: enriched.info.product_name,
            brand: enriched.info.brand,
            tier: enriched.info.tier,
            ..enriched.row
        })
        .collect();

    let mut high_deviation: Vec<DeviationRecord> = records
        .iter()
        .filter(|r| r.exceeds(config.deviation_threshold))
        .cloned()
        .collect();
    high_deviation.sort_by(|a, b| b.forecast_deviation.total_cmp(&a.forecast_deviation));

    let forecast_devs: Vec<f64> = records.iter().map(|r| r.forecast_deviation).collect();
    let po_devs: Vec<f64> = records.iter().map(|r| r.po_deviation).collect();

    let total_sales: f64 = sales_by_sku.values().sum();
    let total_forecast: f64 = forecast_by_sku.values().sum();
    let total_po: f64 = po_by_sku.values().sum();

    debug!(
        "Sales vs forecast for {}: {} SKUs compared, {} above {}",
        reference_month,
        records.len(),
        high_deviation.len(),
        config.deviation_threshold
    );

    Some(SalesVsForecastDeviation {
        reference_month,
        avg_forecast_deviation: mean(&forecast_devs),
        avg_po_deviation: mean(&po_devs),
        high_deviation,
        records,
        totals: MonthTotals {
            forecast: total_forecast,
            po: total_po,
            sales: total_sales,
            sales_vs_forecast_ratio: percentage_of(total_sales, total_forecast),
            sales_vs_po_ratio: percentage_of(total_sales, total_po),
            po_vs_forecast_ratio: percentage_of(total_po, total_forecast),
        },
    })
}
