use crate::catalog::ProductCatalog;
use crate::reconciliation::sum_by_sku_month;
use crate::schema::{CoverageThresholds, InventoryStatus, StockRecord, TransactionRecord};
use crate::utils::{last_n_months, mean, percentage_of};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Cover value for SKUs with no demand in the trailing window. Never averaged.
pub const COVER_SENTINEL: f64 = 999.0;

/// Tier label for SKUs whose catalog row carries no tier.
pub const UNASSIGNED_TIER: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub sku_id: String,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub tier: Option<String>,
    pub stock_qty: f64,
    pub avg_monthly_sales_3m: f64,
    pub cover_months: f64,
    pub inventory_status: InventoryStatus,
    pub qty_to_order: f64,
    pub qty_to_reduce: f64,
}

impl CoverageRecord {
    pub fn has_demand_signal(&self) -> bool {
        self.cover_months < COVER_SENTINEL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierRollup {
    pub tier: String,
    pub sku_count: usize,
    pub total_stock: f64,
    pub total_sales_3m_avg: f64,
    pub avg_cover_months: Option<f64>,
    pub turnover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct InventoryMetrics {
    pub records: Vec<CoverageRecord>,
    pub tier_rollup: Vec<TierRollup>,
    pub total_stock: f64,
    pub total_skus: usize,
    /// Mean cover across SKUs with a demand signal.
    pub avg_cover: Option<f64>,
    pub high_stock: Vec<CoverageRecord>,
    pub low_stock: Vec<CoverageRecord>,
    pub window_months: Vec<NaiveDate>,
    /// Share of SKUs classified Ideal, in percent.
    pub inventory_health_score: f64,
}

impl InventoryMetrics {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count(&self, status: InventoryStatus) -> usize {
        self.records
            .iter()
            .filter(|r| r.inventory_status == status)
            .count()
    }
}

pub fn cover_months(stock_qty: f64, avg_monthly_sales: f64) -> f64 {
    if avg_monthly_sales > 0.0 {
        stock_qty / avg_monthly_sales
    } else {
        COVER_SENTINEL
    }
}

/// Both thresholds belong to Ideal.
pub fn classify_cover(cover: f64, thresholds: &CoverageThresholds) -> InventoryStatus {
    if !cover.is_finite() {
        InventoryStatus::Unknown
    } else if cover < thresholds.low {
        InventoryStatus::NeedReplenishment
    } else if cover > thresholds.high {
        InventoryStatus::HighStock
    } else {
        InventoryStatus::Ideal
    }
}

/// Sums batch rows into one stock figure per SKU.
pub fn aggregate_stock(stock: &[StockRecord]) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in stock {
        *totals.entry(record.sku_id.clone()).or_insert(0.0) += record.stock_qty;
    }
    totals
}

/// Mean monthly sales per SKU over the last `window` distinct sales months.
/// Duplicate rows within a month add up before averaging.
pub fn trailing_average_sales(
    sales: &[TransactionRecord],
    window: usize,
) -> (BTreeMap<String, f64>, Vec<NaiveDate>) {
    let months = last_n_months(sales.iter().map(|r| r.month), window);
    let Some(first_month) = months.first().copied() else {
        return (BTreeMap::new(), months);
    };

    let mut per_sku: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for ((sku_id, month), qty) in sum_by_sku_month(sales) {
        if month >= first_month {
            per_sku.entry(sku_id).or_default().push(qty);
        }
    }

    let averages = per_sku
        .into_iter()
        .map(|(sku_id, quantities)| (sku_id, mean(&quantities).unwrap_or(0.0)))
        .collect();

    (averages, months)
}

/// Classifies every stocked SKU against its trailing demand. Stock is summed
/// per SKU first; SKUs with no recent sales get [`COVER_SENTINEL`].
pub fn inventory_coverage(
    stock: &[StockRecord],
    sales: &[TransactionRecord],
    catalog: &ProductCatalog,
    thresholds: &CoverageThresholds,
    trailing_months: usize,
) -> InventoryMetrics {
    if stock.is_empty() {
        return InventoryMetrics::default();
    }

    let stock_by_sku = aggregate_stock(stock);
    let (avg_sales, window_months) = trailing_average_sales(sales, trailing_months);

    debug!(
        "Coverage: {} stock rows -> {} SKUs, sales window {:?}",
        stock.len(),
        stock_by_sku.len(),
        window_months
    );

    let records: Vec<CoverageRecord> = stock_by_sku
        .into_iter()
        .map(|(sku_id, stock_qty)| {
            let avg = avg_sales.get(&sku_id).copied().unwrap_or(0.0);
            let cover = cover_months(stock_qty, avg);
            let status = classify_cover(cover, thresholds);
            let info = catalog.info(&sku_id);

            let qty_to_order = match status {
                InventoryStatus::NeedReplenishment => (thresholds.low * avg - stock_qty).max(0.0),
                _ => 0.0,
            };
            let qty_to_reduce = match status {
                InventoryStatus::HighStock => (stock_qty - thresholds.high * avg).max(0.0),
                _ => 0.0,
            };

            CoverageRecord {
                sku_id,
                product_name: info.product_name,
                brand: info.brand,
                tier: info.tier,
                stock_qty,
                avg_monthly_sales_3m: avg,
                cover_months: cover,
                inventory_status: status,
                qty_to_order,
                qty_to_reduce,
            }
        })
        .collect();

    let mut high_stock: Vec<CoverageRecord> = records
        .iter()
        .filter(|r| r.inventory_status == InventoryStatus::HighStock)
        .cloned()
        .collect();
    high_stock.sort_by(|a, b| b.cover_months.total_cmp(&a.cover_months));

    let mut low_stock: Vec<CoverageRecord> = records
        .iter()
        .filter(|r| r.inventory_status == InventoryStatus::NeedReplenishment)
        .cloned()
        .collect();
    low_stock.sort_by(|a, b| a.cover_months.total_cmp(&b.cover_months));

    let covers: Vec<f64> = records
        .iter()
        .filter(|r| r.has_demand_signal())
        .map(|r| r.cover_months)
        .collect();

    let ideal = records
        .iter()
        .filter(|r| r.inventory_status == InventoryStatus::Ideal)
        .count();

    InventoryMetrics {
        tier_rollup: tier_rollup(&records),
        total_stock: records.iter().map(|r| r.stock_qty).sum(),
        total_skus: records.len(),
        avg_cover: mean(&covers),
        inventory_health_score: percentage_of(ideal as f64, records.len() as f64),
        high_stock,
        low_stock,
        window_months,
        records,
    }
}

pub fn tier_rollup(records: &[CoverageRecord]) -> Vec<TierRollup> {
    let mut groups: BTreeMap<String, Vec<&CoverageRecord>> = BTreeMap::new();
    for record in records {
        let tier = record
            .tier
            .clone()
            .unwrap_or_else(|| UNASSIGNED_TIER.to_string());
        groups.entry(tier).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(tier, members)| {
            let total_stock: f64 = members.iter().map(|r| r.stock_qty).sum();
            let total_sales_3m_avg: f64 = members.iter().map(|r| r.avg_monthly_sales_3m).sum();
            let covers: Vec<f64> = members
                .iter()
                .filter(|r| r.has_demand_signal())
                .map(|r| r.cover_months)
                .collect();

            TierRollup {
                tier,
                sku_count: members.len(),
                total_stock,
                total_sales_3m_avg,
                avg_cover_months: mean(&covers),
                turnover: if total_stock > 0.0 {
                    total_sales_3m_avg / total_stock
                } else {
                    0.0
                },
            }
        })
        .collect()
}
