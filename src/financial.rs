use crate::catalog::ProductCatalog;
use crate::coverage::aggregate_stock;
use crate::schema::{MarginBands, StockRecord, TransactionRecord};
use crate::utils::percentage_of;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Revenue and margin for one sales row, priced from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialRecord {
    pub sku_id: String,
    pub month: NaiveDate,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub sales_qty: f64,
    pub floor_price: f64,
    pub net_order_price: f64,
    pub revenue: f64,
    pub cost: f64,
    pub gross_margin: f64,
    pub margin_percentage: f64,
    pub avg_selling_price: f64,
}

/// Prices every sales row. Empty when the catalog carries no price columns;
/// SKUs without a catalog price are valued at 0.
pub fn financial_metrics(
    sales: &[TransactionRecord],
    catalog: &ProductCatalog,
) -> Vec<FinancialRecord> {
    if !catalog.has_prices() {
        return Vec::new();
    }

    catalog
        .enrich(sales)
        .into_iter()
        .map(|enriched| {
            let floor_price = enriched.info.floor_price.unwrap_or(0.0);
            let net_order_price = enriched.info.net_order_price.unwrap_or(0.0);
            let qty = enriched.row.quantity;
            let revenue = qty * floor_price;
            let cost = qty * net_order_price;
            let gross_margin = revenue - cost;

            FinancialRecord {
                sku_id: enriched.row.sku_id,
                month: enriched.row.month,
                product_name: enriched.info.product_name,
                brand: enriched.info.brand,
                sales_qty: qty,
                floor_price,
                net_order_price,
                revenue,
                cost,
                gross_margin,
                margin_percentage: percentage_of(gross_margin, revenue),
                avg_selling_price: if qty > 0.0 { revenue / qty } else { 0.0 },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryValuation {
    pub sku_id: String,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub stock_qty: f64,
    pub value_at_cost: f64,
    pub value_at_retail: f64,
    pub potential_margin: f64,
    pub margin_percentage: f64,
}

/// Stock value per SKU at cost and at retail price.
pub fn inventory_valuation(
    stock: &[StockRecord],
    catalog: &ProductCatalog,
) -> Vec<InventoryValuation> {
    if !catalog.has_prices() {
        return Vec::new();
    }

    aggregate_stock(stock)
        .into_iter()
        .map(|(sku_id, stock_qty)| {
            let info = catalog.info(&sku_id);
            let value_at_cost = stock_qty * info.net_order_price.unwrap_or(0.0);
            let value_at_retail = stock_qty * info.floor_price.unwrap_or(0.0);
            let potential_margin = value_at_retail - value_at_cost;

            InventoryValuation {
                sku_id,
                product_name: info.product_name,
                brand: info.brand,
                stock_qty,
                value_at_cost,
                value_at_retail,
                potential_margin,
                margin_percentage: percentage_of(potential_margin, value_at_retail),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarginSegment {
    #[serde(rename = "High Margin")]
    High,
    #[serde(rename = "Medium Margin")]
    Medium,
    #[serde(rename = "Low Margin")]
    Low,
    #[serde(rename = "Negative Margin")]
    Negative,
}

impl MarginSegment {
    pub fn classify(margin_percentage: f64, bands: &MarginBands) -> Self {
        if margin_percentage >= bands.high {
            MarginSegment::High
        } else if margin_percentage >= bands.medium {
            MarginSegment::Medium
        } else if margin_percentage > 0.0 {
            MarginSegment::Low
        } else {
            MarginSegment::Negative
        }
    }
}

impl fmt::Display for MarginSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MarginSegment::High => "High Margin",
            MarginSegment::Medium => "Medium Margin",
            MarginSegment::Low => "Low Margin",
            MarginSegment::Negative => "Negative Margin",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuProfitability {
    pub sku_id: String,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub revenue: f64,
    pub gross_margin: f64,
    pub sales_qty: f64,
    pub avg_margin_per_unit: f64,
    pub margin_percentage: f64,
    pub margin_segment: MarginSegment,
}

/// Lifetime profitability per SKU, highest gross margin first.
pub fn profitability_segments(
    financial: &[FinancialRecord],
    bands: &MarginBands,
) -> Vec<SkuProfitability> {
    let mut by_sku: BTreeMap<&str, Vec<&FinancialRecord>> = BTreeMap::new();
    for record in financial {
        by_sku.entry(record.sku_id.as_str()).or_default().push(record);
    }

    let mut segments: Vec<SkuProfitability> = by_sku
        .into_iter()
        .map(|(sku_id, rows)| {
            let revenue: f64 = rows.iter().map(|r| r.revenue).sum();
            let gross_margin: f64 = rows.iter().map(|r| r.gross_margin).sum();
            let sales_qty: f64 = rows.iter().map(|r| r.sales_qty).sum();
            let margin_percentage = percentage_of(gross_margin, revenue);

            SkuProfitability {
                sku_id: sku_id.to_string(),
                product_name: rows[0].product_name.clone(),
                brand: rows[0].brand.clone(),
                revenue,
                gross_margin,
                sales_qty,
                avg_margin_per_unit: if sales_qty > 0.0 {
                    gross_margin / sales_qty
                } else {
                    0.0
                },
                margin_percentage,
                margin_segment: MarginSegment::classify(margin_percentage, bands),
            }
        })
        .collect();

    segments.sort_by(|a, b| b.gross_margin.total_cmp(&a.gross_margin));
    segments
}

/// Classic EOQ, `sqrt(2·D·S / H)` rounded to whole units. 0 for any non-positive input.
pub fn economic_order_quantity(demand: f64, order_cost: f64, holding_cost_per_unit: f64) -> u64 {
    if demand <= 0.0 || order_cost <= 0.0 || holding_cost_per_unit <= 0.0 {
        return 0;
    }
    ((2.0 * demand * order_cost) / holding_cost_per_unit)
        .sqrt()
        .round() as u64
}
