//! # Demand Planning Engine
//!
//! Forecast-vs-fulfillment reconciliation and inventory coverage metrics over
//! multi-sheet merchandising data (product catalog, monthly sales, rolling
//! forecast, purchase orders, stock on hand).
//!
//! ## Core Concepts
//!
//! - **Wide sheets**: one row per SKU, one column per month ("Jan-24", "JAN 2024", "jan_24")
//! - **Long records**: one [`TransactionRecord`] per (SKU, month) after reshaping
//! - **Reconciliation**: PO quantity against forecast, classified Under / Accurate / Over / No Forecast
//! - **Coverage**: stock on hand in months of trailing average demand
//! - **Snapshot**: every derived table from one refresh, computed in a single pure pass
//!
//! ## Example
//!
//! ```rust,ignore
//! use demand_planning_engine::*;
//!
//! let tables = SourceTables {
//!     product: RawTable::from_csv_str("Product_Master", "SKU_ID,Brand,SKU_Tier,Status\nA1,X,T1,Active\n")?,
//!     forecast: RawTable::from_csv_str("Rofo", "SKU_ID,Jan-25\nA1,100\n")?,
//!     purchase_orders: RawTable::from_csv_str("PO", "SKU_ID,Jan-25\nA1,90\n")?,
//!     ..SourceTables::default()
//! };
//!
//! let snapshot = build_snapshot(&tables, &PlanningConfig::default())?;
//! assert_eq!(snapshot.latest_accuracy(), Some(90.0));
//! ```

pub mod aggregation;
pub mod cache;
pub mod catalog;
pub mod coverage;
pub mod error;
pub mod export;
pub mod financial;
pub mod ingestion;
pub mod quality;
pub mod reconciliation;
pub mod reshape;
pub mod schema;
pub mod seasonality;
pub mod utils;

pub use aggregation::{
    brand_performance, group_rows, performance_by, sales_vs_forecast, tier_performance,
    DeviationRecord, GroupKey, GroupPerformance, MonthTotals, SalesVsForecastDeviation,
};
pub use cache::{fingerprint, CacheKey, DemandPlanner, SnapshotCache};
pub use catalog::{Enriched, ProductCatalog, ProductInfo};
pub use coverage::{inventory_coverage, CoverageRecord, InventoryMetrics, TierRollup, COVER_SENTINEL};
pub use error::{PlanningError, Result};
pub use financial::{
    economic_order_quantity, financial_metrics, inventory_valuation, profitability_segments,
    FinancialRecord, InventoryValuation, MarginSegment, SkuProfitability,
};
pub use ingestion::*;
pub use quality::DataQualityReport;
pub use reconciliation::{
    forecast_bias, monthly_performance, recent_performance, MonthPerformance, MonthlyBias,
    MonthlyPerformance, ReconciledRecord,
};
pub use reshape::{reshape_wide_to_long, reshape_wide_to_long_at, ReshapeOutcome};
pub use schema::*;
pub use seasonality::{seasonality, SeasonType, SeasonalMonth};
pub use utils::{parse_month_label, parse_month_label_at};

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;

/// Every derived table from one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub active_skus: usize,
    pub sales: Vec<TransactionRecord>,
    pub forecast: Vec<TransactionRecord>,
    pub purchase_orders: Vec<TransactionRecord>,
    pub stock: Vec<StockRecord>,
    pub monthly_performance: MonthlyPerformance,
    pub recent_performance: MonthlyPerformance,
    pub inventory: InventoryMetrics,
    pub sales_vs_forecast: Option<SalesVsForecastDeviation>,
    pub brand_performance: Vec<GroupPerformance>,
    pub tier_performance: Vec<GroupPerformance>,
    pub forecast_bias: Vec<MonthlyBias>,
    pub financial: Vec<FinancialRecord>,
    pub inventory_valuation: Vec<InventoryValuation>,
    pub profitability: Vec<SkuProfitability>,
    pub seasonality: Vec<SeasonalMonth>,
    pub data_quality: Vec<DataQualityReport>,
    /// Human-readable degradations hit while building the snapshot.
    pub warnings: Vec<String>,
}

impl DashboardSnapshot {
    /// Accuracy of the most recent reconciled month.
    pub fn latest_accuracy(&self) -> Option<f64> {
        self.monthly_performance
            .values()
            .next_back()
            .map(|p| p.accuracy)
    }

    pub fn has_financials(&self) -> bool {
        !self.financial.is_empty()
    }
}

pub struct DemandPlanningProcessor;

impl DemandPlanningProcessor {
    pub fn process(tables: &SourceTables, config: &PlanningConfig) -> Result<DashboardSnapshot> {
        Self::process_at(tables, config, Utc::now().date_naive())
    }

    /// Runs the full pipeline. `today` only resolves month headers that carry
    /// no recognisable month or year.
    pub fn process_at(
        tables: &SourceTables,
        config: &PlanningConfig,
        today: NaiveDate,
    ) -> Result<DashboardSnapshot> {
        config.validate()?;

        info!(
            "Building snapshot: product={} sales={} forecast={} po={} stock={} rows",
            tables.product.rows.len(),
            tables.sales.rows.len(),
            tables.forecast.rows.len(),
            tables.purchase_orders.rows.len(),
            tables.stock.rows.len()
        );

        let mut warnings = Vec::new();

        let loaded_catalog = ProductCatalog::from_table(&tables.product);
        warnings.extend(loaded_catalog.warnings);
        let catalog = loaded_catalog.value;

        let mut reshape = |table: &RawTable| -> Vec<TransactionRecord> {
            let outcome = reshape_wide_to_long_at(table, &catalog, today);
            debug!(
                "Sheet '{}': months {:?}, {} records",
                table.name,
                outcome.month_columns,
                outcome.records.len()
            );
            warnings.extend(outcome.warning);
            outcome.records
        };
        let sales = reshape(&tables.sales);
        let forecast = reshape(&tables.forecast);
        let purchase_orders = reshape(&tables.purchase_orders);

        let loaded_stock = load_stock(&tables.stock, &catalog);
        warnings.extend(loaded_stock.warnings);
        let stock = loaded_stock.value;

        if forecast.is_empty() || purchase_orders.is_empty() {
            warnings.push(degraded(
                "Forecast or PO data is empty; forecast accuracy unavailable",
            ));
        }
        if stock.is_empty() {
            warnings.push(degraded("Stock data is empty; inventory coverage unavailable"));
        }

        let monthly = monthly_performance(&forecast, &purchase_orders, &catalog, &config.accuracy);
        let recent = recent_performance(&monthly, config.recent_months);
        let inventory = inventory_coverage(
            &stock,
            &sales,
            &catalog,
            &config.coverage,
            config.trailing_months,
        );
        let deviation = sales_vs_forecast(&sales, &forecast, &purchase_orders, &catalog, config);

        let financial = financial_metrics(&sales, &catalog);
        let valuation = inventory_valuation(&stock, &catalog);
        let profitability = profitability_segments(&financial, &config.profitability);
        let seasonal = seasonality(&financial, &config.seasonality);

        info!(
            "Snapshot ready: {} months reconciled, {} SKUs classified, {} warnings",
            monthly.len(),
            inventory.total_skus,
            warnings.len()
        );

        Ok(DashboardSnapshot {
            active_skus: catalog.active_skus().len(),
            brand_performance: brand_performance(&monthly),
            tier_performance: tier_performance(&monthly),
            forecast_bias: forecast_bias(&forecast, &purchase_orders),
            data_quality: tables
                .all()
                .iter()
                .map(|table| DataQualityReport::for_table_at(table, today))
                .collect(),
            sales,
            forecast,
            purchase_orders,
            stock,
            monthly_performance: monthly,
            recent_performance: recent,
            inventory,
            sales_vs_forecast: deviation,
            financial,
            inventory_valuation: valuation,
            profitability,
            seasonality: seasonal,
            warnings,
        })
    }
}

fn degraded(message: &str) -> String {
    warn!("{}", message);
    message.to_string()
}

pub fn build_snapshot(tables: &SourceTables, config: &PlanningConfig) -> Result<DashboardSnapshot> {
    DemandPlanningProcessor::process(tables, config)
}

pub fn build_snapshot_at(
    tables: &SourceTables,
    config: &PlanningConfig,
    today: NaiveDate,
) -> Result<DashboardSnapshot> {
    DemandPlanningProcessor::process_at(tables, config, today)
}
