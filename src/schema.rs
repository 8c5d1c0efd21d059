use crate::error::{PlanningError, Result};
use chrono::{Duration, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct AccuracyThresholds {
    #[schemars(
        description = "PO/forecast ratio (%) below which a SKU-month is classified Under. Inclusive lower bound of Accurate."
    )]
    #[serde(default = "default_under")]
    pub under: f64,

    #[schemars(
        description = "PO/forecast ratio (%) above which a SKU-month is classified Over. Inclusive upper bound of Accurate."
    )]
    #[serde(default = "default_over")]
    pub over: f64,
}

impl Default for AccuracyThresholds {
    fn default() -> Self {
        Self {
            under: default_under(),
            over: default_over(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CoverageThresholds {
    #[schemars(
        description = "Cover (months of stock) below which a SKU needs replenishment. Also the target multiple for order quantities."
    )]
    #[serde(default = "default_low_cover")]
    pub low: f64,

    #[schemars(
        description = "Cover (months of stock) above which a SKU is high stock. Also the ceiling multiple for reduction quantities."
    )]
    #[serde(default = "default_high_cover")]
    pub high: f64,
}

impl Default for CoverageThresholds {
    fn default() -> Self {
        Self {
            low: default_low_cover(),
            high: default_high_cover(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MarginBands {
    #[schemars(description = "Margin percentage at or above which a SKU is High Margin")]
    #[serde(default = "default_high_margin")]
    pub high: f64,

    #[schemars(description = "Margin percentage at or above which a SKU is Medium Margin")]
    #[serde(default = "default_medium_margin")]
    pub medium: f64,
}

impl Default for MarginBands {
    fn default() -> Self {
        Self {
            high: default_high_margin(),
            medium: default_medium_margin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SeasonBands {
    #[schemars(description = "Seasonal revenue index at or above which a calendar month is Peak Season")]
    #[serde(default = "default_peak_index")]
    pub peak: f64,

    #[schemars(description = "Seasonal revenue index below which a calendar month is Low Season")]
    #[serde(default = "default_low_index")]
    pub low: f64,
}

impl Default for SeasonBands {
    fn default() -> Self {
        Self {
            peak: default_peak_index(),
            low: default_low_index(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PlanningConfig {
    #[serde(default)]
    #[schemars(description = "Forecast accuracy classification bands")]
    pub accuracy: AccuracyThresholds,

    #[serde(default)]
    #[schemars(description = "Inventory cover classification bands")]
    pub coverage: CoverageThresholds,

    #[serde(default = "default_trailing_months")]
    #[schemars(description = "Number of most recent sales months averaged for demand (default 3)")]
    pub trailing_months: usize,

    #[serde(default = "default_recent_months")]
    #[schemars(description = "Number of most recent reconciled months shown as the recent performance window (default 3)")]
    pub recent_months: usize,

    #[serde(default = "default_deviation_threshold")]
    #[schemars(
        description = "Absolute deviation (percentage points from 100%) above which a sales/forecast or sales/PO ratio is reported as an exception"
    )]
    pub deviation_threshold: f64,

    #[serde(default = "default_cache_ttl_seconds")]
    #[schemars(description = "Seconds a computed snapshot stays valid in the cache")]
    pub cache_ttl_seconds: i64,

    #[serde(default)]
    pub profitability: MarginBands,

    #[serde(default)]
    pub seasonality: SeasonBands,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            accuracy: AccuracyThresholds::default(),
            coverage: CoverageThresholds::default(),
            trailing_months: default_trailing_months(),
            recent_months: default_recent_months(),
            deviation_threshold: default_deviation_threshold(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            profitability: MarginBands::default(),
            seasonality: SeasonBands::default(),
        }
    }
}

impl PlanningConfig {
    pub fn validate(&self) -> Result<()> {
        check_band("accuracy", self.accuracy.under, self.accuracy.over)?;
        check_band("coverage", self.coverage.low, self.coverage.high)?;
        check_band("seasonality", self.seasonality.low, self.seasonality.peak)?;

        if self.profitability.medium > self.profitability.high {
            return Err(PlanningError::InvalidThreshold {
                name: "profitability".to_string(),
                details: format!(
                    "medium band {} is above high band {}",
                    self.profitability.medium, self.profitability.high
                ),
            });
        }

        if self.deviation_threshold < 0.0 || !self.deviation_threshold.is_finite() {
            return Err(PlanningError::InvalidThreshold {
                name: "deviation_threshold".to_string(),
                details: format!("{} must be a non-negative number", self.deviation_threshold),
            });
        }

        self.cache_ttl()?;

        if self.trailing_months == 0 {
            return Err(PlanningError::InvalidWindow {
                name: "trailing_months".to_string(),
                value: self.trailing_months,
            });
        }

        if self.recent_months == 0 {
            return Err(PlanningError::InvalidWindow {
                name: "recent_months".to_string(),
                value: self.recent_months,
            });
        }

        Ok(())
    }

    /// Snapshot time-to-live as a chrono duration.
    pub fn cache_ttl(&self) -> Result<Duration> {
        if self.cache_ttl_seconds < 0 {
            return Err(PlanningError::InvalidThreshold {
                name: "cache_ttl_seconds".to_string(),
                details: format!("{} must not be negative", self.cache_ttl_seconds),
            });
        }
        Duration::try_seconds(self.cache_ttl_seconds).ok_or_else(|| {
            PlanningError::InvalidThreshold {
                name: "cache_ttl_seconds".to_string(),
                details: format!("{} is out of range", self.cache_ttl_seconds),
            }
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlanningConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PlanningConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

fn check_band(name: &str, lower: f64, upper: f64) -> Result<()> {
    if !lower.is_finite() || !upper.is_finite() || lower < 0.0 {
        return Err(PlanningError::InvalidThreshold {
            name: name.to_string(),
            details: format!("bounds ({}, {}) must be finite and non-negative", lower, upper),
        });
    }
    if lower > upper {
        return Err(PlanningError::InvalidThreshold {
            name: name.to_string(),
            details: format!("lower bound {} is above upper bound {}", lower, upper),
        });
    }
    Ok(())
}

fn default_under() -> f64 {
    80.0
}
fn default_over() -> f64 {
    120.0
}
fn default_low_cover() -> f64 {
    0.8
}
fn default_high_cover() -> f64 {
    1.5
}
fn default_high_margin() -> f64 {
    40.0
}
fn default_medium_margin() -> f64 {
    20.0
}
fn default_peak_index() -> f64 {
    1.2
}
fn default_low_index() -> f64 {
    0.9
}
fn default_trailing_months() -> usize {
    3
}
fn default_recent_months() -> usize {
    3
}
fn default_deviation_threshold() -> f64 {
    30.0
}
fn default_cache_ttl_seconds() -> i64 {
    300
}

/// Catalog lifecycle status. Anything other than active/inactive is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductStatus {
    Active,
    Inactive,
    Other(String),
}

impl ProductStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ProductStatus::Active)
    }
}

impl From<&str> for ProductStatus {
    fn from(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("active") {
            ProductStatus::Active
        } else if trimmed.eq_ignore_ascii_case("inactive") {
            ProductStatus::Inactive
        } else {
            ProductStatus::Other(trimmed.to_string())
        }
    }
}

impl From<String> for ProductStatus {
    fn from(raw: String) -> Self {
        ProductStatus::from(raw.as_str())
    }
}

impl From<ProductStatus> for String {
    fn from(status: ProductStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductStatus::Active => write!(f, "Active"),
            ProductStatus::Inactive => write!(f, "Inactive"),
            ProductStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// One catalog row. Price fields are `None` when the catalog sheet has no such column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku_id: String,
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub tier: Option<String>,
    pub status: ProductStatus,
    pub floor_price: Option<f64>,
    pub net_order_price: Option<f64>,
}

/// Long-format row shared by Sales, Forecast and PurchaseOrder sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub sku_id: String,
    pub month: NaiveDate,
    pub quantity: f64,
}

impl TransactionRecord {
    pub fn new(sku_id: impl Into<String>, month: NaiveDate, quantity: f64) -> Self {
        Self {
            sku_id: sku_id.into(),
            month,
            quantity,
        }
    }
}

/// Stock on hand. Source sheets may hold several batch rows per SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub sku_id: String,
    pub stock_qty: f64,
}

impl StockRecord {
    pub fn new(sku_id: impl Into<String>, stock_qty: f64) -> Self {
        Self {
            sku_id: sku_id.into(),
            stock_qty,
        }
    }
}

pub trait SkuKeyed {
    fn sku_id(&self) -> &str;
}

impl SkuKeyed for TransactionRecord {
    fn sku_id(&self) -> &str {
        &self.sku_id
    }
}

impl SkuKeyed for StockRecord {
    fn sku_id(&self) -> &str {
        &self.sku_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccuracyStatus {
    Under,
    Accurate,
    Over,
    #[serde(rename = "No Forecast")]
    NoForecast,
}

impl AccuracyStatus {
    pub const ALL: [AccuracyStatus; 4] = [
        AccuracyStatus::Under,
        AccuracyStatus::Accurate,
        AccuracyStatus::Over,
        AccuracyStatus::NoForecast,
    ];
}

impl fmt::Display for AccuracyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccuracyStatus::Under => "Under",
            AccuracyStatus::Accurate => "Accurate",
            AccuracyStatus::Over => "Over",
            AccuracyStatus::NoForecast => "No Forecast",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InventoryStatus {
    #[serde(rename = "Need Replenishment")]
    NeedReplenishment,
    Ideal,
    #[serde(rename = "High Stock")]
    HighStock,
    Unknown,
}

impl fmt::Display for InventoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InventoryStatus::NeedReplenishment => "Need Replenishment",
            InventoryStatus::Ideal => "Ideal",
            InventoryStatus::HighStock => "High Stock",
            InventoryStatus::Unknown => "Unknown",
        };
        write!(f, "{}", label)
    }
}
