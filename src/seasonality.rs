use crate::financial::FinancialRecord;
use crate::schema::SeasonBands;
use crate::utils::mean;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeasonType {
    #[serde(rename = "Peak Season")]
    Peak,
    #[serde(rename = "Normal Season")]
    Normal,
    #[serde(rename = "Low Season")]
    Low,
}

impl SeasonType {
    /// An undefined index (all-zero revenue) reads as Normal.
    pub fn classify(index: Option<f64>, bands: &SeasonBands) -> Self {
        match index {
            Some(i) if i >= bands.peak => SeasonType::Peak,
            Some(i) if i < bands.low => SeasonType::Low,
            _ => SeasonType::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalMonth {
    /// Calendar month, 1 = January.
    pub month_num: u32,
    pub month_name: String,
    pub avg_revenue: f64,
    pub avg_gross_margin: f64,
    pub avg_sales_qty: f64,
    pub seasonal_index_revenue: Option<f64>,
    pub seasonal_index_margin: Option<f64>,
    pub season_type: SeasonType,
}

fn index_of(value: f64, overall: f64) -> Option<f64> {
    if overall == 0.0 {
        None
    } else {
        Some(value / overall)
    }
}

/// Averages financial rows per calendar month across years and indexes each
/// month against the mean of the monthly averages. Ordered January first.
pub fn seasonality(financial: &[FinancialRecord], bands: &SeasonBands) -> Vec<SeasonalMonth> {
    let mut by_calendar_month: BTreeMap<u32, (String, Vec<&FinancialRecord>)> = BTreeMap::new();
    for record in financial {
        by_calendar_month
            .entry(record.month.month())
            .or_insert_with(|| (record.month.format("%b").to_string(), Vec::new()))
            .1
            .push(record);
    }

    let averages: Vec<(u32, String, f64, f64, f64)> = by_calendar_month
        .into_iter()
        .map(|(month_num, (name, rows))| {
            let avg = |f: fn(&FinancialRecord) -> f64| {
                mean(&rows.iter().map(|r| f(r)).collect::<Vec<_>>()).unwrap_or(0.0)
            };
            (
                month_num,
                name,
                avg(|r| r.revenue),
                avg(|r| r.gross_margin),
                avg(|r| r.sales_qty),
            )
        })
        .collect();

    let overall_revenue = mean(&averages.iter().map(|a| a.2).collect::<Vec<_>>()).unwrap_or(0.0);
    let overall_margin = mean(&averages.iter().map(|a| a.3).collect::<Vec<_>>()).unwrap_or(0.0);

    averages
        .into_iter()
        .map(|(month_num, month_name, revenue, margin, qty)| {
            let revenue_index = index_of(revenue, overall_revenue);
            SeasonalMonth {
                month_num,
                month_name,
                avg_revenue: revenue,
                avg_gross_margin: margin,
                avg_sales_qty: qty,
                seasonal_index_revenue: revenue_index,
                seasonal_index_margin: index_of(margin, overall_margin),
                season_type: SeasonType::classify(revenue_index, bands),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductCatalog;
    use crate::financial::financial_metrics;
    use crate::ingestion::RawTable;
    use crate::schema::TransactionRecord;
    use chrono::NaiveDate;

    fn financial(rows: &[(i32, u32, f64)]) -> Vec<FinancialRecord> {
        let catalog = ProductCatalog::from_table(
            &RawTable::from_csv_str(
                "Product_Master",
                "SKU_ID,Status,Floor_Price,Net_Order_Price\nA1,Active,10,6\n",
            )
            .unwrap(),
        )
        .value;
        let sales: Vec<TransactionRecord> = rows
            .iter()
            .map(|(y, m, q)| TransactionRecord::new("A1", NaiveDate::from_ymd_opt(*y, *m, 1).unwrap(), *q))
            .collect();
        financial_metrics(&sales, &catalog)
    }

    #[test]
    fn test_months_are_averaged_across_years() {
        let rows = financial(&[(2023, 12, 30.0), (2024, 12, 50.0), (2024, 6, 10.0), (2025, 1, 20.0)]);
        let pattern = seasonality(&rows, &SeasonBands::default());

        let months: Vec<u32> = pattern.iter().map(|p| p.month_num).collect();
        assert_eq!(months, vec![1, 6, 12]);

        let december = &pattern[2];
        assert_eq!(december.month_name, "Dec");
        assert_eq!(december.avg_sales_qty, 40.0);
        assert_eq!(december.avg_revenue, 400.0);
    }

    #[test]
    fn test_season_classification() {
        // revenue averages 250, 100, 400 -> overall 250
        let rows = financial(&[(2025, 1, 25.0), (2025, 6, 10.0), (2025, 12, 40.0)]);
        let pattern = seasonality(&rows, &SeasonBands::default());

        assert_eq!(pattern[0].season_type, SeasonType::Normal);
        assert_eq!(pattern[1].season_type, SeasonType::Low);
        assert_eq!(pattern[2].season_type, SeasonType::Peak);
        let index = pattern[2].seasonal_index_revenue.unwrap();
        assert!((index - 1.6).abs() < 1e-9);
    }

    #[test]
    fn test_zero_revenue_is_normal_season() {
        let rows = financial(&[(2025, 1, 0.0), (2025, 2, 0.0)]);
        let pattern = seasonality(&rows, &SeasonBands::default());
        assert!(pattern.iter().all(|p| p.seasonal_index_revenue.is_none()));
        assert!(pattern.iter().all(|p| p.season_type == SeasonType::Normal));
    }
}
