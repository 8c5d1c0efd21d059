use crate::catalog::{
    ProductCatalog, BRAND_COLUMN, FLOOR_PRICE_COLUMN, NET_ORDER_PRICE_COLUMN, PRODUCT_NAME_COLUMN,
    STATUS_COLUMN,
};
use crate::ingestion::{RawTable, SKU_COLUMN};
use crate::schema::TransactionRecord;
use crate::utils::{coerce_quantity, headers_match, is_month_header, parse_month_label_at};
use chrono::{NaiveDate, Utc};
use log::{debug, warn};

/// Identifier and descriptive columns that are never months, even when their
/// names contain a month token ("Remarks" contains "MAR").
pub const DESCRIPTIVE_COLUMNS: [&str; 10] = [
    SKU_COLUMN,
    "SKU_Name",
    PRODUCT_NAME_COLUMN,
    BRAND_COLUMN,
    "SKU_Tier",
    "Tier",
    STATUS_COLUMN,
    FLOOR_PRICE_COLUMN,
    NET_ORDER_PRICE_COLUMN,
    "Remarks",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReshapeOutcome {
    pub records: Vec<TransactionRecord>,
    /// Headers detected as months, in sheet order.
    pub month_columns: Vec<String>,
    pub warning: Option<String>,
}

impl ReshapeOutcome {
    fn unavailable(warning: String) -> Self {
        warn!("{}", warning);
        Self {
            records: Vec::new(),
            month_columns: Vec::new(),
            warning: Some(warning),
        }
    }
}

pub fn month_columns(table: &RawTable) -> Vec<(usize, &str)> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            !DESCRIPTIVE_COLUMNS
                .iter()
                .any(|descriptive| headers_match(header, descriptive))
        })
        .filter(|(_, header)| is_month_header(header))
        .map(|(idx, header)| (idx, header.as_str()))
        .collect()
}

/// Unpivots a one-row-per-SKU sheet with month columns into one record per
/// (SKU, month). Only SKUs that are Active in the catalog are kept.
pub fn reshape_wide_to_long(table: &RawTable, catalog: &ProductCatalog) -> ReshapeOutcome {
    reshape_wide_to_long_at(table, catalog, Utc::now().date_naive())
}

/// Same as [`reshape_wide_to_long`], resolving unparsable month headers against `today`.
pub fn reshape_wide_to_long_at(
    table: &RawTable,
    catalog: &ProductCatalog,
    today: NaiveDate,
) -> ReshapeOutcome {
    let sku_idx = match table.column_index(SKU_COLUMN) {
        Some(idx) => idx,
        None => {
            return ReshapeOutcome::unavailable(format!(
                "Sheet '{}' has no {} column; skipping",
                table.name, SKU_COLUMN
            ))
        }
    };

    let columns = month_columns(table);
    if columns.is_empty() {
        return ReshapeOutcome::unavailable(format!(
            "Sheet '{}' has no month columns; skipping",
            table.name
        ));
    }

    let parsed: Vec<(usize, NaiveDate)> = columns
        .iter()
        .map(|(idx, header)| (*idx, parse_month_label_at(header, today)))
        .collect();

    debug!(
        "Sheet '{}': {} month columns ({:?} .. {:?})",
        table.name,
        parsed.len(),
        parsed.iter().map(|(_, m)| *m).min(),
        parsed.iter().map(|(_, m)| *m).max()
    );

    let mut records = Vec::with_capacity(parsed.len() * table.rows.len());
    for (col_idx, month) in &parsed {
        for row in &table.rows {
            let sku_id = table.cell(row, sku_idx).trim();
            if !catalog.is_active(sku_id) {
                continue;
            }
            records.push(TransactionRecord::new(
                sku_id,
                *month,
                coerce_quantity(table.cell(row, *col_idx)),
            ));
        }
    }

    records.sort_by_key(|r| r.month);

    ReshapeOutcome {
        records,
        month_columns: columns.iter().map(|(_, h)| h.to_string()).collect(),
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS: &str = "\
SKU_ID,Brand,Status
A1,X,Active
A2,X,Active
B1,Y,Inactive
";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::from_table(&RawTable::from_csv_str("Product_Master", PRODUCTS).unwrap())
            .value
    }

    #[test]
    fn test_reshape_produces_one_row_per_sku_month() {
        let sales = RawTable::from_csv_str(
            "Sales",
            "SKU_ID,Product_Name,Nov-24,Dec-24,Jan-25\nA1,Alpha,40,20,30\nA2,Alpha Two,1,,x\n",
        )
        .unwrap();

        let outcome = reshape_wide_to_long_at(&sales, &catalog(), today());
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.month_columns, vec!["Nov-24", "Dec-24", "Jan-25"]);
        assert_eq!(outcome.records.len(), 6);

        let total: f64 = outcome.records.iter().map(|r| r.quantity).sum();
        assert_eq!(total, 91.0);

        let first = &outcome.records[0];
        assert_eq!(first.month, NaiveDate::from_ymd_opt(2024, 11, 1).unwrap());
        assert_eq!(first.sku_id, "A1");
    }

    #[test]
    fn test_inactive_and_unknown_skus_are_dropped() {
        let forecast = RawTable::from_csv_str(
            "Rofo",
            "SKU_ID,Jan-25\nA1,10\nB1,10\nZZ,10\n",
        )
        .unwrap();

        let outcome = reshape_wide_to_long_at(&forecast, &catalog(), today());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].sku_id, "A1");
    }

    #[test]
    fn test_descriptive_columns_are_not_months() {
        let table = RawTable::from_csv_str(
            "PO",
            "SKU_ID,Status,Remarks,Margin,Feb 2025\nA1,Active,late,5,7\n",
        )
        .unwrap();

        let columns: Vec<&str> = month_columns(&table).into_iter().map(|(_, h)| h).collect();
        // "Margin" still matches MAR; only catalog descriptors are excluded
        assert_eq!(columns, vec!["Margin", "Feb_2025"]);
    }

    #[test]
    fn test_missing_sku_or_months_returns_empty() {
        let no_sku = RawTable::from_csv_str("Sales", "Code,Jan-25\nA1,1\n").unwrap();
        let outcome = reshape_wide_to_long_at(&no_sku, &catalog(), today());
        assert!(outcome.records.is_empty());
        assert!(outcome.warning.is_some());

        let no_months = RawTable::from_csv_str("Sales", "SKU_ID,Brand\nA1,X\n").unwrap();
        let outcome = reshape_wide_to_long_at(&no_months, &catalog(), today());
        assert!(outcome.records.is_empty());
        assert!(outcome.warning.is_some());
    }

    #[test]
    fn test_underscore_headers_parse_like_hyphenated() {
        let table = RawTable::from_csv_str("Sales", "SKU_ID,jan_25,Feb 25\nA1,3,4\n").unwrap();
        let outcome = reshape_wide_to_long_at(&table, &catalog(), today());
        let months: Vec<NaiveDate> = outcome.records.iter().map(|r| r.month).collect();
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            ]
        );
    }
}
