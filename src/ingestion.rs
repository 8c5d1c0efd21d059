use crate::catalog::ProductCatalog;
use crate::error::{PlanningError, Result};
use crate::schema::StockRecord;
use crate::utils::{coerce_quantity, headers_match, normalize_header};
use log::{debug, warn};
use std::io::Read;

pub const SKU_COLUMN: &str = "SKU_ID";

/// Stock quantity columns seen across stock-on-hand sheets, in priority order.
pub const STOCK_QTY_COLUMNS: [&str; 3] = ["Quantity_Available", "Stock_Qty", "STOCK_SAP"];

/// A flat sheet as delivered by the data source: headers plus string cells.
/// Headers are normalized on construction (see [`normalize_header`]).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new<I, S>(name: &str, headers: I, rows: Vec<Vec<String>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.to_string(),
            headers: headers
                .into_iter()
                .map(|h| normalize_header(h.as_ref()))
                .collect(),
            rows,
        }
    }

    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            headers: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn from_csv_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        debug!(
            "Loaded sheet '{}' with {} columns and {} rows",
            name,
            headers.len(),
            rows.len()
        );

        Ok(Self::new(name, headers, rows))
    }

    pub fn from_csv_str(name: &str, data: &str) -> Result<Self> {
        Self::from_csv_reader(name, data.as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| headers_match(h, name))
    }

    /// Index of the first column present among `names`.
    pub fn first_column_index(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| self.column_index(name))
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| PlanningError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    /// Cell text, or "" when the row is shorter than the header.
    pub fn cell<'a>(&self, row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// The five sheets consumed by one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTables {
    pub product: RawTable,
    pub sales: RawTable,
    pub forecast: RawTable,
    pub purchase_orders: RawTable,
    pub stock: RawTable,
}

impl Default for SourceTables {
    fn default() -> Self {
        Self {
            product: RawTable::empty("Product_Master"),
            sales: RawTable::empty("Sales"),
            forecast: RawTable::empty("Rofo"),
            purchase_orders: RawTable::empty("PO"),
            stock: RawTable::empty("Stock_Onhand"),
        }
    }
}

impl SourceTables {
    pub fn all(&self) -> [&RawTable; 5] {
        [
            &self.product,
            &self.sales,
            &self.forecast,
            &self.purchase_orders,
            &self.stock,
        ]
    }
}

/// A loaded value plus the degradations hit while loading it.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Loaded<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn degraded(value: T, warning: String) -> Self {
        warn!("{}", warning);
        Self {
            value,
            warnings: vec![warning],
        }
    }
}

/// Reads batch-level stock rows for Active SKUs. Rows are not aggregated here;
/// the coverage engine sums them per SKU.
pub fn load_stock(table: &RawTable, catalog: &ProductCatalog) -> Loaded<Vec<StockRecord>> {
    let sku_idx = match table.column_index(SKU_COLUMN) {
        Some(idx) => idx,
        None => {
            return Loaded::degraded(
                Vec::new(),
                format!("Sheet '{}' has no {} column; stock unavailable", table.name, SKU_COLUMN),
            )
        }
    };

    let qty_idx = match table.first_column_index(&STOCK_QTY_COLUMNS) {
        Some(idx) => idx,
        None => {
            return Loaded::degraded(
                Vec::new(),
                format!(
                    "Sheet '{}' has none of the stock columns {:?}; stock unavailable",
                    table.name, STOCK_QTY_COLUMNS
                ),
            )
        }
    };

    let records: Vec<StockRecord> = table
        .rows
        .iter()
        .map(|row| {
            StockRecord::new(
                table.cell(row, sku_idx).trim(),
                coerce_quantity(table.cell(row, qty_idx)),
            )
        })
        .filter(|record| catalog.is_active(&record.sku_id))
        .collect();

    debug!(
        "Stock sheet '{}': {} of {} rows kept for active SKUs",
        table.name,
        records.len(),
        table.rows.len()
    );

    Loaded::clean(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCTS: &str = "\
SKU_ID,Product_Name,Brand,SKU_Tier,Status
A1,Alpha,X,T1,Active
B2,Beta,Y,T2,Inactive
";

    #[test]
    fn test_csv_headers_are_normalized() {
        let table = RawTable::from_csv_str("Stock", " SKU ID ,Stock Qty\nA1,5\n").unwrap();
        assert_eq!(table.headers, vec!["SKU_ID", "Stock_Qty"]);
        assert_eq!(table.column_index("sku_id"), Some(0));
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_require_column_reports_table() {
        let table = RawTable::from_csv_str("Sales", "Name\nfoo\n").unwrap();
        match table.require_column(SKU_COLUMN) {
            Err(PlanningError::MissingColumn { table, column }) => {
                assert_eq!(table, "Sales");
                assert_eq!(column, "SKU_ID");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_short_rows_read_as_blank() {
        let table = RawTable::from_csv_str("Stock", "SKU_ID,Stock_Qty\nA1\n").unwrap();
        let row = &table.rows[0];
        assert_eq!(table.cell(row, 1), "");
    }

    #[test]
    fn test_load_stock_keeps_batches_for_active_skus() {
        let catalog = ProductCatalog::from_table(
            &RawTable::from_csv_str("Product_Master", PRODUCTS).unwrap(),
        )
        .value;
        let stock = RawTable::from_csv_str(
            "Stock_Onhand",
            "SKU_ID,Batch,Quantity Available\nA1,b1,20\nA1,b2,30\nB2,b1,99\nZZ,b1,5\n",
        )
        .unwrap();

        let loaded = load_stock(&stock, &catalog);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.value.len(), 2);
        let total: f64 = loaded.value.iter().map(|r| r.stock_qty).sum();
        assert_eq!(total, 50.0);
    }

    #[test]
    fn test_load_stock_without_quantity_column_degrades() {
        let catalog = ProductCatalog::from_table(
            &RawTable::from_csv_str("Product_Master", PRODUCTS).unwrap(),
        )
        .value;
        let stock = RawTable::from_csv_str("Stock_Onhand", "SKU_ID,Warehouse\nA1,W1\n").unwrap();

        let loaded = load_stock(&stock, &catalog);
        assert!(loaded.value.is_empty());
        assert_eq!(loaded.warnings.len(), 1);
    }
}
