use crate::ingestion::RawTable;
use crate::reshape::month_columns;
use crate::utils::parse_month_label_at;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Basic health figures for one source sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityReport {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    pub empty_cells: usize,
    pub empty_percentage: f64,
    pub duplicate_rows: usize,
    pub numeric_cells: usize,
    pub zero_cells: usize,
    pub zero_percentage: f64,
    pub negative_cells: usize,
    pub first_month: Option<NaiveDate>,
    pub last_month: Option<NaiveDate>,
}

impl DataQualityReport {
    pub fn for_table(table: &RawTable) -> Self {
        Self::for_table_at(table, Utc::now().date_naive())
    }

    /// `today` resolves month headers without a year, matching the reshaper.
    pub fn for_table_at(table: &RawTable, today: NaiveDate) -> Self {
        let columns = table.headers.len();
        let total_cells = table.rows.len() * columns;

        let mut empty_cells = 0;
        let mut numeric_cells = 0;
        let mut zero_cells = 0;
        let mut negative_cells = 0;
        for row in &table.rows {
            for idx in 0..columns {
                let cell = table.cell(row, idx).trim();
                if cell.is_empty() {
                    empty_cells += 1;
                    continue;
                }
                if let Ok(value) = cell.parse::<f64>() {
                    numeric_cells += 1;
                    if value == 0.0 {
                        zero_cells += 1;
                    } else if value < 0.0 {
                        negative_cells += 1;
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        let duplicate_rows = table.rows.iter().filter(|row| !seen.insert(*row)).count();

        let months: Vec<NaiveDate> = month_columns(table)
            .into_iter()
            .map(|(_, header)| parse_month_label_at(header, today))
            .collect();

        Self {
            table: table.name.clone(),
            rows: table.rows.len(),
            columns,
            empty_cells,
            empty_percentage: ratio(empty_cells, total_cells),
            duplicate_rows,
            numeric_cells,
            zero_cells,
            zero_percentage: ratio(zero_cells, numeric_cells),
            negative_cells,
            first_month: months.iter().min().copied(),
            last_month: months.iter().max().copied(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn has_issues(&self) -> bool {
        self.empty_cells > 0 || self.duplicate_rows > 0 || self.negative_cells > 0
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
