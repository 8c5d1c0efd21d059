use crate::ingestion::{Loaded, RawTable, SKU_COLUMN};
use crate::schema::{Product, ProductStatus, SkuKeyed};
use crate::utils::coerce_quantity;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const PRODUCT_NAME_COLUMN: &str = "Product_Name";
pub const BRAND_COLUMN: &str = "Brand";
pub const TIER_COLUMNS: [&str; 2] = ["SKU_Tier", "Tier"];
pub const STATUS_COLUMN: &str = "Status";
pub const FLOOR_PRICE_COLUMN: &str = "Floor_Price";
pub const NET_ORDER_PRICE_COLUMN: &str = "Net_Order_Price";

/// Catalog attributes attached to a SKU-keyed row. Every field is `None` when
/// the SKU is not in the catalog (left join semantics).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductInfo {
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub tier: Option<String>,
    pub status: Option<ProductStatus>,
    pub floor_price: Option<f64>,
    pub net_order_price: Option<f64>,
}

impl From<&Product> for ProductInfo {
    fn from(product: &Product) -> Self {
        Self {
            product_name: product.product_name.clone(),
            brand: product.brand.clone(),
            tier: product.tier.clone(),
            status: Some(product.status.clone()),
            floor_price: product.floor_price,
            net_order_price: product.net_order_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enriched<T> {
    pub row: T,
    pub info: ProductInfo,
}

/// The product master, de-duplicated on `sku_id`. This is the authoritative
/// source for descriptive attributes and the Active filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductCatalog {
    products: BTreeMap<String, Product>,
    has_prices: bool,
    duplicates_dropped: usize,
}

impl ProductCatalog {
    /// Builds a catalog keeping the first row seen for each SKU.
    pub fn from_products(products: Vec<Product>) -> Self {
        let has_prices = products
            .iter()
            .any(|p| p.floor_price.is_some() && p.net_order_price.is_some());

        let mut map = BTreeMap::new();
        let mut duplicates_dropped = 0;
        for product in products {
            if map.contains_key(&product.sku_id) {
                duplicates_dropped += 1;
                continue;
            }
            map.insert(product.sku_id.clone(), product);
        }

        if duplicates_dropped > 0 {
            debug!(
                "Dropped {} duplicate SKU rows from product catalog",
                duplicates_dropped
            );
        }

        Self {
            products: map,
            has_prices,
            duplicates_dropped,
        }
    }

    pub fn from_table(table: &RawTable) -> Loaded<Self> {
        let sku_idx = match table.column_index(SKU_COLUMN) {
            Some(idx) => idx,
            None => {
                return Loaded::degraded(
                    Self::default(),
                    format!(
                        "Sheet '{}' has no {} column; product catalog unavailable",
                        table.name, SKU_COLUMN
                    ),
                )
            }
        };

        let name_idx = table.column_index(PRODUCT_NAME_COLUMN);
        let brand_idx = table.column_index(BRAND_COLUMN);
        let tier_idx = table.first_column_index(&TIER_COLUMNS);
        let status_idx = table.column_index(STATUS_COLUMN);
        let floor_idx = table.column_index(FLOOR_PRICE_COLUMN);
        let net_idx = table.column_index(NET_ORDER_PRICE_COLUMN);

        let text = |row: &[String], idx: Option<usize>| -> Option<String> {
            idx.map(|i| table.cell(row, i).trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let products: Vec<Product> = table
            .rows
            .iter()
            .filter(|row| !table.cell(row, sku_idx).trim().is_empty())
            .map(|row| Product {
                sku_id: table.cell(row, sku_idx).trim().to_string(),
                product_name: text(row, name_idx),
                brand: text(row, brand_idx),
                tier: text(row, tier_idx),
                status: match status_idx {
                    Some(i) => ProductStatus::from(table.cell(row, i)),
                    None => ProductStatus::Active,
                },
                floor_price: floor_idx.map(|i| coerce_quantity(table.cell(row, i))),
                net_order_price: net_idx.map(|i| coerce_quantity(table.cell(row, i))),
            })
            .collect();

        let catalog = Self::from_products(products);

        if floor_idx.is_none() || net_idx.is_none() {
            return Loaded::degraded(
                catalog,
                format!(
                    "Sheet '{}' lacks {} or {}; financial views unavailable",
                    table.name, FLOOR_PRICE_COLUMN, NET_ORDER_PRICE_COLUMN
                ),
            );
        }

        Loaded::clean(catalog)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn has_prices(&self) -> bool {
        self.has_prices
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    pub fn get(&self, sku_id: &str) -> Option<&Product> {
        self.products.get(sku_id)
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    /// True only for SKUs present in the catalog with Active status.
    pub fn is_active(&self, sku_id: &str) -> bool {
        self.products
            .get(sku_id)
            .map(|p| p.status.is_active())
            .unwrap_or(false)
    }

    pub fn active_skus(&self) -> BTreeSet<&str> {
        self.products
            .values()
            .filter(|p| p.status.is_active())
            .map(|p| p.sku_id.as_str())
            .collect()
    }

    pub fn info(&self, sku_id: &str) -> ProductInfo {
        self.products
            .get(sku_id)
            .map(ProductInfo::from)
            .unwrap_or_default()
    }

    /// Left-joins catalog attributes onto each row. Exactly one output per input row.
    pub fn enrich<T: SkuKeyed + Clone>(&self, rows: &[T]) -> Vec<Enriched<T>> {
        rows.iter()
            .map(|row| Enriched {
                row: row.clone(),
                info: self.info(row.sku_id()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TransactionRecord;
    use chrono::NaiveDate;

    const PRODUCTS: &str = "\
SKU ID,Product Name,Brand,SKU Tier,Status,Floor Price,Net Order Price
A1,Alpha,X,T1,Active,100,60
A1,Alpha Duplicate,Z,T9,Inactive,1,1
B2,Beta,Y,T2,inactive,50,
C3,Gamma,Y,T1,ACTIVE,abc,20
";

    fn catalog() -> ProductCatalog {
        ProductCatalog::from_table(&RawTable::from_csv_str("Product_Master", PRODUCTS).unwrap())
            .value
    }

    #[test]
    fn test_duplicates_keep_first_row() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.duplicates_dropped(), 1);
        let a1 = catalog.get("A1").unwrap();
        assert_eq!(a1.product_name.as_deref(), Some("Alpha"));
        assert_eq!(a1.brand.as_deref(), Some("X"));
    }

    #[test]
    fn test_active_subset_is_case_insensitive() {
        let catalog = catalog();
        assert!(catalog.is_active("A1"));
        assert!(!catalog.is_active("B2"));
        assert!(catalog.is_active("C3"));
        assert!(!catalog.is_active("missing"));
        assert_eq!(catalog.active_skus().len(), 2);
    }

    #[test]
    fn test_missing_status_column_means_active() {
        let table = RawTable::from_csv_str("Product_Master", "SKU_ID,Brand\nA1,X\nB2,Y\n").unwrap();
        let loaded = ProductCatalog::from_table(&table);
        assert!(loaded.value.is_active("A1"));
        assert!(loaded.value.is_active("B2"));
        assert!(!loaded.value.has_prices());
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_unparsable_prices_default_to_zero() {
        let catalog = catalog();
        assert!(catalog.has_prices());
        assert_eq!(catalog.get("B2").unwrap().net_order_price, Some(0.0));
        assert_eq!(catalog.get("C3").unwrap().floor_price, Some(0.0));
        assert_eq!(catalog.get("C3").unwrap().net_order_price, Some(20.0));
    }

    #[test]
    fn test_enrich_does_not_fan_out() {
        let catalog = catalog();
        let month = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let rows = vec![
            TransactionRecord::new("A1", month, 10.0),
            TransactionRecord::new("C3", month, 5.0),
            TransactionRecord::new("unknown", month, 1.0),
        ];

        let enriched = catalog.enrich(&rows);
        assert_eq!(enriched.len(), rows.len());
        assert_eq!(enriched[0].info.brand.as_deref(), Some("X"));
        assert_eq!(enriched[0].info.tier.as_deref(), Some("T1"));
        assert_eq!(enriched[2].info, ProductInfo::default());
    }

    #[test]
    fn test_missing_sku_column_yields_empty_catalog() {
        let table = RawTable::from_csv_str("Product_Master", "Code,Brand\nA1,X\n").unwrap();
        let loaded = ProductCatalog::from_table(&table);
        assert!(loaded.value.is_empty());
        assert_eq!(loaded.warnings.len(), 1);
    }
}
