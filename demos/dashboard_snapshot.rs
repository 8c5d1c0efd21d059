use demand_planning_engine::export::{monthly_summary_rows, to_csv};
use demand_planning_engine::*;
use std::fs::File;
use std::path::{Path, PathBuf};

const SAMPLE_PRODUCT: &str = "\
SKU_ID,Product_Name,Brand,SKU_Tier,Status,Floor_Price,Net_Order_Price
A1,Alpha Serum,X,T1,Active,120,70
A2,Alpha Toner,X,T2,Active,80,50
B1,Beta Cream,Y,T1,Active,150,60
";

const SAMPLE_SALES: &str = "\
SKU_ID,Nov-24,Dec-24,Jan-25
A1,40,20,30
A2,50,60,65
B1,5,0,10
";

const SAMPLE_ROFO: &str = "\
SKU_ID,Dec-24,Jan-25,Feb-25
A1,25,100,100
A2,60,60,70
B1,10,0,12
";

const SAMPLE_PO: &str = "\
SKU_ID,Dec-24,Jan-25
A1,20,90
A2,30,75
B1,10,8
";

const SAMPLE_STOCK: &str = "\
SKU_ID,Batch,Stock_Qty
A1,B-01,20
A1,B-02,30
A2,B-01,10
B1,B-01,200
";

fn sample_tables() -> Result<SourceTables> {
    Ok(SourceTables {
        product: RawTable::from_csv_str("Product_Master", SAMPLE_PRODUCT)?,
        sales: RawTable::from_csv_str("Sales", SAMPLE_SALES)?,
        forecast: RawTable::from_csv_str("Rofo", SAMPLE_ROFO)?,
        purchase_orders: RawTable::from_csv_str("PO", SAMPLE_PO)?,
        stock: RawTable::from_csv_str("Stock_Onhand", SAMPLE_STOCK)?,
    })
}

fn read_sheet(dir: &Path, name: &str) -> Result<RawTable> {
    let path = dir.join(format!("{}.csv", name));
    let file = File::open(&path).map_err(|e| {
        PlanningError::SourceUnavailable(format!("{}: {}", path.display(), e))
    })?;
    RawTable::from_csv_reader(name, file)
}

fn load_directory(dir: &Path) -> Result<SourceTables> {
    Ok(SourceTables {
        product: read_sheet(dir, "Product_Master")?,
        sales: read_sheet(dir, "Sales")?,
        forecast: read_sheet(dir, "Rofo")?,
        purchase_orders: read_sheet(dir, "PO")?,
        stock: read_sheet(dir, "Stock_Onhand")?,
    })
}

fn main() -> anyhow::Result<()> {
    let source_dir: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);

    let mut planner = DemandPlanner::new(PlanningConfig::default())?;
    let snapshot = planner.refresh_with(|| match &source_dir {
        Some(dir) => load_directory(dir),
        None => sample_tables(),
    })?;

    println!("📦 Active SKUs: {}", snapshot.active_skus);
    for warning in &snapshot.warnings {
        println!("⚠️  {}", warning);
    }

    println!("\n📈 Forecast accuracy by month");
    for (month, perf) in &snapshot.recent_performance {
        println!(
            "  {}  accuracy {:>6.1}%  under {:>3}  accurate {:>3}  over {:>3}  no forecast {:>3}",
            month.format("%b %Y"),
            perf.accuracy,
            perf.count(AccuracyStatus::Under),
            perf.count(AccuracyStatus::Accurate),
            perf.count(AccuracyStatus::Over),
            perf.count(AccuracyStatus::NoForecast)
        );
    }

    println!("\n🏷️  Inventory coverage");
    println!(
        "  {} SKUs, total stock {:.0}, health score {:.1}%",
        snapshot.inventory.total_skus,
        snapshot.inventory.total_stock,
        snapshot.inventory.inventory_health_score
    );
    if let Some(avg_cover) = snapshot.inventory.avg_cover {
        println!("  average cover {:.2} months", avg_cover);
    }
    for record in &snapshot.inventory.low_stock {
        println!(
            "  ⬆ {} needs {:.0} units (cover {:.2})",
            record.sku_id, record.qty_to_order, record.cover_months
        );
    }

    if let Some(deviation) = &snapshot.sales_vs_forecast {
        println!(
            "\n🔍 Sales vs forecast for {}: {} SKUs compared, {} above threshold",
            deviation.reference_month.format("%b %Y"),
            deviation.total_skus_compared(),
            deviation.high_deviation.len()
        );
    }

    println!("\n--- monthly_performance.csv ---");
    print!("{}", to_csv(&monthly_summary_rows(&snapshot.monthly_performance))?);

    println!("\n--- inventory_coverage.csv ---");
    print!("{}", to_csv(&snapshot.inventory.records)?);

    println!("\n--- brand_performance.csv ---");
    print!("{}", to_csv(&snapshot.brand_performance)?);

    Ok(())
}
