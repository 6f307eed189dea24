//! # Demo Data Seeder
//!
//! Populates a back office database with a small demo chain.
//!
//! ## Usage
//! ```bash
//! # Seed the configured database (backoffice.toml / MERIDIAN_DB_PATH)
//! cargo run -p meridian-ops --bin seed
//!
//! # Seed a specific file
//! cargo run -p meridian-ops --bin seed -- --db ./data/meridian.db
//! ```
//!
//! ## Generated Data
//! - Branches: two stores, a warehouse, a repair bench, a write-off branch
//! - Products across apparel, kitchen and stationery
//! - Opening stock received into the warehouse and both stores
//! - A `WELCOME10` coupon (10% off, capped at 5.00)

use std::env;
use std::path::PathBuf;

use meridian_core::{Actor, BranchKind, CouponType};
use meridian_ops::config::BackOfficeConfig;
use meridian_ops::services::{NewBranch, NewCoupon, NewProduct, PurchaseReceipt, StockLine};
use meridian_ops::{telemetry, BackOffice};

const BRANCHES: &[(&str, &str, BranchKind)] = &[
    ("DT", "Downtown", BranchKind::Store),
    ("HB", "Harbour", BranchKind::Store),
    ("WH", "Central Warehouse", BranchKind::Warehouse),
    ("RP", "Repair Bench", BranchKind::Repair),
    ("WO", "Write-offs", BranchKind::Discard),
];

/// (sku, name, category, price in cents)
const PRODUCTS: &[(&str, &str, &str, i64)] = &[
    ("APP-001", "Oxford Shirt", "apparel", 3_499),
    ("APP-002", "Chino Trousers", "apparel", 4_999),
    ("APP-003", "Wool Scarf", "apparel", 1_999),
    ("KIT-001", "Stoneware Mug", "kitchen", 899),
    ("KIT-002", "Chef Knife", "kitchen", 5_499),
    ("KIT-003", "Linen Tea Towel", "kitchen", 699),
    ("STA-001", "Dot Grid Notebook", "stationery", 1_299),
    ("STA-002", "Fountain Pen", "stationery", 2_899),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Meridian Back Office Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: from backoffice.toml)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = BackOfficeConfig::load(None)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Meridian Back Office Seeder");
    println!("===========================");
    println!("Database: {}", config.database.path.display());
    println!();

    let office = BackOffice::open(config).await?;
    let catalog = office.catalog();

    if !catalog.list_branches(false).await?.is_empty() {
        println!("Database already has branches, skipping seed.");
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let seeder = Actor::new("seed", "owner");

    let mut branches = Vec::with_capacity(BRANCHES.len());
    for (code, name, kind) in BRANCHES {
        let branch = catalog
            .create_branch(NewBranch {
                code: code.to_string(),
                name: name.to_string(),
                kind: *kind,
            })
            .await?;
        println!("✓ Branch {} ({:?})", branch.code, branch.kind);
        branches.push(branch);
    }

    let mut products = Vec::with_capacity(PRODUCTS.len());
    for (sku, name, category, price_cents) in PRODUCTS {
        products.push(
            catalog
                .create_product(NewProduct {
                    sku: sku.to_string(),
                    name: name.to_string(),
                    category_id: Some(category.to_string()),
                    price_cents: *price_cents,
                })
                .await?,
        );
    }
    println!("✓ {} products", products.len());

    let inventory = office.inventory();
    for branch in branches.iter().filter(|b| b.kind.is_sale_ready()) {
        let per_product = if branch.kind == BranchKind::Warehouse { 120 } else { 24 };
        let lines = products
            .iter()
            .map(|p| StockLine::new(&p.id, per_product))
            .collect();
        inventory
            .receive_purchase(
                &seeder,
                PurchaseReceipt {
                    branch_id: branch.id.clone(),
                    reference: format!("SEED-{}", branch.code),
                    lines,
                    note: Some("opening stock".to_string()),
                },
            )
            .await?;
        println!("✓ Opening stock at {}: {} per product", branch.code, per_product);
    }

    let coupon = catalog
        .create_coupon(NewCoupon {
            code: "welcome10".to_string(),
            coupon_type: Some(CouponType::Percentage),
            value: 1_000,
            max_discount_cents: Some(500),
            per_user_limit: Some(1),
            ..NewCoupon::default()
        })
        .await?;
    println!("✓ Coupon {}", coupon.code);

    office.close().await;
    println!();
    println!("Seed complete.");
    Ok(())
}
