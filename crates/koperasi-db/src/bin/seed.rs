//! # Seed Data Generator
//!
//! Populates a development database with a small koperasi: suppliers,
//! members, products, opening stock and two demo checkouts.
//!
//! ## Usage
//! ```bash
//! # Use koperasi.toml from the platform config dir (or defaults)
//! cargo run -p koperasi-db --bin seed
//!
//! # Explicit config file / database path
//! cargo run -p koperasi-db --bin seed -- --config ./koperasi.toml
//! cargo run -p koperasi-db --bin seed -- --db ./koperasi_dev.db
//! ```
//!
//! Opening stock is received through TUNAI and KREDIT purchases, so every
//! unit on the shelf has a ledger row behind it.

use std::env;
use std::path::PathBuf;

use koperasi_core::cart::Cart;
use koperasi_core::envelope::PageRequest;
use koperasi_core::settlement::SaleTerms;
use koperasi_core::{Member, Money, Product, PurchaseType, Session, Supplier};
use koperasi_db::{
    retry_on_conflict, CheckoutRequest, Database, KoperasiConfig, NewPurchase, NewPurchaseItem,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (sku, name, purchase price, selling price, opening stock)
const PRODUCTS: &[(&str, &str, i64, i64, i64)] = &[
    ("BRS-5KG", "Beras Premium 5kg", 62_000, 68_000, 40),
    ("GUL-1KG", "Gula Pasir 1kg", 14_500, 16_500, 60),
    ("MNY-1L", "Minyak Goreng 1L", 15_500, 18_000, 48),
    ("TLR-1KG", "Telur Ayam 1kg", 24_000, 27_000, 30),
    ("TPG-1KG", "Tepung Terigu 1kg", 10_000, 12_000, 36),
    ("KPI-200", "Kopi Bubuk 200g", 45_000, 55_000, 24),
    ("TEH-25", "Teh Celup isi 25", 5_000, 6_500, 50),
    ("SBN-01", "Sabun Mandi", 3_200, 4_000, 72),
    ("ODL-01", "Pasta Gigi 190g", 7_500, 9_000, 40),
    ("MIE-01", "Mie Instan Goreng", 2_700, 3_500, 120),
];

const MEMBERS: &[(&str, &str)] = &[
    ("KOP-0001", "Siti Aminah"),
    ("KOP-0002", "Budi Santoso"),
    ("KOP-0003", "Dewi Lestari"),
];

const SUPPLIERS: &[(&str, &str)] = &[
    ("SUP-001", "CV Sumber Pangan"),
    ("SUP-002", "UD Kopi Nusantara"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Koperasi POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Configuration file (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (overrides configuration)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = KoperasiConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("🌱 {} - Seed Data Generator", config.store.name);
    println!("================================");
    println!("Database: {}", config.database_path().display());
    println!();

    let db = Database::new(config.db_config())
        .await?
        .with_point_rate(config.point_rate()?);

    let existing = db.products().list(PageRequest::default()).await?;
    if existing.pagination.map(|p| p.total).unwrap_or(0) > 0 {
        println!("⚠ Database already has products");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let session = Session::new("user-seed", "Seeder");

    // Directories
    let mut suppliers = Vec::new();
    for (code, name) in SUPPLIERS {
        suppliers.push(db.suppliers().insert(&Supplier::new(*code, *name)).await?);
    }
    let mut members = Vec::new();
    for (number, name) in MEMBERS {
        members.push(db.members().insert(&Member::new(*number, *name)).await?);
    }
    let mut products = Vec::new();
    for (sku, name, cost, price, _) in PRODUCTS {
        let product = Product::new(*sku, *name, Money::from_rupiah(*cost), Money::from_rupiah(*price));
        products.push(db.products().insert(&product).await?);
    }
    println!(
        "✓ {} suppliers, {} members, {} products",
        suppliers.len(),
        members.len(),
        products.len()
    );

    // Opening stock: groceries paid cash, coffee and tea on 30 days credit
    let (kredit_lines, tunai_lines): (Vec<_>, Vec<_>) = products
        .iter()
        .zip(PRODUCTS)
        .map(|(product, (sku, _, cost, _, stock))| {
            let item = NewPurchaseItem {
                product_id: product.id.clone(),
                quantity: *stock,
                unit_cost: Money::from_rupiah(*cost),
                selling_price: None,
            };
            (*sku, item)
        })
        .partition(|(sku, _)| sku.starts_with("KPI") || sku.starts_with("TEH"));
    let kredit_lines: Vec<NewPurchaseItem> = kredit_lines.into_iter().map(|(_, item)| item).collect();
    let tunai_lines: Vec<NewPurchaseItem> = tunai_lines.into_iter().map(|(_, item)| item).collect();

    let tunai_total = tunai_lines.iter().try_fold(Money::zero(), |total, item| {
        total.checked_add(item.unit_cost.multiply_quantity(item.quantity)?)
    })?;
    let tunai = db
        .purchases()
        .create(
            &session,
            NewPurchase {
                supplier_id: suppliers[0].id.clone(),
                purchase_type: PurchaseType::Tunai,
                items: tunai_lines,
                paid_amount: tunai_total,
                due_date: None,
                notes: Some("Stok awal".to_string()),
            },
        )
        .await?;
    let kredit = db
        .purchases()
        .create(
            &session,
            NewPurchase {
                supplier_id: suppliers[1].id.clone(),
                purchase_type: PurchaseType::Kredit,
                items: kredit_lines,
                paid_amount: Money::zero(),
                due_date: Some(chrono::Local::now().date_naive() + chrono::Duration::days(30)),
                notes: Some("Stok awal".to_string()),
            },
        )
        .await?;
    println!(
        "✓ Purchases {} (TUNAI {}) and {} (KREDIT {})",
        tunai.purchase.invoice_number,
        tunai.purchase.total_amount,
        kredit.purchase.invoice_number,
        kredit.purchase.total_amount
    );

    // Demo checkouts
    let policy = config.retry_policy();
    let sales = db.sales();

    let mut cart = Cart::with_tax_rate(config.tax_rate());
    cart.add_line(&db.products().get_by_sku("BRS-5KG").await?, 1, None)?;
    cart.add_line(&db.products().get_by_sku("MIE-01").await?, 5, None)?;
    let total = cart.compute_totals()?.final_amount;
    let cash = CheckoutRequest {
        cart,
        member_id: Some(members[0].id.clone()),
        terms: SaleTerms::tunai(total),
        notes: None,
    };
    let receipt = retry_on_conflict(policy, || sales.checkout(&session, cash.clone())).await?;
    info!(invoice = %receipt.sale.invoice_number, "Demo TUNAI sale");
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    let mut cart = Cart::with_tax_rate(config.tax_rate());
    cart.add_line(&db.products().get_by_sku("GUL-1KG").await?, 2, None)?;
    cart.add_line(&db.products().get_by_sku("MNY-1L").await?, 2, None)?;
    let credit = CheckoutRequest {
        cart,
        member_id: Some(members[1].id.clone()),
        terms: SaleTerms::kredit(
            Money::from_rupiah(20_000),
            chrono::Local::now().date_naive() + chrono::Duration::days(14),
        ),
        notes: Some("Bayar saat gajian".to_string()),
    };
    let receipt = retry_on_conflict(policy, || sales.checkout(&session, credit.clone())).await?;
    info!(invoice = %receipt.sale.invoice_number, "Demo KREDIT sale");
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    println!();
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: `info,koperasi=debug,sqlx=warn`
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,koperasi=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
