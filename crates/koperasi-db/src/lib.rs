//! # koperasi-db: Transactional Store for Koperasi POS
//!
//! This crate persists everything the engines in `koperasi-core` decide.
//! Every business commit (checkout, purchase entry, payment, approval,
//! cancellation) runs inside exactly one SQLite transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Koperasi POS Data Flow                             │
//! │                                                                         │
//! │  REST handler (external)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  koperasi-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ sale.rs       │    │  (embedded)  │  │   │
//! │  │   │               │    │ purchase.rs   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ stock.rs      │    │ 001_initial  │  │   │
//! │  │   │ PointRate     │    │ points.rs ... │    │   _schema    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   config.rs  koperasi.toml + KOPERASI_* env                     │   │
//! │  │   retry.rs   re-run a commit that lost a version race           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/koperasi-pos/koperasi.db                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - File and environment configuration
//! - [`retry`] - Conflict retry with exponential backoff
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (sale, purchase, stock, ...)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use koperasi_db::{Database, KoperasiConfig};
//!
//! let config = KoperasiConfig::load(None)?;
//! let db = Database::new(config.db_config())
//!     .await?
//!     .with_point_rate(config.point_rate()?);
//!
//! let receipt = db.sales().checkout(&session, request).await?;
//! println!("{} paid, change {}", receipt.sale.invoice_number, receipt.sale.change_amount);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::KoperasiConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use retry::{retry_on_conflict, RetryPolicy};

// Repository re-exports for convenience
pub use repository::adjustment::AdjustmentRepository;
pub use repository::debt::DebtRepository;
pub use repository::member::MemberRepository;
pub use repository::payment::{PaymentReceipt, PaymentRepository};
pub use repository::points::PointRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::{NewPurchase, NewPurchaseItem, PurchaseReceipt, PurchaseRepository};
pub use repository::returns::{NewReturn, ReturnRepository};
pub use repository::sale::{CheckoutReceipt, CheckoutRequest, SaleRepository};
pub use repository::stock::StockRepository;
pub use repository::supplier::SupplierRepository;
