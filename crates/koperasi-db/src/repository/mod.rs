//! # Repository Module
//!
//! Database repository implementations for Koperasi POS.
//!
//! ## Commit Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  One Business Commit = One Transaction                  │
//! │                                                                         │
//! │  db.sales().checkout(&session, request)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │   ├── read products / member inside the transaction                    │
//! │   ├── plan every movement (koperasi-core)  ── any rule fails ─► ROLLBACK│
//! │   ├── INSERT sale, items, payment                                      │
//! │   ├── UPDATE products ... WHERE version = ?  ── miss ─► Conflict        │
//! │   ├── INSERT stock_movements / point_transactions                      │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Helpers below take `&mut SqliteConnection` so they run on the open    │
//! │  transaction, never on a second pooled connection.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product directory and low-stock reads
//! - [`MemberRepository`](member::MemberRepository) - Member directory
//! - [`SupplierRepository`](supplier::SupplierRepository) - Supplier directory
//! - [`StockRepository`](stock::StockRepository) - The single stock mutation path and ledger reads
//! - [`SaleRepository`](sale::SaleRepository) - Checkout and sale cancellation
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Purchase entry and cancellation
//! - [`PaymentRepository`](payment::PaymentRepository) - Installments against sales and purchases
//! - [`AdjustmentRepository`](adjustment::AdjustmentRepository) - Stock adjustment approvals
//! - [`ReturnRepository`](returns::ReturnRepository) - Sales and purchase return approvals
//! - [`PointRepository`](points::PointRepository) - Point redemption, adjustment and expiry
//! - [`DebtRepository`](debt::DebtRepository) - Receivable and payable listings

pub mod adjustment;
pub mod debt;
pub mod member;
pub mod payment;
pub mod points;
pub mod product;
pub mod purchase;
pub mod returns;
pub mod sale;
pub mod stock;
pub mod supplier;

use chrono::{DateTime, Local, NaiveDate, Utc};
use koperasi_core::numbering::{sequence_of, DocumentKind};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::{DbError, DbResult};

/// Opens the transaction a business commit runs in.
pub(crate) async fn begin(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    pool.begin().await.map_err(transaction_error)
}

/// Commits, keeping lock errors retryable.
pub(crate) async fn commit(tx: Transaction<'static, Sqlite>) -> DbResult<()> {
    tx.commit().await.map_err(transaction_error)
}

fn transaction_error(err: sqlx::Error) -> DbError {
    match DbError::from(err) {
        DbError::Internal(msg) | DbError::QueryFailed(msg) => DbError::TransactionFailed(msg),
        other => other,
    }
}

/// Local calendar date of a commit. Due dates and document numbers use it.
pub(crate) fn business_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

/// Allocates the next daily document number for `kind`.
///
/// Runs inside the commit transaction, so the write lock taken by the
/// insert that follows keeps two tills from getting the same number; if
/// they race anyway the UNIQUE index rejects the loser.
pub(crate) async fn next_document_number(
    conn: &mut SqliteConnection,
    kind: DocumentKind,
    table: &str,
    column: &str,
    date: NaiveDate,
) -> DbResult<String> {
    let sql = format!(
        "SELECT {column} FROM {table} WHERE {column} LIKE ?1 ORDER BY {column} DESC LIMIT 1"
    );

    let last: Option<String> = sqlx::query_scalar(&sql)
        .bind(kind.daily_pattern(date))
        .fetch_optional(&mut *conn)
        .await?;

    let next = last.as_deref().and_then(sequence_of).unwrap_or(0) + 1;
    Ok(kind.format(date, next))
}

/// Maps a unique violation on insert to the business key the caller used.
pub(crate) fn unique_as(err: sqlx::Error, field: &str, value: &str) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { .. } => DbError::duplicate(field, value),
        other => other,
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================


// =============================================================================
// Unit Tests
// =============================================================================
