//! # Stock Repository
//!
//! The one way `products.stock` changes.
//!
//! ## Applying a Movement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 apply_plan (inside the caller's transaction)            │
//! │                                                                         │
//! │  MovementPlan { before: 10, quantity: -3, after: 7 }                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT stock, version FROM products WHERE id = ?                      │
//! │       │  stock != plan.before ──────────────► ConcurrencyConflict      │
//! │       ▼                                                                 │
//! │  UPDATE products SET stock = 7, version = version + 1                  │
//! │   WHERE id = ? AND version = ?  ── 0 rows ──► ConcurrencyConflict      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO stock_movements (before 10, quantity -3, after 7, ...)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The product row and its ledger row land in the same transaction, so
//! `sum(movements.quantity)` always equals the stock the ledger started from
//! plus every change since.

use chrono::{DateTime, Utc};
use koperasi_core::stock::{plan_movement, MovementPlan};
use koperasi_core::{MovementType, ReferenceType, Session, StockMovement};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::product::{load_active_product, load_product};
use crate::repository::{begin, commit};

const MOVEMENT_COLUMNS: &str = "id, product_id, movement_type, quantity, quantity_before, \
     quantity_after, reference_type, reference_id, user_id, notes, created_at";

/// What caused a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub reference_type: ReferenceType,
    pub reference_id: &'a str,
}

impl<'a> Reference<'a> {
    pub fn new(reference_type: ReferenceType, reference_id: &'a str) -> Self {
        Reference {
            reference_type,
            reference_id,
        }
    }

    pub fn sale(id: &'a str) -> Self {
        Reference::new(ReferenceType::Sale, id)
    }

    pub fn purchase(id: &'a str) -> Self {
        Reference::new(ReferenceType::Purchase, id)
    }

    pub fn adjustment(id: &'a str) -> Self {
        Reference::new(ReferenceType::Adjustment, id)
    }

    pub fn stock_return(id: &'a str) -> Self {
        Reference::new(ReferenceType::Return, id)
    }
}

/// Stock ledger access.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Applies one movement in its own transaction.
    ///
    /// ## Errors
    /// - `Validation` when the delta's sign does not fit `movement_type`
    /// - `InsufficientStock` when the product would go below zero
    /// - `ProductNotFound` for an unknown or inactive product
    /// - `ConcurrencyConflict` when the row changed underneath
    ///
    /// On any error nothing is written.
    pub async fn apply_movement(
        &self,
        session: &Session,
        product_id: &str,
        movement_type: MovementType,
        delta: i64,
        reference: Reference<'_>,
        notes: Option<String>,
    ) -> DbResult<StockMovement> {
        let mut tx = begin(&self.pool).await?;

        let product = load_active_product(&mut tx, product_id).await?;

        let plan = plan_movement(&product.id, &product.sku, product.stock, movement_type, delta)?;
        let movement = apply_plan(&mut tx, plan, reference, &session.user_id, notes, Utc::now()).await?;

        commit(tx).await?;

        info!(
            product = %movement.product_id,
            kind = ?movement.movement_type,
            quantity = movement.quantity,
            after = movement.quantity_after,
            "Stock movement applied"
        );
        Ok(movement)
    }

    /// Ledger rows for a product in the order they were written.
    pub async fn movements_for_product(&self, product_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE product_id = ?1 ORDER BY rowid"
        );
        Ok(sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Ledger rows written by one document (sale, purchase, adjustment, return).
    pub async fn movements_for_reference(
        &self,
        reference: Reference<'_>,
    ) -> DbResult<Vec<StockMovement>> {
        let mut conn = self.pool.acquire().await?;
        movements_for_reference(&mut conn, reference).await
    }
}

/// Applies a planned movement on the caller's transaction.
///
/// Plans built by a [`StockPlanner`](koperasi_core::stock::StockPlanner)
/// must be applied in the order they were planned.
pub(crate) async fn apply_plan(
    conn: &mut SqliteConnection,
    plan: MovementPlan,
    reference: Reference<'_>,
    user_id: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> DbResult<StockMovement> {
    let product = load_product(conn, &plan.product_id).await?;
    if product.stock != plan.quantity_before {
        debug!(
            product = %plan.product_id,
            expected = plan.quantity_before,
            found = product.stock,
            "Stock changed since planning"
        );
        return Err(DbError::conflict("Product", &plan.product_id));
    }

    let result = sqlx::query(
        "UPDATE products SET stock = ?1, version = version + 1, updated_at = ?2 \
         WHERE id = ?3 AND version = ?4",
    )
    .bind(plan.quantity_after)
    .bind(now)
    .bind(&plan.product_id)
    .bind(product.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("Product", &plan.product_id));
    }

    let movement = plan.into_movement(
        reference.reference_type,
        reference.reference_id,
        user_id,
        notes,
        now,
    );
    insert_movement(conn, &movement).await?;

    debug!(
        product = %movement.product_id,
        before = movement.quantity_before,
        after = movement.quantity_after,
        "Ledger row appended"
    );
    Ok(movement)
}

async fn insert_movement(conn: &mut SqliteConnection, movement: &StockMovement) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, movement_type, quantity, quantity_before, quantity_after,
            reference_type, reference_id, user_id, notes, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.quantity_before)
    .bind(movement.quantity_after)
    .bind(movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.user_id)
    .bind(&movement.notes)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn movements_for_reference(
    conn: &mut SqliteConnection,
    reference: Reference<'_>,
) -> DbResult<Vec<StockMovement>> {
    let sql = format!(
        "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
         WHERE reference_type = ?1 AND reference_id = ?2 ORDER BY rowid"
    );
    Ok(sqlx::query_as::<_, StockMovement>(&sql)
        .bind(reference.reference_type)
        .bind(reference.reference_id)
        .fetch_all(&mut *conn)
        .await?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{database, kasir, stocked_product};
    use koperasi_core::stock::ledger_delta;
    use koperasi_core::{CoreError, ErrorKind};

    #[tokio::test]
    async fn test_movement_updates_stock_and_ledger_together() {
        let db = database().await;
        let product = stocked_product(&db, "BRS-5KG", 65_000, 10).await;

        let movement = db
            .stock()
            .apply_movement(&kasir(), &product.id, MovementType::In, 5, Reference::purchase("pb-1"), None)
            .await
            .unwrap();

        assert_eq!(movement.quantity_before, 10);
        assert_eq!(movement.quantity_after, 15);
        assert_eq!(movement.user_id, "user-kasir-1");

        let after = db.products().get_by_id(&product.id).await.unwrap();
        assert_eq!(after.stock, 15);
        assert_eq!(after.version, product.version + 1);

        let ledger = db.stock().movements_for_product(&product.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger_delta(&ledger), after.stock);
    }

    #[tokio::test]
    async fn test_rejected_movement_leaves_no_trace() {
        let db = database().await;
        let product = stocked_product(&db, "MYK-2L", 34_000, 3).await;

        let err = db
            .stock()
            .apply_movement(&kasir(), &product.id, MovementType::Out, -4, Reference::sale("s-1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { available: 3, requested: 4, .. })));

        let err = db
            .stock()
            .apply_movement(&kasir(), &product.id, MovementType::In, -1, Reference::purchase("pb-1"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let after = db.products().get_by_id(&product.id).await.unwrap();
        assert_eq!(after.stock, 3);
        assert_eq!(after.version, product.version);
        assert_eq!(db.stock().movements_for_product(&product.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_plan_is_a_conflict() {
        let db = database().await;
        let product = stocked_product(&db, "TLR-10", 25_000, 8).await;

        // planned against 8, but another till sells 2 first
        let stale = plan_movement(&product.id, &product.sku, 8, MovementType::Out, -1).unwrap();
        db.stock()
            .apply_movement(&kasir(), &product.id, MovementType::Out, -2, Reference::sale("s-1"), None)
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let err = apply_plan(&mut conn, stale, Reference::sale("s-2"), "u", None, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        drop(conn);
        assert_eq!(db.products().get_by_id(&product.id).await.unwrap().stock, 6);
    }

    #[tokio::test]
    async fn test_ledger_is_append_only() {
        let db = database().await;
        let product = stocked_product(&db, "GUL-1KG", 16_000, 4).await;

        let update = sqlx::query("UPDATE stock_movements SET quantity = 100 WHERE product_id = ?1")
            .bind(&product.id)
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM stock_movements WHERE product_id = ?1")
            .bind(&product.id)
            .execute(db.pool())
            .await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_inactive_product_cannot_move() {
        let db = database().await;
        let mut product = stocked_product(&db, "KPI-200", 12_000, 4).await;
        product.is_active = false;
        db.products().update_details(&product).await.unwrap();

        let err = db
            .stock()
            .apply_movement(&kasir(), &product.id, MovementType::In, 1, Reference::purchase("pb"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
