//! # Adjustment Repository
//!
//! Stock opname corrections. A request records the signed difference
//! between shelf and system; stock only moves once it is approved.
//!
//! ```text
//! request ──► PENDING ──approve──► APPROVED   (ADJUSTMENT movement)
//!                │
//!                └─────reject───► REJECTED   (no movement)
//! ```

use chrono::Utc;
use koperasi_core::numbering::DocumentKind;
use koperasi_core::stock::plan_movement;
use koperasi_core::validation::validate_name;
use koperasi_core::{
    new_id, ApprovalStatus, MovementType, Session, StockAdjustment, StockMovement,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::product::load_active_product;
use crate::repository::stock::{apply_plan, Reference};
use crate::repository::{begin, business_date, commit, next_document_number};

const ADJUSTMENT_COLUMNS: &str = "id, adjustment_number, product_id, quantity, reason, status, \
     requested_by, decided_by, created_at, decided_at";

#[derive(Debug, Clone)]
pub struct AdjustmentRepository {
    pool: SqlitePool,
}

impl AdjustmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AdjustmentRepository { pool }
    }

    /// Files a PENDING adjustment of `quantity` (signed, never zero).
    pub async fn request(
        &self,
        session: &Session,
        product_id: &str,
        quantity: i64,
        reason: &str,
    ) -> DbResult<StockAdjustment> {
        MovementType::Adjustment.check_delta(quantity)?;
        validate_name("reason", reason)?;

        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        load_active_product(&mut tx, product_id).await?;
        let adjustment_number = next_document_number(
            &mut tx,
            DocumentKind::Adjustment,
            "stock_adjustments",
            "adjustment_number",
            business_date(now),
        )
        .await?;

        let adjustment = StockAdjustment {
            id: new_id(),
            adjustment_number,
            product_id: product_id.to_string(),
            quantity,
            reason: reason.trim().to_string(),
            status: ApprovalStatus::Pending,
            requested_by: session.user_id.clone(),
            decided_by: None,
            created_at: now,
            decided_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_adjustments (
                id, adjustment_number, product_id, quantity, reason, status,
                requested_by, decided_by, created_at, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&adjustment.id)
        .bind(&adjustment.adjustment_number)
        .bind(&adjustment.product_id)
        .bind(adjustment.quantity)
        .bind(&adjustment.reason)
        .bind(adjustment.status)
        .bind(&adjustment.requested_by)
        .bind(&adjustment.decided_by)
        .bind(adjustment.created_at)
        .bind(adjustment.decided_at)
        .execute(&mut *tx)
        .await?;

        commit(tx).await?;

        info!(
            number = %adjustment.adjustment_number,
            product = %product_id,
            quantity,
            "Stock adjustment requested"
        );
        Ok(adjustment)
    }

    /// Approves a PENDING adjustment and applies it to stock.
    ///
    /// Stock is checked at approval time, so a shrinkage that no longer fits
    /// fails with `InsufficientStock` and the request stays PENDING.
    pub async fn approve(
        &self,
        session: &Session,
        adjustment_id: &str,
    ) -> DbResult<(StockAdjustment, StockMovement)> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let mut adjustment = load_adjustment(&mut tx, adjustment_id).await?;
        let status = adjustment.status.decide(true)?;

        let product = load_active_product(&mut tx, &adjustment.product_id).await?;
        let plan = plan_movement(
            &product.id,
            &product.sku,
            product.stock,
            MovementType::Adjustment,
            adjustment.quantity,
        )?;
        let movement = apply_plan(
            &mut tx,
            plan,
            Reference::adjustment(&adjustment.id),
            &session.user_id,
            Some(adjustment.reason.clone()),
            now,
        )
        .await?;

        decide(&mut tx, &adjustment.id, status, &session.user_id, now).await?;
        commit(tx).await?;

        info!(
            number = %adjustment.adjustment_number,
            before = movement.quantity_before,
            after = movement.quantity_after,
            "Stock adjustment approved"
        );

        adjustment.status = status;
        adjustment.decided_by = Some(session.user_id.clone());
        adjustment.decided_at = Some(now);
        Ok((adjustment, movement))
    }

    pub async fn reject(&self, session: &Session, adjustment_id: &str) -> DbResult<StockAdjustment> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let mut adjustment = load_adjustment(&mut tx, adjustment_id).await?;
        let status = adjustment.status.decide(false)?;
        decide(&mut tx, &adjustment.id, status, &session.user_id, now).await?;

        commit(tx).await?;

        info!(number = %adjustment.adjustment_number, "Stock adjustment rejected");

        adjustment.status = status;
        adjustment.decided_by = Some(session.user_id.clone());
        adjustment.decided_at = Some(now);
        Ok(adjustment)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<StockAdjustment> {
        let mut conn = self.pool.acquire().await?;
        load_adjustment(&mut conn, id).await
    }

    /// Requests waiting for a decision, oldest first.
    pub async fn list_pending(&self) -> DbResult<Vec<StockAdjustment>> {
        let sql = format!(
            "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE status = 'PENDING' \
             ORDER BY created_at, adjustment_number"
        );
        Ok(sqlx::query_as::<_, StockAdjustment>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }
}

async fn load_adjustment(conn: &mut SqliteConnection, id: &str) -> DbResult<StockAdjustment> {
    let sql = format!("SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments WHERE id = ?1");
    sqlx::query_as::<_, StockAdjustment>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("StockAdjustment", id))
}

async fn decide(
    conn: &mut SqliteConnection,
    id: &str,
    status: ApprovalStatus,
    user_id: &str,
    now: chrono::DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE stock_adjustments SET status = ?1, decided_by = ?2, decided_at = ?3 \
         WHERE id = ?4 AND status = 'PENDING'",
    )
    .bind(status)
    .bind(user_id)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("StockAdjustment", id));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{database, kasir, stocked_product};
    use koperasi_core::{CoreError, ErrorKind};

    #[tokio::test]
    async fn test_approve_applies_adjustment() {
        let db = database().await;
        let minyak = stocked_product(&db, "MNY-1L", 18_000, 12).await;

        let request = db
            .adjustments()
            .request(&kasir(), &minyak.id, -2, "Botol bocor")
            .await
            .unwrap();
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(request.adjustment_number.starts_with("ADJ-"));
        assert_eq!(db.products().get_by_id(&minyak.id).await.unwrap().stock, 12);
        assert_eq!(db.adjustments().list_pending().await.unwrap().len(), 1);

        let (approved, movement) = db.adjustments().approve(&kasir(), &request.id).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(movement.movement_type, MovementType::Adjustment);
        assert_eq!(movement.quantity_before, 12);
        assert_eq!(movement.quantity_after, 10);
        assert_eq!(db.products().get_by_id(&minyak.id).await.unwrap().stock, 10);
        assert!(db.adjustments().list_pending().await.unwrap().is_empty());

        let err = db.adjustments().approve(&kasir(), &request.id).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidStatusTransition { .. })));
    }

    #[tokio::test]
    async fn test_reject_moves_nothing() {
        let db = database().await;
        let gula = stocked_product(&db, "GUL-1KG", 16_000, 5).await;

        let request = db
            .adjustments()
            .request(&kasir(), &gula.id, 3, "Hitung ulang")
            .await
            .unwrap();
        let rejected = db.adjustments().reject(&kasir(), &request.id).await.unwrap();
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
        assert_eq!(rejected.decided_by.as_deref(), Some("user-kasir-1"));

        let stored = db.adjustments().get_by_id(&request.id).await.unwrap();
        assert_eq!(stored.status, ApprovalStatus::Rejected);
        assert_eq!(db.products().get_by_id(&gula.id).await.unwrap().stock, 5);
        assert!(db.adjustments().approve(&kasir(), &request.id).await.is_err());
    }

    #[tokio::test]
    async fn test_shrinkage_beyond_stock_stays_pending() {
        let db = database().await;
        let telur = stocked_product(&db, "TLR-10", 25_000, 3).await;

        let request = db
            .adjustments()
            .request(&kasir(), &telur.id, -5, "Pecah")
            .await
            .unwrap();
        let err = db.adjustments().approve(&kasir(), &request.id).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

        let stored = db.adjustments().get_by_id(&request.id).await.unwrap();
        assert_eq!(stored.status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let db = database().await;
        let telur = stocked_product(&db, "TLR-10", 25_000, 3).await;

        let err = db.adjustments().request(&kasir(), &telur.id, 0, "Nol").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(db.adjustments().request(&kasir(), &telur.id, 1, "  ").await.is_err());
        assert!(db.adjustments().request(&kasir(), "nope", 1, "Hilang").await.is_err());
    }
}
