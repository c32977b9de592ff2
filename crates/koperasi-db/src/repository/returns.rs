//! # Return Repository
//!
//! Goods coming back from members (sales return, RETURN_IN) or going back
//! to suppliers (purchase return, RETURN_OUT). Like adjustments, a return is
//! requested first and only moves stock once approved.
//!
//! ## Returnable Quantity
//! ```text
//! returnable = Σ source line quantity for the product
//!            - Σ APPROVED returns against the same source and product
//! ```
//!
//! The bound is checked on request and again on approval, since two pending
//! requests can each fit on their own but not together.

use chrono::{DateTime, Utc};
use koperasi_core::numbering::DocumentKind;
use koperasi_core::stock::{check_returnable, plan_movement};
use koperasi_core::validation::validate_name;
use koperasi_core::{new_id, ApprovalStatus, ReturnKind, Session, StockMovement, StockReturn};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::product::load_product;
use crate::repository::stock::{apply_plan, Reference};
use crate::repository::{begin, business_date, commit, next_document_number};

const RETURN_COLUMNS: &str = "id, return_number, kind, source_id, product_id, quantity, reason, \
     status, requested_by, decided_by, created_at, decided_at";

/// A return as entered by staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReturn {
    pub kind: ReturnKind,
    /// Sale id for a sales return, purchase id for a purchase return.
    pub source_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Files a PENDING return.
    ///
    /// ## Errors
    /// - `NotFound` when the source document is missing or cancelled
    /// - `ReturnExceedsTransacted` when the quantity is more than can still
    ///   be returned
    pub async fn request(&self, session: &Session, new: NewReturn) -> DbResult<StockReturn> {
        validate_name("reason", &new.reason)?;

        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let product = load_product(&mut tx, &new.product_id).await?;
        check_bound(&mut tx, new.kind, &new.source_id, &product.id, &product.sku, new.quantity)
            .await?;

        let return_number = next_document_number(
            &mut tx,
            DocumentKind::Return,
            "stock_returns",
            "return_number",
            business_date(now),
        )
        .await?;

        let stock_return = StockReturn {
            id: new_id(),
            return_number,
            kind: new.kind,
            source_id: new.source_id,
            product_id: product.id,
            quantity: new.quantity,
            reason: new.reason.trim().to_string(),
            status: ApprovalStatus::Pending,
            requested_by: session.user_id.clone(),
            decided_by: None,
            created_at: now,
            decided_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_returns (
                id, return_number, kind, source_id, product_id, quantity, reason,
                status, requested_by, decided_by, created_at, decided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&stock_return.id)
        .bind(&stock_return.return_number)
        .bind(stock_return.kind)
        .bind(&stock_return.source_id)
        .bind(&stock_return.product_id)
        .bind(stock_return.quantity)
        .bind(&stock_return.reason)
        .bind(stock_return.status)
        .bind(&stock_return.requested_by)
        .bind(&stock_return.decided_by)
        .bind(stock_return.created_at)
        .bind(stock_return.decided_at)
        .execute(&mut *tx)
        .await?;

        commit(tx).await?;

        info!(
            number = %stock_return.return_number,
            kind = ?stock_return.kind,
            quantity = stock_return.quantity,
            "Return requested"
        );
        Ok(stock_return)
    }

    /// Approves a PENDING return and moves its stock.
    pub async fn approve(
        &self,
        session: &Session,
        return_id: &str,
    ) -> DbResult<(StockReturn, StockMovement)> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let mut stock_return = load_return(&mut tx, return_id).await?;
        let status = stock_return.status.decide(true)?;

        let product = load_product(&mut tx, &stock_return.product_id).await?;
        check_bound(
            &mut tx,
            stock_return.kind,
            &stock_return.source_id,
            &product.id,
            &product.sku,
            stock_return.quantity,
        )
        .await?;

        let plan = plan_movement(
            &product.id,
            &product.sku,
            product.stock,
            stock_return.kind.movement_type(),
            stock_return.kind.signed(stock_return.quantity),
        )?;
        let movement = apply_plan(
            &mut tx,
            plan,
            Reference::stock_return(&stock_return.id),
            &session.user_id,
            Some(stock_return.return_number.clone()),
            now,
        )
        .await?;

        decide(&mut tx, &stock_return.id, status, &session.user_id, now).await?;
        commit(tx).await?;

        info!(
            number = %stock_return.return_number,
            movement = ?movement.movement_type,
            after = movement.quantity_after,
            "Return approved"
        );

        stock_return.status = status;
        stock_return.decided_by = Some(session.user_id.clone());
        stock_return.decided_at = Some(now);
        Ok((stock_return, movement))
    }

    pub async fn reject(&self, session: &Session, return_id: &str) -> DbResult<StockReturn> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let mut stock_return = load_return(&mut tx, return_id).await?;
        let status = stock_return.status.decide(false)?;
        decide(&mut tx, &stock_return.id, status, &session.user_id, now).await?;

        commit(tx).await?;

        info!(number = %stock_return.return_number, "Return rejected");

        stock_return.status = status;
        stock_return.decided_by = Some(session.user_id.clone());
        stock_return.decided_at = Some(now);
        Ok(stock_return)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<StockReturn> {
        let mut conn = self.pool.acquire().await?;
        load_return(&mut conn, id).await
    }

    pub async fn list_pending(&self) -> DbResult<Vec<StockReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM stock_returns WHERE status = 'PENDING' \
             ORDER BY created_at, return_number"
        );
        Ok(sqlx::query_as::<_, StockReturn>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }
}

async fn check_bound(
    conn: &mut SqliteConnection,
    kind: ReturnKind,
    source_id: &str,
    product_id: &str,
    sku: &str,
    requested: i64,
) -> DbResult<()> {
    let (entity, sql) = match kind {
        ReturnKind::Sales => (
            "Sale",
            "SELECT s.status != 'CANCELLED', \
                    COALESCE((SELECT SUM(quantity) FROM sale_items \
                              WHERE sale_id = s.id AND product_id = ?2), 0) \
             FROM sales s WHERE s.id = ?1",
        ),
        ReturnKind::Purchase => (
            "Purchase",
            "SELECT p.status != 'CANCELLED', \
                    COALESCE((SELECT SUM(quantity) FROM purchase_items \
                              WHERE purchase_id = p.id AND product_id = ?2), 0) \
             FROM purchases p WHERE p.id = ?1",
        ),
    };

    let source: Option<(bool, i64)> = sqlx::query_as(sql)
        .bind(source_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

    let transacted = match source {
        Some((true, transacted)) => transacted,
        _ => return Err(DbError::not_found(entity, source_id)),
    };

    let already_returned: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0) FROM stock_returns \
         WHERE kind = ?1 AND source_id = ?2 AND product_id = ?3 AND status = 'APPROVED'",
    )
    .bind(kind)
    .bind(source_id)
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    debug!(source = %source_id, sku, transacted, already_returned, requested, "Checking return bound");

    check_returnable(sku, transacted, already_returned, requested)?;
    Ok(())
}

/// Whether any return against `source_id` has already been approved.
pub(crate) async fn has_approved_returns(
    conn: &mut SqliteConnection,
    kind: ReturnKind,
    source_id: &str,
) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM stock_returns WHERE kind = ?1 AND source_id = ?2 AND status = 'APPROVED'",
    )
    .bind(kind)
    .bind(source_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

async fn load_return(conn: &mut SqliteConnection, id: &str) -> DbResult<StockReturn> {
    let sql = format!("SELECT {RETURN_COLUMNS} FROM stock_returns WHERE id = ?1");
    sqlx::query_as::<_, StockReturn>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("StockReturn", id))
}

async fn decide(
    conn: &mut SqliteConnection,
    id: &str,
    status: ApprovalStatus,
    user_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE stock_returns SET status = ?1, decided_by = ?2, decided_at = ?3 \
         WHERE id = ?4 AND status = 'PENDING'",
    )
    .bind(status)
    .bind(user_id)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("StockReturn", id));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
