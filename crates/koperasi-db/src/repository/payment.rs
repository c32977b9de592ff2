//! # Payment Repository
//!
//! Installments against KREDIT sales (receivables) and KREDIT / KONSINYASI
//! purchases (payables).
//!
//! ```text
//! record(SALE, id, 40_000)
//!      │
//!      ▼
//! BEGIN
//!  ├── SELECT total, paid, status            (sales | purchases)
//!  ├── settlement::record_payment            Overpayment / Cancelled ─► ROLLBACK
//!  ├── UPDATE ... SET paid, status WHERE paid = <read value>   0 rows ─► Conflict
//!  └── INSERT payments                       append-only
//! COMMIT
//! ```
//!
//! `paid_amount` on the document always equals the sum of its payment rows.

use chrono::Utc;
use koperasi_core::settlement::{record_payment, Balance};
use koperasi_core::{new_id, Money, Payment, PaymentStatus, PaymentTarget, Session};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::{begin, commit};

const PAYMENT_COLUMNS: &str = "id, target, target_id, amount, notes, user_id, created_at";

/// A recorded payment and the balance it left.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub balance: Balance,
}

#[derive(Debug, FromRow)]
struct BalanceRow {
    total: Money,
    paid: Money,
    status: PaymentStatus,
}

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Records an installment.
    ///
    /// ## Errors
    /// - `Validation` when amount <= 0
    /// - `Overpayment` when amount exceeds what is still owed
    /// - `InvalidStatusTransition` for a cancelled document
    /// - `NotFound` for an unknown sale or purchase
    pub async fn record(
        &self,
        session: &Session,
        target: PaymentTarget,
        target_id: &str,
        amount: Money,
        notes: Option<String>,
    ) -> DbResult<PaymentReceipt> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let current = load_balance(&mut tx, target, target_id).await?;
        let balance = record_payment(current, amount)?;

        let result = match target {
            PaymentTarget::Sale => {
                sqlx::query(
                    "UPDATE sales SET paid_amount = ?1, status = ?2, updated_at = ?3 \
                     WHERE id = ?4 AND paid_amount = ?5",
                )
                .bind(balance.paid)
                .bind(balance.status)
                .bind(now)
                .bind(target_id)
                .bind(current.paid)
                .execute(&mut *tx)
                .await?
            }
            PaymentTarget::Purchase => {
                sqlx::query(
                    "UPDATE purchases SET paid_amount = ?1, remaining_debt = ?2, status = ?3, \
                     updated_at = ?4 WHERE id = ?5 AND paid_amount = ?6",
                )
                .bind(balance.paid)
                .bind(balance.remaining())
                .bind(balance.status)
                .bind(now)
                .bind(target_id)
                .bind(current.paid)
                .execute(&mut *tx)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!("{:?}", target), target_id));
        }

        let payment = Payment {
            id: new_id(),
            target,
            target_id: target_id.to_string(),
            amount,
            notes,
            user_id: session.user_id.clone(),
            created_at: now,
        };
        insert_payment(&mut tx, &payment).await?;

        commit(tx).await?;

        info!(
            target = ?target,
            id = %target_id,
            amount = %amount,
            remaining = %balance.remaining(),
            status = ?balance.status,
            "Payment recorded"
        );

        Ok(PaymentReceipt { payment, balance })
    }

    /// Payments against one document, oldest first.
    pub async fn payments_for(&self, target: PaymentTarget, target_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE target = ?1 AND target_id = ?2 ORDER BY rowid"
        );
        Ok(sqlx::query_as::<_, Payment>(&sql)
            .bind(target)
            .bind(target_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

async fn load_balance(
    conn: &mut SqliteConnection,
    target: PaymentTarget,
    target_id: &str,
) -> DbResult<Balance> {
    let (entity, sql) = match target {
        PaymentTarget::Sale => (
            "Sale",
            "SELECT final_amount AS total, paid_amount AS paid, status FROM sales WHERE id = ?1",
        ),
        PaymentTarget::Purchase => (
            "Purchase",
            "SELECT total_amount AS total, paid_amount AS paid, status FROM purchases WHERE id = ?1",
        ),
    };

    let row = sqlx::query_as::<_, BalanceRow>(sql)
        .bind(target_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found(entity, target_id))?;

    Ok(Balance::new(row.total, row.paid, row.status))
}

pub(crate) async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO payments (id, target, target_id, amount, notes, user_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&payment.id)
    .bind(payment.target)
    .bind(&payment.target_id)
    .bind(payment.amount)
    .bind(&payment.notes)
    .bind(&payment.user_id)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{database, due_in, kasir, member, rp, stocked_product};
    use crate::repository::sale::CheckoutRequest;
    use koperasi_core::cart::Cart;
    use koperasi_core::settlement::SaleTerms;
    use koperasi_core::CoreError;

    #[tokio::test]
    async fn test_scenario_c_credit_sale_installments() {
        let db = database().await;
        let budi = member(&db, "KOP-0002", 0).await;
        let beras = stocked_product(&db, "BRS-5KG", 50_000, 10).await;

        let mut cart = Cart::new();
        cart.add_line(&beras, 2, None).unwrap();
        let receipt = db
            .sales()
            .checkout(
                &kasir(),
                CheckoutRequest {
                    cart,
                    member_id: Some(budi.id.clone()),
                    terms: SaleTerms::kredit(Money::zero(), due_in(30)),
                    notes: None,
                },
            )
            .await
            .unwrap();
        let sale_id = receipt.sale.id;
        assert_eq!(receipt.sale.status, PaymentStatus::Pending);
        assert!(receipt.payment.is_none());

        let first = db
            .payments()
            .record(&kasir(), PaymentTarget::Sale, &sale_id, rp(40_000), None)
            .await
            .unwrap();
        assert_eq!(first.balance.status, PaymentStatus::Partial);
        assert_eq!(first.balance.remaining(), rp(60_000));

        let second = db
            .payments()
            .record(&kasir(), PaymentTarget::Sale, &sale_id, rp(60_000), Some("Lunas".into()))
            .await
            .unwrap();
        assert_eq!(second.balance.status, PaymentStatus::Paid);

        let err = db
            .payments()
            .record(&kasir(), PaymentTarget::Sale, &sale_id, rp(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Overpayment { .. })));

        let sale = db.sales().get_by_id(&sale_id).await.unwrap();
        assert_eq!(sale.paid_amount, rp(100_000));
        assert_eq!(sale.status, PaymentStatus::Paid);

        let payments = db.payments().payments_for(PaymentTarget::Sale, &sale_id).await.unwrap();
        assert_eq!(payments.len(), 2);
        let sum: Money = payments.iter().map(|p| p.amount).sum();
        assert_eq!(sum, sale.paid_amount);
    }

    #[tokio::test]
    async fn test_invalid_amount_and_unknown_target() {
        let db = database().await;

        let err = db
            .payments()
            .record(&kasir(), PaymentTarget::Purchase, "nope", rp(1_000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        let budi = member(&db, "KOP-0002", 0).await;
        let beras = stocked_product(&db, "BRS-5KG", 50_000, 10).await;
        let mut cart = Cart::new();
        cart.add_line(&beras, 1, None).unwrap();
        let receipt = db
            .sales()
            .checkout(
                &kasir(),
                CheckoutRequest {
                    cart,
                    member_id: Some(budi.id.clone()),
                    terms: SaleTerms::kredit(Money::zero(), due_in(7)),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let err = db
            .payments()
            .record(&kasir(), PaymentTarget::Sale, &receipt.sale.id, rp(0), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), koperasi_core::ErrorKind::Validation);
        assert!(db
            .payments()
            .payments_for(PaymentTarget::Sale, &receipt.sale.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_sale_takes_no_payment() {
        let db = database().await;
        let budi = member(&db, "KOP-0002", 0).await;
        let beras = stocked_product(&db, "BRS-5KG", 50_000, 10).await;
        let mut cart = Cart::new();
        cart.add_line(&beras, 1, None).unwrap();
        let receipt = db
            .sales()
            .checkout(
                &kasir(),
                CheckoutRequest {
                    cart,
                    member_id: Some(budi.id.clone()),
                    terms: SaleTerms::kredit(Money::zero(), due_in(7)),
                    notes: None,
                },
            )
            .await
            .unwrap();
        db.sales().cancel(&kasir(), &receipt.sale.id).await.unwrap();

        let err = db
            .payments()
            .record(&kasir(), PaymentTarget::Sale, &receipt.sale.id, rp(1_000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InvalidStatusTransition { .. })));
    }
}
