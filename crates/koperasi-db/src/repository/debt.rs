//! # Debt Repository
//!
//! Read-side listings of money still owed:
//!
//! - **receivables**: KREDIT sales, owed by members
//! - **payables**: KREDIT and KONSINYASI purchases, owed to suppliers
//!
//! `DebtStatus` is never stored. It is derived on every read from the
//! payment status and the due date, so OVERDUE appears the morning after the
//! due date without a job having to flip it. Cancelled documents are left
//! out.

use chrono::{DateTime, NaiveDate, Utc};
use koperasi_core::envelope::{ApiResponse, PageRequest};
use koperasi_core::settlement::debt_status;
use koperasi_core::{DebtRecord, Money, PaymentStatus, PaymentTarget};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

#[derive(Debug, FromRow)]
struct DebtRow {
    id: String,
    invoice_number: String,
    party_id: Option<String>,
    total: Money,
    paid: Money,
    due_date: Option<NaiveDate>,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
}

impl DebtRow {
    fn into_record(self, target: PaymentTarget, today: NaiveDate) -> Option<DebtRecord> {
        let status = debt_status(self.status, self.due_date, today)?;
        Some(DebtRecord {
            target,
            id: self.id,
            invoice_number: self.invoice_number,
            party_id: self.party_id,
            total: self.total,
            paid: self.paid,
            remaining: self.total - self.paid,
            due_date: self.due_date,
            status,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DebtRepository {
    pool: SqlitePool,
}

impl DebtRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DebtRepository { pool }
    }

    /// KREDIT sales, soonest due first.
    pub async fn receivables(
        &self,
        today: NaiveDate,
        page: PageRequest,
    ) -> DbResult<ApiResponse<Vec<DebtRecord>>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sales WHERE sale_type = 'KREDIT' AND status != 'CANCELLED'",
        )
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, DebtRow>(
            r#"
            SELECT id, invoice_number, member_id AS party_id, final_amount AS total,
                   paid_amount AS paid, due_date, status, created_at
            FROM sales
            WHERE sale_type = 'KREDIT' AND status != 'CANCELLED'
            ORDER BY status = 'PAID', due_date, invoice_number
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), total, "Listing receivables");

        let records = rows
            .into_iter()
            .filter_map(|row| row.into_record(PaymentTarget::Sale, today))
            .collect();
        Ok(ApiResponse::page(records, page, total))
    }

    /// KREDIT and KONSINYASI purchases, soonest due first.
    pub async fn payables(
        &self,
        today: NaiveDate,
        page: PageRequest,
    ) -> DbResult<ApiResponse<Vec<DebtRecord>>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM purchases \
             WHERE purchase_type IN ('KREDIT', 'KONSINYASI') AND status != 'CANCELLED'",
        )
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, DebtRow>(
            r#"
            SELECT id, invoice_number, supplier_id AS party_id, total_amount AS total,
                   paid_amount AS paid, due_date, status, created_at
            FROM purchases
            WHERE purchase_type IN ('KREDIT', 'KONSINYASI') AND status != 'CANCELLED'
            ORDER BY status = 'PAID', due_date IS NULL, due_date, invoice_number
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), total, "Listing payables");

        let records = rows
            .into_iter()
            .filter_map(|row| row.into_record(PaymentTarget::Purchase, today))
            .collect();
        Ok(ApiResponse::page(records, page, total))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::business_date;
    use crate::repository::fixtures::{database, due_in, kasir, member, rp, stocked_product, supplier};
    use crate::repository::purchase::{NewPurchase, NewPurchaseItem};
    use crate::repository::sale::CheckoutRequest;
    use chrono::Duration;
    use koperasi_core::cart::Cart;
    use koperasi_core::settlement::SaleTerms;
    use koperasi_core::{DebtStatus, PurchaseType};

    #[tokio::test]
    async fn test_receivables_derive_overdue() {
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
                    terms: SaleTerms::kredit(rp(20_000), due_in(7)),
                    notes: None,
                },
            )
            .await
            .unwrap();

        // a cash sale never shows up
        let mut cash = Cart::new();
        cash.add_line(&beras, 1, None).unwrap();
        db.sales()
            .checkout(
                &kasir(),
                CheckoutRequest {
                    cart: cash,
                    member_id: None,
                    terms: SaleTerms::tunai(rp(50_000)),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let today = business_date(Utc::now());
        let listing = db.debts().receivables(today, PageRequest::default()).await.unwrap();
        assert_eq!(listing.data.len(), 1);
        let record = &listing.data[0];
        assert_eq!(record.id, receipt.sale.id);
        assert_eq!(record.party_id.as_deref(), Some(budi.id.as_str()));
        assert_eq!(record.remaining, rp(80_000));
        assert_eq!(record.status, DebtStatus::Partial);

        let later = today + Duration::days(8);
        let listing = db.debts().receivables(later, PageRequest::default()).await.unwrap();
        assert_eq!(listing.data[0].status, DebtStatus::Overdue);
    }

    #[tokio::test]
    async fn test_payables_skip_cancelled() {
        let db = database().await;
        let sup = supplier(&db, "SUP-001").await;
        let kopi = stocked_product(&db, "KPI-200", 55_000, 0).await;

        let entry = |purchase_type, due_date| NewPurchase {
            supplier_id: sup.id.clone(),
            purchase_type,
            items: vec![NewPurchaseItem {
                product_id: kopi.id.clone(),
                quantity: 2,
                unit_cost: rp(45_000),
                selling_price: None,
            }],
            paid_amount: Money::zero(),
            due_date,
            notes: None,
        };

        let kredit = db
            .purchases()
            .create(&kasir(), entry(PurchaseType::Kredit, Some(due_in(14))))
            .await
            .unwrap();
        let konsinyasi = db
            .purchases()
            .create(&kasir(), entry(PurchaseType::Konsinyasi, None))
            .await
            .unwrap();
        db.purchases().cancel(&kasir(), &konsinyasi.purchase.id).await.unwrap();

        let today = business_date(Utc::now());
        let listing = db.debts().payables(today, PageRequest::default()).await.unwrap();
        assert_eq!(listing.data.len(), 1);
        assert_eq!(listing.data[0].id, kredit.purchase.id);
        assert_eq!(listing.data[0].status, DebtStatus::Pending);
        assert_eq!(listing.pagination.unwrap().total, 1);
    }
}
