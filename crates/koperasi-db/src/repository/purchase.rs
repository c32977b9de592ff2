//! # Purchase Repository
//!
//! Goods received from suppliers ("pembelian").
//!
//! ## Purchase Entry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Purchase Entry Flow                               │
//! │                                                                         │
//! │  NewPurchase { supplier, type, items[], paid, due_date }               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  total = Σ quantity × unit_cost                                        │
//! │  open_purchase(type, total, paid, due)                                 │
//! │    TUNAI       paid == total                                           │
//! │    KREDIT      due date required, paid 0..total                        │
//! │    KONSINYASI  paid 0, due date optional                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │   ├── INSERT purchases (PB-YYYYMMDD-NNNN, remaining_debt)              │
//! │   ├── INSERT purchase_items                                            │
//! │   ├── apply_plan: one IN per item        stock + ledger                │
//! │   ├── UPDATE products purchase/selling price snapshot                  │
//! │   └── INSERT payments (paid at entry)                                  │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use koperasi_core::envelope::{ApiResponse, PageRequest};
use koperasi_core::numbering::DocumentKind;
use koperasi_core::settlement::{cancel, open_purchase, Balance};
use koperasi_core::stock::StockPlanner;
use koperasi_core::validation::{validate_price, validate_quantity};
use koperasi_core::{
    new_id, CoreError, Money, MovementType, Payment, PaymentTarget, Purchase, PurchaseItem,
    PurchaseType, ReturnKind, Session, StockMovement, ValidationError,
};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::payment::insert_payment;
use crate::repository::product::{load_active_product, load_product, update_prices};
use crate::repository::returns::has_approved_returns;
use crate::repository::stock::{apply_plan, movements_for_reference, Reference};
use crate::repository::supplier::load_supplier;
use crate::repository::{begin, business_date, commit, next_document_number};

const PURCHASE_COLUMNS: &str = "id, invoice_number, supplier_id, purchase_type, total_amount, \
     paid_amount, remaining_debt, due_date, status, user_id, notes, created_at, updated_at";

const PURCHASE_ITEM_COLUMNS: &str =
    "id, purchase_id, line_no, product_id, quantity, unit_cost, selling_price, line_total";

/// One received line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchaseItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost: Money,
    /// New shelf price, when the delivery changes it.
    pub selling_price: Option<Money>,
}

/// A purchase as entered by staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchase {
    pub supplier_id: String,
    pub purchase_type: PurchaseType,
    pub items: Vec<NewPurchaseItem>,
    /// Paid at entry (the whole total for TUNAI).
    pub paid_amount: Money,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl NewPurchase {
    fn validate(&self) -> DbResult<Money> {
        if self.items.is_empty() {
            return Err(ValidationError::Required {
                field: "items".to_string(),
            }
            .into());
        }

        let mut total = Money::zero();
        for item in &self.items {
            validate_quantity(item.quantity)?;
            validate_price("unit_cost", item.unit_cost)?;
            if let Some(price) = item.selling_price {
                validate_price("selling_price", price)?;
            }
            total = total.checked_add(item.unit_cost.multiply_quantity(item.quantity)?)?;
        }

        Ok(total)
    }
}

/// What a committed purchase produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    pub purchase: Purchase,
    pub items: Vec<PurchaseItem>,
    pub movements: Vec<StockMovement>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Commits a purchase with its stock IN movements and price updates.
    ///
    /// ## Errors
    /// - `Validation` for empty or malformed items, or a paid KONSINYASI
    /// - `InsufficientTender` when a TUNAI purchase is not paid in full
    /// - `DueDateRequired` for KREDIT without a valid due date
    /// - `Overpayment` when paid exceeds the total
    /// - `NotFound` / `ProductNotFound` for unknown supplier or products
    pub async fn create(&self, session: &Session, new: NewPurchase) -> DbResult<PurchaseReceipt> {
        let total = new.validate()?;
        let now = Utc::now();
        let today = business_date(now);

        let mut tx = begin(&self.pool).await?;

        load_supplier(&mut tx, &new.supplier_id).await?;
        let (balance, due_date) =
            open_purchase(new.purchase_type, total, new.paid_amount, new.due_date, today)?;

        let mut planner = StockPlanner::new();
        for item in &new.items {
            let product = load_active_product(&mut tx, &item.product_id).await?;
            planner.observe(&product.id, product.stock);
            planner.plan(&product.id, &product.sku, MovementType::In, item.quantity)?;
        }

        let invoice_number =
            next_document_number(&mut tx, DocumentKind::Purchase, "purchases", "invoice_number", today)
                .await?;

        let purchase = Purchase {
            id: new_id(),
            invoice_number,
            supplier_id: new.supplier_id.clone(),
            purchase_type: new.purchase_type,
            total_amount: balance.total,
            paid_amount: balance.paid,
            remaining_debt: balance.remaining(),
            due_date,
            status: balance.status,
            user_id: session.user_id.clone(),
            notes: new.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        insert_purchase(&mut tx, &purchase).await?;

        let mut items = Vec::with_capacity(new.items.len());
        for (index, line) in new.items.iter().enumerate() {
            let item = PurchaseItem {
                id: new_id(),
                purchase_id: purchase.id.clone(),
                line_no: index as i64 + 1,
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                selling_price: line.selling_price,
                line_total: line.unit_cost.multiply_quantity(line.quantity)?,
            };
            insert_item(&mut tx, &item).await?;
            items.push(item);
        }

        let mut movements = Vec::with_capacity(planner.len());
        for plan in planner.into_plans() {
            let movement = apply_plan(
                &mut tx,
                plan,
                Reference::purchase(&purchase.id),
                &session.user_id,
                Some(purchase.invoice_number.clone()),
                now,
            )
            .await?;
            movements.push(movement);
        }

        for line in &new.items {
            update_prices(&mut tx, &line.product_id, line.unit_cost, line.selling_price).await?;
        }

        let payment = if purchase.paid_amount.is_positive() {
            let payment = Payment {
                id: new_id(),
                target: PaymentTarget::Purchase,
                target_id: purchase.id.clone(),
                amount: purchase.paid_amount,
                notes: Some("Paid at entry".to_string()),
                user_id: session.user_id.clone(),
                created_at: now,
            };
            insert_payment(&mut tx, &payment).await?;
            Some(payment)
        } else {
            None
        };

        commit(tx).await?;

        info!(
            invoice = %purchase.invoice_number,
            purchase_type = ?purchase.purchase_type,
            total = %purchase.total_amount,
            remaining = %purchase.remaining_debt,
            "Purchase committed"
        );

        Ok(PurchaseReceipt {
            purchase,
            items,
            movements,
            payment,
        })
    }

    /// Cancels an unpaid purchase, sending its goods back with RETURN_OUT.
    ///
    /// Fails with `InsufficientStock` when the goods were already sold.
    pub async fn cancel(&self, session: &Session, purchase_id: &str) -> DbResult<Purchase> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let purchase = load_purchase(&mut tx, purchase_id).await?;
        let balance = cancel(Balance::new(
            purchase.total_amount,
            purchase.paid_amount,
            purchase.status,
        ))?;
        if has_approved_returns(&mut tx, ReturnKind::Purchase, &purchase.id).await? {
            return Err(CoreError::InvalidStatusTransition {
                entity: "Purchase".to_string(),
                from: "RETURNED".to_string(),
                to: "CANCELLED".to_string(),
            }
            .into());
        }

        let received = movements_for_reference(&mut tx, Reference::purchase(&purchase.id)).await?;
        let mut planner = StockPlanner::new();
        for movement in received.iter().filter(|m| m.movement_type == MovementType::In) {
            let product = load_product(&mut tx, &movement.product_id).await?;
            planner.observe(&product.id, product.stock);
            planner.plan(&product.id, &product.sku, MovementType::ReturnOut, -movement.quantity)?;
        }

        debug!(invoice = %purchase.invoice_number, lines = planner.len(), "Reversing purchase");

        for plan in planner.into_plans() {
            apply_plan(
                &mut tx,
                plan,
                Reference::purchase(&purchase.id),
                &session.user_id,
                Some(format!("Cancelled {}", purchase.invoice_number)),
                now,
            )
            .await?;
        }

        let result = sqlx::query(
            "UPDATE purchases SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(balance.status)
        .bind(now)
        .bind(&purchase.id)
        .bind(purchase.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Purchase", &purchase.id));
        }

        commit(tx).await?;

        info!(invoice = %purchase.invoice_number, user = %session.user_id, "Purchase cancelled");
        self.get_by_id(purchase_id).await
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Purchase> {
        let mut conn = self.pool.acquire().await?;
        load_purchase(&mut conn, id).await
    }

    pub async fn items(&self, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
        let sql = format!(
            "SELECT {PURCHASE_ITEM_COLUMNS} FROM purchase_items WHERE purchase_id = ?1 ORDER BY line_no"
        );
        Ok(sqlx::query_as::<_, PurchaseItem>(&sql)
            .bind(purchase_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn list(&self, page: PageRequest) -> DbResult<ApiResponse<Vec<Purchase>>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases ORDER BY created_at DESC, invoice_number DESC LIMIT ?1 OFFSET ?2"
        );
        let purchases = sqlx::query_as::<_, Purchase>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(ApiResponse::page(purchases, page, total))
    }
}

pub(crate) async fn load_purchase(conn: &mut SqliteConnection, id: &str) -> DbResult<Purchase> {
    let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1");
    sqlx::query_as::<_, Purchase>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Purchase", id))
}

async fn insert_purchase(conn: &mut SqliteConnection, purchase: &Purchase) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchases (
            id, invoice_number, supplier_id, purchase_type, total_amount, paid_amount,
            remaining_debt, due_date, status, user_id, notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&purchase.id)
    .bind(&purchase.invoice_number)
    .bind(&purchase.supplier_id)
    .bind(purchase.purchase_type)
    .bind(purchase.total_amount)
    .bind(purchase.paid_amount)
    .bind(purchase.remaining_debt)
    .bind(purchase.due_date)
    .bind(purchase.status)
    .bind(&purchase.user_id)
    .bind(&purchase.notes)
    .bind(purchase.created_at)
    .bind(purchase.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_item(conn: &mut SqliteConnection, item: &PurchaseItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchase_items (
            id, purchase_id, line_no, product_id, quantity, unit_cost, selling_price, line_total
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&item.id)
    .bind(&item.purchase_id)
    .bind(item.line_no)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_cost)
    .bind(item.selling_price)
    .bind(item.line_total)
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
    use crate::repository::fixtures::{database, due_in, kasir, rp, stocked_product, supplier};
    use koperasi_core::{CoreError, ErrorKind, PaymentStatus, Product};

    fn one_item(product: &Product, quantity: i64, unit_cost: i64) -> Vec<NewPurchaseItem> {
        vec![NewPurchaseItem {
            product_id: product.id.clone(),
            quantity,
            unit_cost: rp(unit_cost),
            selling_price: None,
        }]
    }

    #[tokio::test]
    async fn test_scenario_e_credit_purchase_receives_stock() {
        let db = database().await;
        let sup = supplier(&db, "SUP-001").await;
        let beras = stocked_product(&db, "BRS-5KG", 65_000, 5).await;

        let receipt = db
            .purchases()
            .create(
                &kasir(),
                NewPurchase {
                    supplier_id: sup.id.clone(),
                    purchase_type: PurchaseType::Kredit,
                    items: one_item(&beras, 20, 60_000),
                    paid_amount: Money::zero(),
                    due_date: Some(due_in(30)),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let purchase = &receipt.purchase;
        assert_eq!(purchase.total_amount, rp(1_200_000));
        assert_eq!(purchase.remaining_debt, rp(1_200_000));
        assert_eq!(purchase.status, PaymentStatus::Pending);
        assert!(purchase.invoice_number.starts_with("PB-"));
        assert!(receipt.payment.is_none());

        let movement = &receipt.movements[0];
        assert_eq!(movement.movement_type, MovementType::In);
        assert_eq!(receipt.movements.len(), 1);
        assert_eq!(movement.quantity_before, 5);
        assert_eq!(movement.quantity_after, 25);
        assert_eq!(db.products().get_by_id(&beras.id).await.unwrap().stock, 25);
        assert_eq!(db.purchases().items(&purchase.id).await.unwrap(), receipt.items);
    }

    #[tokio::test]
    async fn test_tunai_purchase_paid_in_full_and_prices_updated() {
        let db = database().await;
        let sup = supplier(&db, "SUP-001").await;
        let gula = stocked_product(&db, "GUL-1KG", 16_000, 0).await;

        let receipt = db
            .purchases()
            .create(
                &kasir(),
                NewPurchase {
                    supplier_id: sup.id.clone(),
                    purchase_type: PurchaseType::Tunai,
                    items: vec![NewPurchaseItem {
                        product_id: gula.id.clone(),
                        quantity: 10,
                        unit_cost: rp(14_500),
                        selling_price: Some(rp(17_000)),
                    }],
                    paid_amount: rp(145_000),
                    due_date: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(receipt.purchase.status, PaymentStatus::Paid);
        assert_eq!(receipt.purchase.remaining_debt, Money::zero());
        assert_eq!(receipt.payment.unwrap().amount, rp(145_000));

        let product = db.products().get_by_id(&gula.id).await.unwrap();
        assert_eq!(product.stock, 10);
        assert_eq!(product.purchase_price, rp(14_500));
        assert_eq!(product.selling_price, rp(17_000));
    }

    #[tokio::test]
    async fn test_purchase_rules() {
        let db = database().await;
        let sup = supplier(&db, "SUP-001").await;
        let beras = stocked_product(&db, "BRS-5KG", 65_000, 0).await;

        let base = NewPurchase {
            supplier_id: sup.id.clone(),
            purchase_type: PurchaseType::Tunai,
            items: one_item(&beras, 2, 50_000),
            paid_amount: rp(99_000),
            due_date: None,
            notes: None,
        };

        let err = db.purchases().create(&kasir(), base.clone()).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientTender { .. })));

        let kredit = NewPurchase {
            purchase_type: PurchaseType::Kredit,
            paid_amount: Money::zero(),
            ..base.clone()
        };
        let err = db.purchases().create(&kasir(), kredit).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::DueDateRequired(_))));

        let konsinyasi = NewPurchase {
            purchase_type: PurchaseType::Konsinyasi,
            paid_amount: rp(1_000),
            ..base.clone()
        };
        let err = db.purchases().create(&kasir(), konsinyasi).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let empty = NewPurchase {
            items: Vec::new(),
            ..base.clone()
        };
        assert!(db.purchases().create(&kasir(), empty).await.is_err());

        let overflowing = NewPurchase {
            items: one_item(&beras, 9_999, i64::MAX / 1_000),
            ..base.clone()
        };
        let err = db.purchases().create(&kasir(), overflowing).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let unknown_supplier = NewPurchase {
            supplier_id: "nope".into(),
            paid_amount: rp(100_000),
            ..base
        };
        let err = db.purchases().create(&kasir(), unknown_supplier).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(db.products().get_by_id(&beras.id).await.unwrap().stock, 0);
    }

    #[tokio::test]
    async fn test_cancel_consignment_returns_goods() {
        let db = database().await;
        let sup = supplier(&db, "SUP-002").await;
        let kopi = stocked_product(&db, "KPI-200", 55_000, 4).await;

        let receipt = db
            .purchases()
            .create(
                &kasir(),
                NewPurchase {
                    supplier_id: sup.id.clone(),
                    purchase_type: PurchaseType::Konsinyasi,
                    items: one_item(&kopi, 6, 45_000),
                    paid_amount: Money::zero(),
                    due_date: None,
                    notes: Some("Titip jual".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.purchase.due_date, None);
        assert_eq!(db.products().get_by_id(&kopi.id).await.unwrap().stock, 10);

        let cancelled = db.purchases().cancel(&kasir(), &receipt.purchase.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);

        let ledger = db.stock().movements_for_product(&kopi.id).await.unwrap();
        let last = ledger.last().unwrap();
        assert_eq!(last.movement_type, MovementType::ReturnOut);
        assert_eq!(last.quantity, -6);
        assert_eq!(db.products().get_by_id(&kopi.id).await.unwrap().stock, 4);
    }
}
