//! # Sale Repository
//!
//! Checkout and cancellation of sales.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkout Flow                                    │
//! │                                                                         │
//! │  Kasir clicks "Bayar"                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cart.compute_totals()                    (pure, nothing written)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN TRANSACTION                                                      │
//! │   ├── member check, open_sale(terms)      TUNAI change / KREDIT terms  │
//! │   ├── StockPlanner: one OUT per line      any line short ─► ROLLBACK   │
//! │   ├── INSERT sales (INV-YYYYMMDD-NNNN)                                  │
//! │   ├── INSERT sale_items (line_no 1..n)                                  │
//! │   ├── apply_plan × n                      stock + ledger, version guard│
//! │   ├── INSERT payments (cash / down payment)                             │
//! │   └── earn_points → point ledger          member attached only         │
//! │  COMMIT                                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutReceipt → print struk                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every rule is checked before the first write, so a rejected checkout
//! leaves no sale, no movement and no point entry behind.

use chrono::Utc;
use koperasi_core::cart::Cart;
use koperasi_core::envelope::{ApiResponse, PageRequest};
use koperasi_core::numbering::DocumentKind;
use koperasi_core::points::{earn_points, reverse_earn, PointRate};
use koperasi_core::settlement::{cancel, open_sale, Balance, SaleTerms};
use koperasi_core::stock::StockPlanner;
use koperasi_core::{
    new_id, CoreError, MovementType, Payment, PaymentTarget, PointTransaction, ReturnKind, Sale,
    SaleItem, SaleType, Session, StockMovement,
};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::member::{load_active_member, load_member};
use crate::repository::payment::insert_payment;
use crate::repository::points::{append, earned_by_sale};
use crate::repository::product::{load_active_product, load_product};
use crate::repository::returns::has_approved_returns;
use crate::repository::stock::{apply_plan, movements_for_reference, Reference};
use crate::repository::{begin, business_date, commit, next_document_number};

const SALE_COLUMNS: &str = "id, invoice_number, sale_type, member_id, subtotal, discount_amount, \
     tax_amount, final_amount, paid_amount, change_amount, due_date, status, user_id, notes, \
     created_at, updated_at";

const SALE_ITEM_COLUMNS: &str = "id, sale_id, line_no, product_id, sku_snapshot, name_snapshot, \
     quantity, unit_price, line_discount, line_total";

/// Everything the till hands over at "Bayar".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub cart: Cart,
    pub member_id: Option<String>,
    pub terms: SaleTerms,
    pub notes: Option<String>,
}

/// What a committed checkout produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub movements: Vec<StockMovement>,
    pub payment: Option<Payment>,
    pub points: Option<PointTransaction>,
}

/// Repository for sale database operations.
///
/// ## Usage
/// ```rust,ignore
/// let request = CheckoutRequest {
///     cart,
///     member_id: Some(member.id.clone()),
///     terms: SaleTerms::tunai(Money::from_rupiah(100_000)),
///     notes: None,
/// };
/// let receipt = db.sales().checkout(&session, request).await?;
/// ```
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    point_rate: PointRate,
}

impl SaleRepository {
    /// Creates a new SaleRepository earning points at `point_rate`.
    pub fn new(pool: SqlitePool, point_rate: PointRate) -> Self {
        SaleRepository { pool, point_rate }
    }

    /// Commits a sale: header, lines, stock movements, opening payment and
    /// earned points, all in one transaction.
    ///
    /// ## Errors
    /// - `EmptyCart`, `DiscountExceedsSubtotal` from pricing
    /// - `Validation` for a line with a bad quantity or price, or amounts
    ///   too large to total
    /// - `InsufficientTender`, `MemberRequired`, `DueDateRequired`,
    ///   `Overpayment` from the settlement rules
    /// - `ProductNotFound`, `MemberNotFound`
    /// - `InsufficientStock` when a line no longer fits what is on the shelf
    /// - `ConcurrencyConflict` when another till moved the same stock first
    pub async fn checkout(&self, session: &Session, request: CheckoutRequest) -> DbResult<CheckoutReceipt> {
        let CheckoutRequest {
            cart,
            member_id,
            terms,
            notes,
        } = request;

        if cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }
        cart.validate()?;
        let totals = cart.compute_totals()?;

        let now = Utc::now();
        let today = business_date(now);

        debug!(
            lines = cart.line_count(),
            final_amount = %totals.final_amount,
            sale_type = ?terms.sale_type,
            "Starting checkout"
        );

        let mut tx = begin(&self.pool).await?;

        // ---------------------------------------------------------------------
        // Validate everything before the first write
        // ---------------------------------------------------------------------

        let member = match member_id.as_deref() {
            Some(id) => Some(load_active_member(&mut tx, id).await?),
            None => None,
        };

        let settlement = open_sale(&terms, totals.final_amount, member.is_some(), today)?;

        let mut planner = StockPlanner::new();
        for line in &cart.lines {
            let product = load_active_product(&mut tx, &line.product_id).await?;
            planner.observe(&product.id, product.stock);
            planner.plan(&product.id, &product.sku, MovementType::Out, -line.quantity)?;
        }

        let sale_id = new_id();
        let mut items = Vec::with_capacity(cart.lines.len());
        for (index, line) in cart.lines.iter().enumerate() {
            items.push(SaleItem {
                id: new_id(),
                sale_id: sale_id.clone(),
                line_no: index as i64 + 1,
                product_id: line.product_id.clone(),
                sku_snapshot: line.sku.clone(),
                name_snapshot: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_discount: line.line_discount,
                line_total: line.amounts().total()?,
            });
        }

        let points = earn_points(member.as_ref(), &sale_id, totals.final_amount, &self.point_rate, now);

        // ---------------------------------------------------------------------
        // Write
        // ---------------------------------------------------------------------

        let invoice_number =
            next_document_number(&mut tx, DocumentKind::Sale, "sales", "invoice_number", today).await?;

        let sale = Sale {
            id: sale_id,
            invoice_number,
            sale_type: terms.sale_type,
            member_id: member.as_ref().map(|m| m.id.clone()),
            subtotal: totals.subtotal,
            discount_amount: totals.order_discount,
            tax_amount: totals.tax_amount,
            final_amount: totals.final_amount,
            paid_amount: settlement.balance.paid,
            change_amount: settlement.change,
            due_date: settlement.due_date,
            status: settlement.balance.status,
            user_id: session.user_id.clone(),
            notes,
            created_at: now,
            updated_at: now,
        };

        insert_sale(&mut tx, &sale).await?;
        for item in &items {
            insert_item(&mut tx, item).await?;
        }

        let mut movements = Vec::with_capacity(planner.len());
        for plan in planner.into_plans() {
            let movement = apply_plan(
                &mut tx,
                plan,
                Reference::sale(&sale.id),
                &session.user_id,
                Some(sale.invoice_number.clone()),
                now,
            )
            .await?;
            movements.push(movement);
        }

        let payment = if sale.paid_amount.is_positive() {
            let payment = Payment {
                id: new_id(),
                target: PaymentTarget::Sale,
                target_id: sale.id.clone(),
                amount: sale.paid_amount,
                notes: Some(match sale.sale_type {
                    SaleType::Tunai => "Cash at checkout".to_string(),
                    SaleType::Kredit => "Down payment".to_string(),
                }),
                user_id: session.user_id.clone(),
                created_at: now,
            };
            insert_payment(&mut tx, &payment).await?;
            Some(payment)
        } else {
            None
        };

        if let Some(entry) = &points {
            append(&mut tx, entry).await?;
        }

        commit(tx).await?;

        info!(
            invoice = %sale.invoice_number,
            sale_type = ?sale.sale_type,
            final_amount = %sale.final_amount,
            status = ?sale.status,
            points = points.as_ref().map(|p| p.points).unwrap_or(0),
            "Sale committed"
        );

        Ok(CheckoutReceipt {
            sale,
            items,
            movements,
            payment,
            points,
        })
    }

    /// Cancels a sale that has not received any payment.
    ///
    /// Stock taken by the sale comes back as RETURN_IN movements and earned
    /// points are reversed with an ADJUSTMENT entry charged to their own lot.
    ///
    /// ## Errors
    /// - `InvalidStatusTransition` unless the sale is PENDING with nothing paid
    /// - `InsufficientPoints` when the earned points were already spent
    pub async fn cancel(&self, session: &Session, sale_id: &str) -> DbResult<Sale> {
        let now = Utc::now();
        let mut tx = begin(&self.pool).await?;

        let sale = load_sale(&mut tx, sale_id).await?;
        let balance = cancel(Balance::new(sale.final_amount, sale.paid_amount, sale.status))?;
        if has_approved_returns(&mut tx, ReturnKind::Sales, &sale.id).await? {
            return Err(CoreError::InvalidStatusTransition {
                entity: "Sale".to_string(),
                from: "RETURNED".to_string(),
                to: "CANCELLED".to_string(),
            }
            .into());
        }

        // compensate every OUT this sale wrote
        let taken = movements_for_reference(&mut tx, Reference::sale(&sale.id)).await?;
        let mut planner = StockPlanner::new();
        for movement in taken.iter().filter(|m| m.movement_type == MovementType::Out) {
            let product = load_product(&mut tx, &movement.product_id).await?;
            planner.observe(&product.id, product.stock);
            planner.plan(&product.id, &product.sku, MovementType::ReturnIn, -movement.quantity)?;
        }

        let reversal = match earned_by_sale(&mut tx, &sale.id).await? {
            Some(earned) => {
                let member = load_member(&mut tx, &earned.member_id).await?;
                Some(reverse_earn(
                    &member,
                    &earned,
                    Some(format!("Reversal for cancelled sale {}", sale.invoice_number)),
                    now,
                )?)
            }
            None => None,
        };

        for plan in planner.into_plans() {
            apply_plan(
                &mut tx,
                plan,
                Reference::sale(&sale.id),
                &session.user_id,
                Some(format!("Cancelled {}", sale.invoice_number)),
                now,
            )
            .await?;
        }

        if let Some(entry) = &reversal {
            append(&mut tx, entry).await?;
        }

        let result = sqlx::query(
            "UPDATE sales SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(balance.status)
        .bind(now)
        .bind(&sale.id)
        .bind(sale.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Sale", &sale.id));
        }

        commit(tx).await?;

        info!(invoice = %sale.invoice_number, user = %session.user_id, "Sale cancelled");
        self.get_by_id(sale_id).await
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Sale> {
        let mut conn = self.pool.acquire().await?;
        load_sale(&mut conn, id).await
    }

    /// Gets a sale by invoice number.
    pub async fn get_by_invoice(&self, invoice_number: &str) -> DbResult<Sale> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE invoice_number = ?1");
        sqlx::query_as::<_, Sale>(&sql)
            .bind(invoice_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", invoice_number))
    }

    /// Lines of a sale in line order.
    pub async fn items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let sql = format!("SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no");
        Ok(sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Sales, newest first.
    pub async fn list(&self, page: PageRequest) -> DbResult<ApiResponse<Vec<Sale>>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales ORDER BY created_at DESC, invoice_number DESC LIMIT ?1 OFFSET ?2"
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(ApiResponse::page(sales, page, total))
    }
}

pub(crate) async fn load_sale(conn: &mut SqliteConnection, id: &str) -> DbResult<Sale> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", id))
}

async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sales (
            id, invoice_number, sale_type, member_id, subtotal, discount_amount,
            tax_amount, final_amount, paid_amount, change_amount, due_date, status,
            user_id, notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.invoice_number)
    .bind(sale.sale_type)
    .bind(&sale.member_id)
    .bind(sale.subtotal)
    .bind(sale.discount_amount)
    .bind(sale.tax_amount)
    .bind(sale.final_amount)
    .bind(sale.paid_amount)
    .bind(sale.change_amount)
    .bind(sale.due_date)
    .bind(sale.status)
    .bind(&sale.user_id)
    .bind(&sale.notes)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, line_no, product_id, sku_snapshot, name_snapshot,
            quantity, unit_price, line_discount, line_total
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(item.line_no)
    .bind(&item.product_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.line_discount)
    .bind(item.line_total)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
