//! # Domain Types
//!
//! Core domain records used throughout Koperasi POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Directories            Transactions              Ledgers (append-only) │
//! │  ───────────            ────────────              ───────────────────── │
//! │  Product  ◄──────────── Sale ──► SaleItem[]       StockMovement         │
//! │  Member   ◄──────────── Purchase ──► PurchaseItem[]  PointTransaction   │
//! │  Supplier               Payment (SALE|PURCHASE)                         │
//! │                         StockAdjustment / StockReturn (approval flow)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every record has:
//! - `id`: UUID v4, immutable, used for relations
//! - A business number where people need one (sku, invoice_number, ...)
//!
//! Enum wire names follow the cooperative's vocabulary (`TUNAI`, `KREDIT`,
//! `RETURN_IN`, ...) in both JSON and the database.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

/// Generates a new record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Session
// =============================================================================

/// The operator performing a mutation.
///
/// Passed explicitly into every commit; its `user_id` is stamped on stock
/// movements, payments and approvals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1100 = PPN 11%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// How a sale is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleType {
    /// Cash, settled in full at checkout.
    Tunai,
    /// Credit, settled over time against a due date.
    Kredit,
}

/// How a purchase from a supplier is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseType {
    Tunai,
    Kredit,
    /// Consignment: paid as the goods sell.
    Konsinyasi,
}

/// Stored payment status of a sale or purchase.
///
/// Transitions are owned by [`crate::settlement`]; nothing else writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Cancelled,
}

/// Read-time status of a debt or receivable. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
}

/// What a payment settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentTarget {
    Sale,
    Purchase,
}

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    ReturnIn,
    ReturnOut,
}

/// What caused a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Purchase,
    Sale,
    Adjustment,
    Return,
}

/// Approval workflow status for adjustments and returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Direction of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnKind {
    /// A member brings goods back; stock comes in.
    Sales,
    /// Goods go back to the supplier; stock leaves.
    Purchase,
}

/// Kind of point ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointTxType {
    Earn,
    Redeem,
    Adjustment,
    Expired,
}

// =============================================================================
// Directories
// =============================================================================

/// A product on the shelf.
///
/// `stock` is only ever changed by applying a [`StockMovement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    /// Stock Keeping Unit, unique.
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub category_id: Option<String>,
    /// Selling unit ("pcs", "kg", "dus").
    pub unit: String,
    pub purchase_price: Money,
    pub selling_price: Money,
    pub stock: i64,
    pub min_stock: i64,
    pub is_active: bool,
    /// Optimistic concurrency counter, bumped on every stock write.
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates an active product with zero stock.
    ///
    /// Opening stock must enter through a purchase or an adjustment.
    pub fn new(
        sku: impl Into<String>,
        name: impl Into<String>,
        purchase_price: Money,
        selling_price: Money,
    ) -> Self {
        let now = Utc::now();
        Product {
            id: new_id(),
            sku: sku.into(),
            barcode: None,
            name: name.into(),
            category_id: None,
            unit: "pcs".to_string(),
            purchase_price,
            selling_price,
            stock: 0,
            min_stock: 0,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when stock has fallen to or below the reorder level.
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

/// A cooperative member (customer with points and credit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub member_number: String,
    pub name: String,
    pub phone: Option<String>,
    pub points_balance: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn new(member_number: impl Into<String>, name: impl Into<String>) -> Self {
        Member {
            id: new_id(),
            member_number: member_number.into(),
            name: name.into(),
            phone: None,
            points_balance: 0,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A supplier goods are purchased from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: String,
    pub code: String,
    pub name: String,
    pub phone: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Supplier {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Supplier {
            id: new_id(),
            code: code.into(),
            name: name.into(),
            phone: None,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A committed sale. The line set is immutable after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub invoice_number: String,
    pub sale_type: SaleType,
    pub member_id: Option<String>,
    /// Sum of line totals (after line discounts).
    pub subtotal: Money,
    /// Order-level discount.
    pub discount_amount: Money,
    /// PPN contained in `final_amount`.
    pub tax_amount: Money,
    pub final_amount: Money,
    pub paid_amount: Money,
    /// Cash returned for TUNAI sales.
    pub change_amount: Money,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub user_id: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    /// Amount still owed.
    pub fn remaining(&self) -> Money {
        (self.final_amount - self.paid_amount).non_negative()
    }
}

/// A line of a committed sale.
/// Product data is frozen at the time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// 1-based position; stock movements are applied in this order.
    pub line_no: i64,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_discount: Money,
    /// `quantity * unit_price - line_discount`.
    pub line_total: Money,
}

// =============================================================================
// Purchase
// =============================================================================

/// Goods received from a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub invoice_number: String,
    pub supplier_id: String,
    pub purchase_type: PurchaseType,
    pub total_amount: Money,
    pub paid_amount: Money,
    /// `total_amount - paid_amount`.
    pub remaining_debt: Money,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub user_id: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost: Money,
    /// New shelf price recorded with this delivery, if any.
    pub selling_price: Option<Money>,
    pub line_total: Money,
}

// =============================================================================
// Payment
// =============================================================================

/// A payment towards a sale (receivable) or purchase (debt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub target: PaymentTarget,
    pub target_id: String,
    pub amount: Money,
    pub notes: Option<String>,
    pub user_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Read model of an open receivable (KREDIT sale) or debt (purchase).
///
/// `status` is derived when read; OVERDUE never reaches the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DebtRecord {
    pub target: PaymentTarget,
    /// Sale or purchase id.
    pub id: String,
    pub invoice_number: String,
    /// Member (receivable) or supplier (debt).
    pub party_id: Option<String>,
    pub total: Money,
    pub paid: Money,
    pub remaining: Money,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
    pub status: DebtStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock
// =============================================================================

/// One immutable stock ledger entry.
///
/// Invariant: `quantity_after == quantity_before + quantity` and
/// `quantity_after >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub movement_type: MovementType,
    /// Signed delta.
    pub quantity: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reference_type: ReferenceType,
    pub reference_id: String,
    pub user_id: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A requested stock correction (stock opname result, breakage, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub id: String,
    pub adjustment_number: String,
    pub product_id: String,
    /// Signed quantity applied on approval.
    pub quantity: i64,
    pub reason: String,
    pub status: ApprovalStatus,
    pub requested_by: String,
    pub decided_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

/// A requested return of goods against a sale or purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockReturn {
    pub id: String,
    pub return_number: String,
    pub kind: ReturnKind,
    /// Sale id for `Sales`, purchase id for `Purchase`.
    pub source_id: String,
    pub product_id: String,
    /// Units returned (always positive).
    pub quantity: i64,
    pub reason: String,
    pub status: ApprovalStatus,
    pub requested_by: String,
    pub decided_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Points
// =============================================================================

/// One immutable point ledger entry.
///
/// Invariant: `points_after == points_before + points`, `points_after >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    pub id: String,
    pub member_id: String,
    pub tx_type: PointTxType,
    pub points: i64,
    pub points_before: i64,
    pub points_after: i64,
    /// When an EARN lot lapses.
    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Sale that produced an EARN entry.
    pub sale_id: Option<String>,
    /// EARN lot retired by an EXPIRED entry.
    pub lot_id: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_product_starts_empty() {
        let p = Product::new("GUL-1KG", "Gula 1kg", Money::from_rupiah(14_000), Money::from_rupiah(16_000));
        assert_eq!(p.stock, 0);
        assert_eq!(p.version, 0);
        assert!(p.is_active);
        assert!(p.is_low_stock());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&SaleType::Kredit).unwrap(), "\"KREDIT\"");
        assert_eq!(
            serde_json::to_string(&MovementType::ReturnIn).unwrap(),
            "\"RETURN_IN\""
        );
        assert_eq!(
            serde_json::from_str::<PurchaseType>("\"KONSINYASI\"").unwrap(),
            PurchaseType::Konsinyasi
        );
    }

    #[test]
    fn test_sale_remaining() {
        let now = Utc::now();
        let sale = Sale {
            id: new_id(),
            invoice_number: "INV-20261016-0001".into(),
            sale_type: SaleType::Kredit,
            member_id: Some("m".into()),
            subtotal: Money::from_rupiah(100_000),
            discount_amount: Money::zero(),
            tax_amount: Money::zero(),
            final_amount: Money::from_rupiah(100_000),
            paid_amount: Money::from_rupiah(40_000),
            change_amount: Money::zero(),
            due_date: None,
            status: PaymentStatus::Partial,
            user_id: "u".into(),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(sale.remaining().rupiah(), 60_000);
    }
}
