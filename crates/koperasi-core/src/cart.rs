//! # Cart
//!
//! The in-progress sale at the till.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Kasir Action            Cart Method              Effect                │
//! │  ────────────            ───────────              ──────                │
//! │  Scan product ─────────► add_line() ────────────► push / merge line    │
//! │  Change quantity ──────► update_quantity() ─────► lines[i].quantity    │
//! │  Item discount ────────► set_line_discount() ───► lines[i].discount    │
//! │  Order discount ───────► set_order_discount() ──► discount             │
//! │  Remove ───────────────► remove_line() ─────────► lines.remove(i)      │
//! │  Show totals ──────────► compute_totals() ──────► (read only)          │
//! │                                                                         │
//! │  Stock is NEVER touched here. It only changes when the checkout is     │
//! │  committed and the store applies one OUT movement per line.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Every line has quantity > 0
//! - For each product, the cart's total quantity never exceeds the stock seen
//!   when the product was added
//! - Lines keep insertion order; that order is the stock movement order

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{self, CartTotals, LineAmounts, OrderDiscount};
use crate::types::{Product, TaxRate};
use crate::validation::{validate_price, validate_quantity};
use crate::MAX_CART_LINES;

/// A line in the cart.
///
/// Product data is frozen at add time so the till shows a consistent price
/// even if the catalog changes meanwhile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    /// Price locked in when the line was created.
    pub unit_price: Money,
    pub line_discount: Money,
    /// Product stock observed when the line was created.
    pub stock_snapshot: i64,
}

impl CartLine {
    pub fn amounts(&self) -> LineAmounts {
        LineAmounts {
            quantity: self.quantity,
            unit_price: self.unit_price,
            line_discount: self.line_discount,
        }
    }

    /// `quantity × unit_price`.
    pub fn gross(&self) -> CoreResult<Money> {
        self.amounts().gross()
    }
}

/// The shopping cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub lines: Vec<CartLine>,
    pub discount: OrderDiscount,
    pub tax_rate: TaxRate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Cart::new()
    }
}

impl Cart {
    /// Creates a new empty cart.
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            discount: OrderDiscount::None,
            tax_rate: TaxRate::zero(),
            created_at: Utc::now(),
        }
    }

    /// Creates an empty cart that reports PPN at the given rate.
    pub fn with_tax_rate(tax_rate: TaxRate) -> Self {
        Cart {
            tax_rate,
            ..Cart::new()
        }
    }

    /// Adds a product, or merges into an existing line with the same price.
    ///
    /// ## Errors
    /// - `Validation(MustBePositive)` when quantity <= 0
    /// - `ProductNotFound` when the product is inactive
    /// - `OutOfStock` when the cart would hold more than `product.stock`
    /// - `CartTooLarge` when a new line would exceed MAX_CART_LINES
    pub fn add_line(
        &mut self,
        product: &Product,
        quantity: i64,
        unit_price_override: Option<Money>,
    ) -> CoreResult<&CartLine> {
        validate_quantity(quantity)?;

        if !product.is_active {
            return Err(CoreError::ProductNotFound(product.id.clone()));
        }

        let unit_price = unit_price_override.unwrap_or(product.selling_price);
        validate_price("unit price", unit_price)?;

        let in_cart = self.quantity_of(&product.id);
        let requested = in_cart + quantity;
        if requested > product.stock {
            return Err(CoreError::OutOfStock {
                sku: product.sku.clone(),
                available: product.stock,
                requested,
            });
        }

        if let Some(index) = self
            .lines
            .iter()
            .position(|l| l.product_id == product.id && l.unit_price == unit_price)
        {
            let line = &mut self.lines[index];
            let merged = line.quantity + quantity;
            validate_quantity(merged)?;
            line.quantity = merged;
            line.stock_snapshot = product.stock;
            return Ok(&self.lines[index]);
        }

        if self.lines.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            });
        }

        self.lines.push(CartLine {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            quantity,
            unit_price,
            line_discount: Money::zero(),
            stock_snapshot: product.stock,
        });

        // just pushed
        Ok(&self.lines[self.lines.len() - 1])
    }

    /// Removes a line by index.
    pub fn remove_line(&mut self, index: usize) -> CoreResult<CartLine> {
        if index >= self.lines.len() {
            return Err(CoreError::LineNotFound(index));
        }
        Ok(self.lines.remove(index))
    }

    /// Changes a line's quantity, re-checking stock for the whole product.
    pub fn update_quantity(&mut self, index: usize, quantity: i64) -> CoreResult<&CartLine> {
        validate_quantity(quantity)?;

        let line = self.lines.get(index).ok_or(CoreError::LineNotFound(index))?;
        let others = self.quantity_of(&line.product_id) - line.quantity;
        let requested = others + quantity;
        if requested > line.stock_snapshot {
            return Err(CoreError::OutOfStock {
                sku: line.sku.clone(),
                available: line.stock_snapshot,
                requested,
            });
        }

        let gross = line.unit_price.multiply_quantity(quantity)?;
        if line.line_discount > gross {
            return Err(CoreError::DiscountExceedsSubtotal {
                subtotal: gross,
                discount: line.line_discount,
            });
        }

        self.lines[index].quantity = quantity;
        Ok(&self.lines[index])
    }

    /// Sets a line discount (0 <= discount <= line gross).
    pub fn set_line_discount(&mut self, index: usize, discount: Money) -> CoreResult<()> {
        let line = self.lines.get_mut(index).ok_or(CoreError::LineNotFound(index))?;
        LineAmounts {
            line_discount: discount,
            ..line.amounts()
        }
        .total()?;
        line.line_discount = discount;
        Ok(())
    }

    /// Sets the order-level discount. Checked against the subtotal when
    /// totals are computed.
    pub fn set_order_discount(&mut self, discount: OrderDiscount) -> CoreResult<()> {
        discount.validate()?;
        self.discount = discount;
        Ok(())
    }

    /// Re-checks every line against the rules `add_line` enforces.
    ///
    /// A cart that arrives deserialized never went through `add_line`, so
    /// checkout runs this before pricing it.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lines.len() > MAX_CART_LINES {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_LINES,
            });
        }
        for line in &self.lines {
            validate_quantity(line.quantity)?;
            validate_price("unit price", line.unit_price)?;
            line.amounts().total()?;
        }
        self.discount.validate()?;
        Ok(())
    }

    /// Prices the cart. Never mutates stock.
    pub fn compute_totals(&self) -> CoreResult<CartTotals> {
        pricing::compute_totals(
            self.lines.iter().map(CartLine::amounts),
            self.discount,
            self.tax_rate,
        )
    }

    /// Total quantity of one product across all lines.
    pub fn quantity_of(&self, product_id: &str) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Clears all lines and the discount (after commit or cancel).
    pub fn clear(&mut self) {
        self.lines.clear();
        self.discount = OrderDiscount::None;
        self.created_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn product(sku: &str, price: i64, stock: i64) -> Product {
        let mut p = Product::new(sku, format!("Produk {}", sku), Money::from_rupiah(price - 1_000), Money::from_rupiah(price));
        p.stock = stock;
        p
    }

    #[test]
    fn test_scenario_two_lines_no_discount() {
        let mut cart = Cart::new();
        cart.add_line(&product("TLR-10", 10_000, 50), 3, None).unwrap();
        cart.add_line(&product("SBN-25", 25_000, 50), 1, None).unwrap();

        let totals = cart.compute_totals().unwrap();
        assert_eq!(totals.subtotal.rupiah(), 55_000);
        assert_eq!(totals.final_amount.rupiah(), 55_000);
    }

    #[test]
    fn test_scenario_ten_percent_discount() {
        let mut cart = Cart::new();
        cart.add_line(&product("TLR-10", 10_000, 50), 3, None).unwrap();
        cart.add_line(&product("SBN-25", 25_000, 50), 1, None).unwrap();
        cart.set_order_discount(OrderDiscount::Percentage(1_000)).unwrap();

        assert_eq!(cart.compute_totals().unwrap().final_amount.rupiah(), 49_500);
    }

    #[test]
    fn test_add_rejects_non_positive_quantity() {
        let mut cart = Cart::new();
        let err = cart.add_line(&product("A", 1_000, 5), 0, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::MustBePositive { .. })
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_rejects_more_than_stock() {
        let mut cart = Cart::new();
        let p = product("MYK-2L", 30_000, 5);

        let err = cart.add_line(&p, 6, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::OutOfStock {
                available: 5,
                requested: 6,
                ..
            }
        ));

        cart.add_line(&p, 4, None).unwrap();
        let err = cart.add_line(&p, 2, None).unwrap_err();
        assert!(matches!(err, CoreError::OutOfStock { requested: 6, .. }));
        assert_eq!(cart.quantity_of(&p.id), 4);
    }

    #[test]
    fn test_same_product_same_price_merges() {
        let mut cart = Cart::new();
        let p = product("A", 1_000, 10);

        cart.add_line(&p, 2, None).unwrap();
        cart.add_line(&p, 3, None).unwrap();
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.lines[0].quantity, 5);

        // price override starts a separate line
        cart.add_line(&p, 1, Some(Money::from_rupiah(900))).unwrap();
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.quantity_of(&p.id), 6);
    }

    #[test]
    fn test_update_quantity_checks_stock_across_lines() {
        let mut cart = Cart::new();
        let p = product("A", 1_000, 10);
        cart.add_line(&p, 2, None).unwrap();
        cart.add_line(&p, 3, Some(Money::from_rupiah(900))).unwrap();

        assert!(cart.update_quantity(0, 7).is_ok());
        let err = cart.update_quantity(0, 8).unwrap_err();
        assert!(matches!(err, CoreError::OutOfStock { requested: 11, .. }));
        assert!(matches!(
            cart.update_quantity(0, -1).unwrap_err(),
            CoreError::Validation(_)
        ));
        assert!(matches!(
            cart.update_quantity(9, 1).unwrap_err(),
            CoreError::LineNotFound(9)
        ));
    }

    #[test]
    fn test_remove_line() {
        let mut cart = Cart::new();
        cart.add_line(&product("A", 1_000, 10), 1, None).unwrap();
        cart.add_line(&product("B", 2_000, 10), 1, None).unwrap();

        let removed = cart.remove_line(0).unwrap();
        assert_eq!(removed.sku, "A");
        assert_eq!(cart.lines[0].sku, "B");
        assert!(matches!(cart.remove_line(5), Err(CoreError::LineNotFound(5))));
    }

    #[test]
    fn test_line_discount_bounds() {
        let mut cart = Cart::new();
        cart.add_line(&product("A", 1_000, 10), 2, None).unwrap();

        cart.set_line_discount(0, Money::from_rupiah(500)).unwrap();
        assert_eq!(cart.compute_totals().unwrap().final_amount.rupiah(), 1_500);

        assert!(cart.set_line_discount(0, Money::from_rupiah(2_001)).is_err());
        assert!(cart.set_line_discount(0, Money::from_rupiah(-1)).is_err());

        // gross may not drop below the line discount
        cart.set_line_discount(0, Money::from_rupiah(1_500)).unwrap();
        assert!(matches!(
            cart.update_quantity(0, 1),
            Err(CoreError::DiscountExceedsSubtotal { .. })
        ));
        assert_eq!(cart.lines[0].quantity, 2);
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut cart = Cart::new();
        let mut p = product("A", 1_000, 10);
        p.is_active = false;
        assert!(matches!(
            cart.add_line(&p, 1, None),
            Err(CoreError::ProductNotFound(_))
        ));
    }

    #[test]
    fn test_clear() {
        let mut cart = Cart::new();
        cart.add_line(&product("A", 1_000, 10), 1, None).unwrap();
        cart.set_order_discount(OrderDiscount::Amount(Money::from_rupiah(100))).unwrap();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.discount, OrderDiscount::None);
    }

    #[test]
    fn test_validate_catches_lines_edited_outside_add_line() {
        let mut cart = Cart::new();
        cart.add_line(&product("A", 10_000, 10), 2, None).unwrap();
        assert!(cart.validate().is_ok());

        let mut huge = cart.clone();
        huge.lines[0].quantity = i64::MAX / 1_000;
        assert!(matches!(
            huge.validate(),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let mut zero = cart.clone();
        zero.lines[0].quantity = 0;
        assert!(zero.validate().is_err());

        let mut negative = cart;
        negative.lines[0].unit_price = Money::from_rupiah(-1);
        assert!(matches!(
            negative.validate(),
            Err(CoreError::Validation(ValidationError::MustNotBeNegative { .. }))
        ));
    }
}
