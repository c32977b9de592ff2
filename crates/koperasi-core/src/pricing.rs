//! # Pricing Engine
//!
//! Turns priced lines plus an order-level discount into the amounts a sale
//! records.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each line:  gross = quantity × unit_price                          │
//! │                  line_total = gross − line_discount                     │
//! │                                                                         │
//! │  subtotal      = Σ line_total                                          │
//! │  order disc.   = Amount(a)      → a                                    │
//! │                  Percentage(p)  → subtotal − floor(subtotal × (1 − p)) │
//! │  final_amount  = subtotal − order discount          (must be ≥ 0)      │
//! │  tax_amount    = PPN contained in final_amount      (informational)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shelf prices are tax-inclusive, so PPN is carved out of the final amount
//! rather than added on top.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::TaxRate;
use crate::validation::validate_bps;
use crate::BPS_SCALE;

// =============================================================================
// Order Discount
// =============================================================================

/// Discount applied to the whole order: an amount XOR a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDiscount {
    #[default]
    None,
    /// Fixed Rupiah amount.
    Amount(Money),
    /// Basis points of the subtotal (1000 = 10%).
    Percentage(u32),
}

impl OrderDiscount {
    /// Checks the discount's own shape, independent of any subtotal.
    pub fn validate(&self) -> CoreResult<()> {
        match *self {
            OrderDiscount::None => Ok(()),
            OrderDiscount::Amount(amount) => {
                if amount.is_negative() {
                    return Err(ValidationError::non_negative("discount").into());
                }
                Ok(())
            }
            OrderDiscount::Percentage(bps) => Ok(validate_bps("discount", bps)?),
        }
    }

    /// Resolves the discount against a subtotal.
    ///
    /// ## Errors
    /// `DiscountExceedsSubtotal` when an amount discount is larger than the
    /// subtotal.
    pub fn resolve(&self, subtotal: Money) -> CoreResult<Money> {
        self.validate()?;

        match *self {
            OrderDiscount::None => Ok(Money::zero()),
            OrderDiscount::Amount(amount) => {
                if amount > subtotal {
                    return Err(CoreError::DiscountExceedsSubtotal {
                        subtotal,
                        discount: amount,
                    });
                }
                Ok(amount)
            }
            OrderDiscount::Percentage(bps) => {
                let kept = subtotal.percentage_floor(BPS_SCALE as u32 - bps);
                Ok(subtotal - kept)
            }
        }
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Amounts for one priced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub quantity: i64,
    pub unit_price: Money,
    pub line_discount: Money,
}

impl LineAmounts {
    /// `quantity × unit_price`.
    pub fn gross(&self) -> CoreResult<Money> {
        Ok(self.unit_price.multiply_quantity(self.quantity)?)
    }

    /// Gross minus the line discount.
    ///
    /// ## Errors
    /// A negative discount is a validation error; a discount above gross is
    /// `DiscountExceedsSubtotal`.
    pub fn total(&self) -> CoreResult<Money> {
        if self.line_discount.is_negative() {
            return Err(ValidationError::non_negative("line discount").into());
        }
        let gross = self.gross()?;
        if self.line_discount > gross {
            return Err(CoreError::DiscountExceedsSubtotal {
                subtotal: gross,
                discount: self.line_discount,
            });
        }
        Ok(gross - self.line_discount)
    }
}

/// Result of pricing a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    /// Σ quantity × unit_price.
    pub gross_total: Money,
    pub line_discount_total: Money,
    /// Σ line totals (gross minus line discounts).
    pub subtotal: Money,
    pub order_discount: Money,
    /// Line discounts plus the order discount.
    pub discount_total: Money,
    /// PPN contained in `final_amount`.
    pub tax_amount: Money,
    pub final_amount: Money,
}

/// Prices a set of lines. Pure: nothing is mutated.
pub fn compute_totals<I>(lines: I, discount: OrderDiscount, tax: TaxRate) -> CoreResult<CartTotals>
where
    I: IntoIterator<Item = LineAmounts>,
{
    let mut item_count = 0;
    let mut total_quantity = 0;
    let mut gross_total = Money::zero();
    let mut line_discount_total = Money::zero();
    let mut subtotal = Money::zero();

    for line in lines {
        let line_total = line.total()?;
        item_count += 1;
        total_quantity += line.quantity;
        gross_total = gross_total.checked_add(line.gross()?)?;
        line_discount_total += line.line_discount;
        subtotal = subtotal.checked_add(line_total)?;
    }

    let order_discount = discount.resolve(subtotal)?;
    let final_amount = subtotal - order_discount;

    Ok(CartTotals {
        item_count,
        total_quantity,
        gross_total,
        line_discount_total,
        subtotal,
        order_discount,
        discount_total: line_discount_total + order_discount,
        tax_amount: final_amount.inclusive_tax(tax.bps()),
        final_amount,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
