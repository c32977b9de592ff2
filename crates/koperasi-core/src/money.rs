//! # Money Module
//!
//! Provides the `Money` type for handling Rupiah amounts safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    55000 * 0.9 = 49500.00000000001  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Whole Rupiah in i64                                      │
//! │    55000 * 9000 / 10000 = 49500 (integer division floors)              │
//! │    Rupiah has no sub-unit in circulation, so the minor unit IS Rp1     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use koperasi_core::money::Money;
//!
//! let price = Money::from_rupiah(10_000);
//! let line = price.multiply_quantity(3).unwrap(); // Rp30.000
//! let total = line + Money::from_rupiah(25_000);  // Rp55.000
//! assert_eq!(total.to_string(), "Rp55.000");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::validation::ValidationResult;
use crate::BPS_SCALE;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in whole Rupiah.
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values appear in deltas (refunds, discounts)
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **i128 intermediates**: percentage math never overflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from whole Rupiah.
    #[inline]
    pub const fn from_rupiah(rupiah: i64) -> Self {
        Money(rupiah)
    }

    /// Returns the value in whole Rupiah.
    #[inline]
    pub const fn rupiah(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ## Errors
    /// `Overflow` when the product does not fit in an i64.
    ///
    /// ## Example
    /// ```rust
    /// use koperasi_core::money::Money;
    ///
    /// let unit_price = Money::from_rupiah(10_000);
    /// assert_eq!(unit_price.multiply_quantity(3).unwrap().rupiah(), 30_000);
    /// assert!(Money::from_rupiah(i64::MAX / 2).multiply_quantity(3).is_err());
    /// ```
    #[inline]
    pub fn multiply_quantity(&self, qty: i64) -> ValidationResult<Money> {
        self.0
            .checked_mul(qty)
            .map(Money)
            .ok_or_else(|| ValidationError::overflow("amount"))
    }

    /// Adds two amounts, failing instead of wrapping.
    #[inline]
    pub fn checked_add(self, other: Money) -> ValidationResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| ValidationError::overflow("amount"))
    }

    /// Returns `self * bps / 10000`, rounded down.
    ///
    /// Used for percentage discounts, where rounding down in the
    /// customer's favour means the till never overcharges.
    ///
    /// ## Example
    /// ```rust
    /// use koperasi_core::money::Money;
    ///
    /// let subtotal = Money::from_rupiah(55_555);
    /// assert_eq!(subtotal.percentage_floor(9_000).rupiah(), 49_999);
    /// ```
    pub fn percentage_floor(&self, bps: u32) -> Money {
        let scaled = (self.0 as i128 * bps as i128).div_euclid(BPS_SCALE as i128);
        Money(scaled as i64)
    }

    /// Extracts the tax contained in a tax-inclusive amount, rounded down.
    ///
    /// `amount * bps / (10000 + bps)`: for PPN 11% on Rp111.000 the
    /// contained tax is Rp11.000.
    pub fn inclusive_tax(&self, bps: u32) -> Money {
        if bps == 0 {
            return Money::zero();
        }
        let tax = (self.0 as i128 * bps as i128).div_euclid(BPS_SCALE as i128 + bps as i128);
        Money(tax as i64)
    }

    /// Integer division by a per-unit amount, rounded down.
    ///
    /// Returns 0 for a non-positive divisor.
    pub fn units_of(&self, per_unit: Money) -> i64 {
        if per_unit.0 <= 0 || self.0 <= 0 {
            return 0;
        }
        self.0 / per_unit.0
    }

    /// Clamps negative values to zero.
    #[inline]
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money the way a receipt does: `Rp49.500`, `-Rp1.000`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.0.unsigned_abs().to_string();

        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        write!(f, "{}Rp{}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_rupiah(0).to_string(), "Rp0");
        assert_eq!(Money::from_rupiah(500).to_string(), "Rp500");
        assert_eq!(Money::from_rupiah(55_000).to_string(), "Rp55.000");
        assert_eq!(Money::from_rupiah(1_250_000).to_string(), "Rp1.250.000");
        assert_eq!(Money::from_rupiah(-1_000).to_string(), "-Rp1.000");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_rupiah(10_000);
        let b = Money::from_rupiah(2_500);

        assert_eq!((a + b).rupiah(), 12_500);
        assert_eq!((a - b).rupiah(), 7_500);
        assert_eq!(a.multiply_quantity(3).unwrap().rupiah(), 30_000);
        assert_eq!((-b).rupiah(), -2_500);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.rupiah(), 15_000);
    }

    #[test]
    fn test_overflow_is_an_error() {
        let huge = Money::from_rupiah(i64::MAX / 1_000);
        assert!(matches!(
            huge.multiply_quantity(1_001),
            Err(ValidationError::Overflow { .. })
        ));
        assert!(Money::from_rupiah(i64::MAX).checked_add(Money::from_rupiah(1)).is_err());
        assert_eq!(
            Money::from_rupiah(1).checked_add(Money::from_rupiah(2)).unwrap(),
            Money::from_rupiah(3)
        );
    }

    #[test]
    fn test_percentage_floor_rounds_down() {
        assert_eq!(Money::from_rupiah(55_000).percentage_floor(9_000).rupiah(), 49_500);
        // 999 * 0.9 = 899.1 -> 899
        assert_eq!(Money::from_rupiah(999).percentage_floor(9_000).rupiah(), 899);
        assert_eq!(Money::from_rupiah(1_000).percentage_floor(0).rupiah(), 0);
    }

    #[test]
    fn test_inclusive_tax() {
        assert_eq!(Money::from_rupiah(111_000).inclusive_tax(1_100).rupiah(), 11_000);
        assert_eq!(Money::from_rupiah(111_000).inclusive_tax(0).rupiah(), 0);
        // 100 * 1100 / 11100 = 9.9 -> 9
        assert_eq!(Money::from_rupiah(100).inclusive_tax(1_100).rupiah(), 9);
    }

    #[test]
    fn test_units_of() {
        let per_point = Money::from_rupiah(10_000);
        assert_eq!(Money::from_rupiah(120_000).units_of(per_point), 12);
        assert_eq!(Money::from_rupiah(129_999).units_of(per_point), 12);
        assert_eq!(Money::from_rupiah(9_999).units_of(per_point), 0);
        assert_eq!(Money::from_rupiah(9_999).units_of(Money::zero()), 0);
    }

    #[test]
    fn test_zero_and_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_rupiah(1).is_positive());
        assert!(Money::from_rupiah(-1).is_negative());
        assert_eq!(Money::from_rupiah(-5).non_negative(), Money::zero());
    }
}
