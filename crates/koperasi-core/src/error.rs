//! # Error Types
//!
//! Domain-specific error types for koperasi-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  koperasi-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - Input shape/range failures                     │
//! │                                                                         │
//! │  koperasi-db errors (separate crate)                                   │
//! │  └── DbError          - Conflicts and persistence failures             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → REST layer → UI toast   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error maps to an [`ErrorKind`] so the caller can tell a rejected
//! commit (fix the input) from a conflict (retry) or a storage failure
//! (generic "try again").

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad input shape or range. The user must correct the request.
    Validation,
    /// Input is well-formed but a business rule rejects it.
    BusinessRule,
    /// A referenced record does not exist.
    NotFound,
    /// Optimistic concurrency check failed. Retry the whole commit.
    Conflict,
    /// Storage failed mid-transaction; nothing was applied.
    Persistence,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the engines.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found or is inactive.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Member cannot be found or is inactive.
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// Adding to the cart would exceed what is on the shelf.
    ///
    /// ## User Workflow
    /// ```text
    /// Scan "Minyak Goreng 2L" (qty: 6)
    ///      │
    ///      ▼
    /// Check stock: available=5
    ///      │
    ///      ▼
    /// OutOfStock { sku: "MYK-2L", available: 5, requested: 6 }
    ///      │
    ///      ▼
    /// UI shows: "Stok MYK-2L tinggal 5"
    /// ```
    #[error("Out of stock for {sku}: available {available}, requested {requested}")]
    OutOfStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A stock movement would take the ledger below zero.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Payment exceeds the remaining balance.
    #[error("Payment of {attempted} exceeds remaining balance {remaining}")]
    Overpayment { remaining: Money, attempted: Money },

    /// Cash handed over does not cover a TUNAI sale.
    #[error("Tendered {tendered} does not cover {required}")]
    InsufficientTender { required: Money, tendered: Money },

    /// Member does not hold enough points.
    #[error("Insufficient points: available {available}, requested {requested}")]
    InsufficientPoints { available: i64, requested: i64 },

    /// A status transition the state machine does not allow.
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Discounts add up to more than the goods are worth.
    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { subtotal: Money, discount: Money },

    /// Cart line index is out of range.
    #[error("Cart line {0} does not exist")]
    LineNotFound(usize),

    /// Checkout attempted with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Credit transactions need a due date on or after the transaction date.
    #[error("{0} requires a valid due date")]
    DueDateRequired(String),

    /// Credit sales are only extended to members.
    #[error("KREDIT sales require a member")]
    MemberRequired,

    /// A return asks for more than was transacted and not yet returned.
    #[error("Return quantity {requested} exceeds returnable {returnable} for {sku}")]
    ReturnExceedsTransacted {
        sku: String,
        returnable: i64,
        requested: i64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ProductNotFound(_) | CoreError::MemberNotFound(_) => ErrorKind::NotFound,
            CoreError::Validation(_) | CoreError::LineNotFound(_) | CoreError::EmptyCart => {
                ErrorKind::Validation
            }
            _ => ErrorKind::BusinessRule,
        }
    }

    /// Shorthand for [`CoreError::InvalidStatusTransition`].
    pub fn transition(entity: &str, from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        CoreError::InvalidStatusTransition {
            entity: entity.to_string(),
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive (quantity, payment amount, points).
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, bad SKU characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Arithmetic on the value would overflow.
    #[error("{field} is too large")]
    Overflow { field: String },
}

impl ValidationError {
    pub fn positive(field: &str) -> Self {
        ValidationError::MustBePositive {
            field: field.to_string(),
        }
    }

    pub fn non_negative(field: &str) -> Self {
        ValidationError::MustNotBeNegative {
            field: field.to_string(),
        }
    }

    pub fn overflow(field: &str) -> Self {
        ValidationError::Overflow {
            field: field.to_string(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "MYK-2L".to_string(),
            available: 5,
            requested: 6,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for MYK-2L: available 5, requested 6"
        );

        let err = CoreError::Overpayment {
            remaining: Money::zero(),
            attempted: Money::from_rupiah(1_000),
        };
        assert_eq!(
            err.to_string(),
            "Payment of Rp1.000 exceeds remaining balance Rp0"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(
            ValidationError::positive("quantity").to_string(),
            "quantity must be positive"
        );
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::positive("amount").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CoreError::ProductNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::InsufficientPoints {
                available: 1,
                requested: 2
            }
            .kind(),
            ErrorKind::BusinessRule
        );
    }
}
