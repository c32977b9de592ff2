//! # koperasi-core: Pure Business Logic for Koperasi POS
//!
//! This crate is the transaction engine of the cooperative's point of sale.
//! Everything here is a pure function over domain values: no database, no
//! network, no clock reads except where a caller hands one in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Koperasi POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Admin Web Frontend (TypeScript)                    │   │
//! │  │   Kasir ──► Pembelian ──► Stok ──► Hutang/Piutang ──► Poin      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ REST (external)                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ koperasi-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │  ┌────────┐ ┌─────────┐ ┌────────────┐ ┌───────┐ ┌──────────┐  │   │
//! │  │  │  cart  │ │ pricing │ │ settlement │ │ stock │ │  points  │  │   │
//! │  │  └────────┘ └─────────┘ └────────────┘ └───────┘ └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 koperasi-db (Transactional Store)               │   │
//! │  │        SQLite, atomic commits, append-only ledgers              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Whole-Rupiah money type (integer arithmetic only)
//! - [`types`] - Domain records (Product, Sale, Purchase, StockMovement, ...)
//! - [`cart`] - In-progress sale lines
//! - [`pricing`] - Subtotal, discounts, PPN and final amount
//! - [`settlement`] - Payment status state machine and settlement rules
//! - [`stock`] - Stock movement planning and approval workflows
//! - [`points`] - Member point accrual, redemption and FIFO expiry
//! - [`numbering`] - Business document numbers (`INV-20261016-0001`)
//! - [`envelope`] - Typed response envelope for list reads
//! - [`error`] / [`validation`] - Domain errors and input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use koperasi_core::cart::Cart;
//! use koperasi_core::pricing::OrderDiscount;
//! use koperasi_core::types::Product;
//! use koperasi_core::Money;
//!
//! let mut beras = Product::new(
//!     "BRS-5KG",
//!     "Beras 5kg",
//!     Money::from_rupiah(60_000),
//!     Money::from_rupiah(65_000),
//! );
//! beras.stock = 10;
//!
//! let mut cart = Cart::new();
//! cart.add_line(&beras, 2, None).unwrap();
//! cart.set_order_discount(OrderDiscount::Percentage(1000)).unwrap(); // 10%
//!
//! let totals = cart.compute_totals().unwrap();
//! assert_eq!(totals.subtotal.rupiah(), 130_000);
//! assert_eq!(totals.final_amount.rupiah(), 117_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod envelope;
pub mod error;
pub mod money;
pub mod numbering;
pub mod points;
pub mod pricing;
pub mod settlement;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
///
/// ## Business Reason
/// Keeps a single checkout within what one receipt can reasonably print.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typing 1000 instead of 10 at the till.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Basis points in 100%.
pub const BPS_SCALE: i64 = 10_000;
