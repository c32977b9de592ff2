//! # Settlement Engine
//!
//! Payment rules and the payment status state machine shared by sales
//! (receivables) and purchases (debts).
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            payment < remaining        payment == remaining             │
//! │   PENDING ─────────────────► PARTIAL ─────────────────► PAID           │
//! │      │  │                      │  ▲                        (terminal)   │
//! │      │  │                      └──┘ payment < remaining                 │
//! │      │  └──────────────────────────────────────────────► PAID          │
//! │      │            payment == remaining                                  │
//! │      │                                                                  │
//! │      └── cancel (no payments yet) ─────────────────────► CANCELLED     │
//! │                                                            (terminal)   │
//! │                                                                         │
//! │  OVERDUE is not a stored state: see `debt_status()`                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `PaymentStatus::apply` is the only place a status changes. Everything
//! else in the workspace asks it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{DebtStatus, PaymentStatus, PurchaseType, SaleType};
use crate::validation::validate_payment_amount;

// =============================================================================
// Transitions
// =============================================================================

impl PaymentStatus {
    /// The status a balance of `paid` out of `total` sits in.
    pub fn for_amounts(total: Money, paid: Money) -> PaymentStatus {
        if paid >= total {
            PaymentStatus::Paid
        } else if paid.is_positive() {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }

    /// Validates and performs a transition.
    ///
    /// ## Allowed
    /// - PENDING → PARTIAL | PAID | CANCELLED
    /// - PARTIAL → PARTIAL | PAID
    ///
    /// PAID and CANCELLED are terminal.
    pub fn apply(self, next: PaymentStatus) -> CoreResult<PaymentStatus> {
        use PaymentStatus::*;

        match (self, next) {
            (Pending, Partial) | (Pending, Paid) | (Pending, Cancelled) => Ok(next),
            (Partial, Partial) | (Partial, Paid) => Ok(next),
            (from, to) => Err(CoreError::transition("payment status", from, to)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Cancelled)
    }
}

// =============================================================================
// Balance
// =============================================================================

/// Settlement state of one sale or purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub total: Money,
    pub paid: Money,
    pub status: PaymentStatus,
}

impl Balance {
    /// Rebuilds a balance from stored columns.
    pub fn new(total: Money, paid: Money, status: PaymentStatus) -> Self {
        Balance {
            total,
            paid,
            status,
        }
    }

    /// Amount still owed.
    pub fn remaining(&self) -> Money {
        (self.total - self.paid).non_negative()
    }
}

/// Records a payment against a balance.
///
/// ## Errors
/// - `Validation(MustBePositive)` when amount <= 0
/// - `InvalidStatusTransition` on a cancelled balance
/// - `Overpayment` when amount > remaining (always, once PAID)
///
/// ## Example
/// ```rust
/// use koperasi_core::money::Money;
/// use koperasi_core::settlement::{record_payment, Balance};
/// use koperasi_core::PaymentStatus;
///
/// let credit = Balance::new(Money::from_rupiah(100_000), Money::zero(), PaymentStatus::Pending);
/// let after = record_payment(credit, Money::from_rupiah(40_000)).unwrap();
/// assert_eq!(after.status, PaymentStatus::Partial);
/// assert_eq!(after.remaining().rupiah(), 60_000);
/// ```
pub fn record_payment(balance: Balance, amount: Money) -> CoreResult<Balance> {
    validate_payment_amount(amount)?;

    if balance.status == PaymentStatus::Cancelled {
        return Err(CoreError::transition(
            "payment status",
            balance.status,
            PaymentStatus::Partial,
        ));
    }

    let remaining = balance.remaining();
    if amount > remaining {
        return Err(CoreError::Overpayment {
            remaining,
            attempted: amount,
        });
    }

    let paid = balance.paid + amount;
    let status = balance
        .status
        .apply(PaymentStatus::for_amounts(balance.total, paid))?;

    Ok(Balance {
        total: balance.total,
        paid,
        status,
    })
}

/// Cancels a balance that has not received any payment.
pub fn cancel(balance: Balance) -> CoreResult<Balance> {
    if balance.paid.is_positive() {
        return Err(CoreError::transition(
            "payment status",
            PaymentStatus::Partial,
            PaymentStatus::Cancelled,
        ));
    }

    let status = balance.status.apply(PaymentStatus::Cancelled)?;
    Ok(Balance { status, ..balance })
}

// =============================================================================
// Opening Rules
// =============================================================================

/// How the customer pays at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleTerms {
    pub sale_type: SaleType,
    /// Cash handed over (TUNAI) or down payment (KREDIT).
    pub tendered: Money,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
}

impl SaleTerms {
    pub fn tunai(tendered: Money) -> Self {
        SaleTerms {
            sale_type: SaleType::Tunai,
            tendered,
            due_date: None,
        }
    }

    pub fn kredit(down_payment: Money, due_date: NaiveDate) -> Self {
        SaleTerms {
            sale_type: SaleType::Kredit,
            tendered: down_payment,
            due_date: Some(due_date),
        }
    }
}

/// Opening settlement of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleSettlement {
    pub balance: Balance,
    pub change: Money,
    pub due_date: Option<NaiveDate>,
}

/// Applies TUNAI / KREDIT rules to a sale about to be committed.
///
/// ## Rules
/// - TUNAI: tendered >= final amount, change = tendered - final, PAID
/// - KREDIT: member attached, due date on or after `sale_date`,
///   down payment between 0 and the final amount
pub fn open_sale(
    terms: &SaleTerms,
    final_amount: Money,
    has_member: bool,
    sale_date: NaiveDate,
) -> CoreResult<SaleSettlement> {
    if terms.tendered.is_negative() {
        return Err(ValidationError::non_negative("tendered amount").into());
    }

    match terms.sale_type {
        SaleType::Tunai => {
            if terms.tendered < final_amount {
                return Err(CoreError::InsufficientTender {
                    required: final_amount,
                    tendered: terms.tendered,
                });
            }
            Ok(SaleSettlement {
                balance: Balance::new(final_amount, final_amount, PaymentStatus::Paid),
                change: terms.tendered - final_amount,
                due_date: None,
            })
        }
        SaleType::Kredit => {
            if !has_member {
                return Err(CoreError::MemberRequired);
            }
            let due_date = check_due_date("KREDIT sale", terms.due_date, sale_date)?;
            if terms.tendered > final_amount {
                return Err(CoreError::Overpayment {
                    remaining: final_amount,
                    attempted: terms.tendered,
                });
            }
            Ok(SaleSettlement {
                balance: Balance::new(
                    final_amount,
                    terms.tendered,
                    PaymentStatus::for_amounts(final_amount, terms.tendered),
                ),
                change: Money::zero(),
                due_date: Some(due_date),
            })
        }
    }
}

/// Applies TUNAI / KREDIT / KONSINYASI rules to a purchase entry.
///
/// ## Rules
/// - TUNAI: paid in full at entry
/// - KREDIT: due date required; optional down payment
/// - KONSINYASI: starts unpaid, paid as the goods sell; due date optional
pub fn open_purchase(
    purchase_type: PurchaseType,
    total: Money,
    paid: Money,
    due_date: Option<NaiveDate>,
    purchase_date: NaiveDate,
) -> CoreResult<(Balance, Option<NaiveDate>)> {
    if paid.is_negative() {
        return Err(ValidationError::non_negative("paid amount").into());
    }
    if paid > total {
        return Err(CoreError::Overpayment {
            remaining: total,
            attempted: paid,
        });
    }

    let due_date = match purchase_type {
        PurchaseType::Tunai => {
            if paid < total {
                return Err(CoreError::InsufficientTender {
                    required: total,
                    tendered: paid,
                });
            }
            None
        }
        PurchaseType::Kredit => Some(check_due_date("KREDIT purchase", due_date, purchase_date)?),
        PurchaseType::Konsinyasi => {
            if paid.is_positive() {
                return Err(ValidationError::InvalidFormat {
                    field: "paid amount".to_string(),
                    reason: "consignment purchases start unpaid".to_string(),
                }
                .into());
            }
            match due_date {
                Some(_) => Some(check_due_date("KONSINYASI purchase", due_date, purchase_date)?),
                None => None,
            }
        }
    };

    Ok((
        Balance::new(total, paid, PaymentStatus::for_amounts(total, paid)),
        due_date,
    ))
}

fn check_due_date(
    what: &str,
    due_date: Option<NaiveDate>,
    transaction_date: NaiveDate,
) -> CoreResult<NaiveDate> {
    match due_date {
        Some(date) if date >= transaction_date => Ok(date),
        _ => Err(CoreError::DueDateRequired(what.to_string())),
    }
}

// =============================================================================
// Read-time Status
// =============================================================================

/// Derives the debt/receivable status shown in listings.
///
/// Returns `None` for cancelled records, which are not owed at all.
pub fn debt_status(
    status: PaymentStatus,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<DebtStatus> {
    match status {
        PaymentStatus::Cancelled => None,
        PaymentStatus::Paid => Some(DebtStatus::Paid),
        open => match due_date {
            Some(due) if due < today => Some(DebtStatus::Overdue),
            _ if open == PaymentStatus::Partial => Some(DebtStatus::Partial),
            _ => Some(DebtStatus::Pending),
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
