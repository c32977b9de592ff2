//! # Point Accrual
//!
//! Member loyalty points: earned on sales, redeemed at the till, corrected by
//! hand, and expired lot by lot.
//!
//! ## Lots and FIFO Expiry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ledger (oldest first)          Open lots after replay                  │
//! │  ─────────────────────          ──────────────────────                  │
//! │  EARN  +12  exp 2026-01-31      lot A: 12 → 2  (REDEEM took 10)         │
//! │  EARN   +8  exp 2026-03-31      lot B:  8                               │
//! │  REDEEM -10                                                             │
//! │                                                                         │
//! │  expire_points(as_of = 2026-02-15)                                      │
//! │      └── EXPIRED  -2  lot_id = A       (B has not lapsed yet)           │
//! │                                                                         │
//! │  Running the sweep again finds lot A retired and emits nothing.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entry chains `points_after = points_before + points` and no entry
//! leaves the balance below zero.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{new_id, Member, PointTransaction, PointTxType};

// =============================================================================
// Rate
// =============================================================================

/// Conversion from spend to points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PointRate {
    /// Rupiah spent per point earned.
    pub amount_per_point: Money,
    /// Days an EARN lot stays valid. `None` never expires.
    pub expiry_days: Option<u32>,
}

impl Default for PointRate {
    fn default() -> Self {
        PointRate {
            amount_per_point: Money::from_rupiah(10_000),
            expiry_days: Some(365),
        }
    }
}

impl PointRate {
    pub fn new(amount_per_point: Money, expiry_days: Option<u32>) -> CoreResult<Self> {
        if !amount_per_point.is_positive() {
            return Err(ValidationError::positive("amount per point").into());
        }
        Ok(PointRate {
            amount_per_point,
            expiry_days,
        })
    }

    /// `floor(amount / amount_per_point)`.
    pub fn points_for(&self, amount: Money) -> i64 {
        amount.units_of(self.amount_per_point)
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expiry_days
            .map(|days| now + Duration::days(i64::from(days)))
    }
}

// =============================================================================
// Ledger Entries
// =============================================================================

fn entry(
    member_id: &str,
    tx_type: PointTxType,
    points: i64,
    before: i64,
    at: DateTime<Utc>,
) -> PointTransaction {
    PointTransaction {
        id: new_id(),
        member_id: member_id.to_string(),
        tx_type,
        points,
        points_before: before,
        points_after: before + points,
        expires_at: None,
        sale_id: None,
        lot_id: None,
        notes: None,
        created_at: at,
    }
}

/// Points earned by a sale.
///
/// Returns `None` for guest sales, inactive members, or when the amount
/// earns nothing. That is not an error.
///
/// ## Example
/// ```rust
/// use koperasi_core::money::Money;
/// use koperasi_core::points::{earn_points, PointRate};
/// use koperasi_core::Member;
///
/// let mut member = Member::new("KOP-0001", "Siti");
/// member.points_balance = 50;
/// let rate = PointRate::new(Money::from_rupiah(10_000), None).unwrap();
///
/// let tx = earn_points(Some(&member), "sale-1", Money::from_rupiah(120_000), &rate, chrono::Utc::now()).unwrap();
/// assert_eq!(tx.points, 12);
/// assert_eq!(tx.points_after, 62);
/// ```
pub fn earn_points(
    member: Option<&Member>,
    sale_id: &str,
    final_amount: Money,
    rate: &PointRate,
    now: DateTime<Utc>,
) -> Option<PointTransaction> {
    let member = member.filter(|m| m.is_active)?;
    let points = rate.points_for(final_amount);
    if points <= 0 {
        return None;
    }

    let mut tx = entry(&member.id, PointTxType::Earn, points, member.points_balance, now);
    tx.expires_at = rate.expiry_from(now);
    tx.sale_id = Some(sale_id.to_string());
    Some(tx)
}

/// Spends points.
///
/// ## Errors
/// - `Validation(MustBePositive)` when points <= 0
/// - `InsufficientPoints` when points > balance
pub fn redeem_points(member: &Member, points: i64, now: DateTime<Utc>) -> CoreResult<PointTransaction> {
    if points <= 0 {
        return Err(ValidationError::positive("points").into());
    }
    if points > member.points_balance {
        return Err(CoreError::InsufficientPoints {
            available: member.points_balance,
            requested: points,
        });
    }

    Ok(entry(&member.id, PointTxType::Redeem, -points, member.points_balance, now))
}

/// Manual correction by staff. Non-zero, never below zero.
pub fn adjust_points(
    member: &Member,
    delta: i64,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> CoreResult<PointTransaction> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "points".to_string(),
        }
        .into());
    }
    if member.points_balance + delta < 0 {
        return Err(CoreError::InsufficientPoints {
            available: member.points_balance,
            requested: -delta,
        });
    }

    let mut tx = entry(&member.id, PointTxType::Adjustment, delta, member.points_balance, now);
    tx.notes = notes;
    Ok(tx)
}

/// Takes back the points an EARN entry granted, charged against that lot.
///
/// ## Errors
/// - `InsufficientPoints` when the member already spent them
pub fn reverse_earn(
    member: &Member,
    earned: &PointTransaction,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> CoreResult<PointTransaction> {
    let mut tx = adjust_points(member, -earned.points, notes, now)?;
    tx.sale_id = earned.sale_id.clone();
    tx.lot_id = Some(earned.id.clone());
    Ok(tx)
}

// =============================================================================
// Expiry
// =============================================================================

#[derive(Debug)]
struct Lot<'a> {
    id: &'a str,
    remaining: i64,
    expires_at: Option<DateTime<Utc>>,
}

/// Replays a member's ledger and returns the lots still holding points,
/// oldest first.
///
/// Positive adjustments open lots that never lapse. A reversal (negative
/// adjustment carrying a `lot_id`) is charged to its own lot first. Any
/// other draw drains the oldest lots first.
fn open_lots(history: &[PointTransaction]) -> VecDeque<Lot<'_>> {
    let mut lots: VecDeque<Lot<'_>> = VecDeque::new();

    fn drain_oldest(lots: &mut VecDeque<Lot<'_>>, mut owed: i64) {
        for lot in lots.iter_mut() {
            if owed == 0 {
                break;
            }
            let take = owed.min(lot.remaining);
            lot.remaining -= take;
            owed -= take;
        }
    }

    for tx in history {
        match tx.tx_type {
            PointTxType::Earn => lots.push_back(Lot {
                id: &tx.id,
                remaining: tx.points,
                expires_at: tx.expires_at,
            }),
            PointTxType::Adjustment if tx.points > 0 => lots.push_back(Lot {
                id: &tx.id,
                remaining: tx.points,
                expires_at: None,
            }),
            PointTxType::Expired => {
                if let Some(lot) = tx
                    .lot_id
                    .as_deref()
                    .and_then(|lot_id| lots.iter_mut().find(|l| l.id == lot_id))
                {
                    lot.remaining = 0;
                }
            }
            PointTxType::Adjustment if tx.lot_id.is_some() => {
                let mut owed = -tx.points;
                if let Some(lot) = tx
                    .lot_id
                    .as_deref()
                    .and_then(|lot_id| lots.iter_mut().find(|l| l.id == lot_id))
                {
                    let take = owed.min(lot.remaining);
                    lot.remaining -= take;
                    owed -= take;
                }
                // the lot was partly redeemed before the reversal
                drain_oldest(&mut lots, owed);
            }
            PointTxType::Redeem | PointTxType::Adjustment => drain_oldest(&mut lots, -tx.points),
        }
        lots.retain(|l| l.remaining > 0);
    }

    lots
}

/// Emits EXPIRED entries for every lot that lapsed before `as_of`.
///
/// `history` is the member's full ledger in the order it was written.
/// Lots are retired oldest first; running the sweep twice emits nothing the
/// second time.
pub fn expire_points(
    member: &Member,
    history: &[PointTransaction],
    as_of: DateTime<Utc>,
) -> Vec<PointTransaction> {
    let mut balance = member.points_balance;
    let mut expired = Vec::new();

    for lot in open_lots(history) {
        let lapsed = matches!(lot.expires_at, Some(at) if at < as_of);
        if !lapsed {
            continue;
        }

        let points = lot.remaining.min(balance);
        if points <= 0 {
            continue;
        }

        let mut tx = entry(&member.id, PointTxType::Expired, -points, balance, as_of);
        tx.lot_id = Some(lot.id.to_string());
        balance = tx.points_after;
        expired.push(tx);
    }

    expired
}

/// Applies a ledger entry to the member snapshot it was computed from.
pub fn apply(member: &mut Member, tx: &PointTransaction) {
    member.points_balance = tx.points_after;
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn member_with(balance: i64) -> Member {
        let mut m = Member::new("KOP-0001", "Siti Aminah");
        m.points_balance = balance;
        m
    }

    fn rate(days: Option<u32>) -> PointRate {
        PointRate::new(Money::from_rupiah(10_000), days).unwrap()
    }

    #[test]
    fn test_earn_twelve_points_on_120k() {
        let member = member_with(50);
        let tx = earn_points(Some(&member), "s1", Money::from_rupiah(120_000), &rate(None), at(2026, 10, 16))
            .unwrap();

        assert_eq!(tx.tx_type, PointTxType::Earn);
        assert_eq!(tx.points, 12);
        assert_eq!(tx.points_before, 50);
        assert_eq!(tx.points_after, 62);
        assert_eq!(tx.sale_id.as_deref(), Some("s1"));
        assert!(tx.expires_at.is_none());
    }

    #[test]
    fn test_earn_is_noop_for_guest_and_small_sales() {
        let member = member_with(0);
        let r = rate(Some(30));
        let now = at(2026, 10, 16);

        assert!(earn_points(None, "s1", Money::from_rupiah(500_000), &r, now).is_none());
        assert!(earn_points(Some(&member), "s1", Money::from_rupiah(9_999), &r, now).is_none());

        let tx = earn_points(Some(&member), "s1", Money::from_rupiah(10_000), &r, now).unwrap();
        assert_eq!(tx.expires_at, Some(at(2026, 11, 15)));
    }

    #[test]
    fn test_redeem() {
        let member = member_with(20);
        let tx = redeem_points(&member, 15, Utc::now()).unwrap();
        assert_eq!(tx.points, -15);
        assert_eq!(tx.points_after, 5);

        assert!(matches!(
            redeem_points(&member, 21, Utc::now()),
            Err(CoreError::InsufficientPoints {
                available: 20,
                requested: 21
            })
        ));
        assert!(matches!(redeem_points(&member, 0, Utc::now()), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_adjust_never_below_zero() {
        let member = member_with(5);
        assert_eq!(adjust_points(&member, 10, None, Utc::now()).unwrap().points_after, 15);
        assert_eq!(adjust_points(&member, -5, None, Utc::now()).unwrap().points_after, 0);
        assert!(adjust_points(&member, -6, None, Utc::now()).is_err());
        assert!(adjust_points(&member, 0, None, Utc::now()).is_err());
    }

    #[test]
    fn test_expiry_fifo_after_redemption() {
        let mut member = member_with(0);
        let r = rate(Some(30));

        let earn_a = earn_points(Some(&member), "s1", Money::from_rupiah(120_000), &r, at(2026, 1, 1)).unwrap();
        apply(&mut member, &earn_a);
        let earn_b = earn_points(Some(&member), "s2", Money::from_rupiah(80_000), &r, at(2026, 3, 1)).unwrap();
        apply(&mut member, &earn_b);
        let redeem = redeem_points(&member, 10, at(2026, 3, 5)).unwrap();
        apply(&mut member, &redeem);
        let history = vec![earn_a.clone(), earn_b, redeem];
        assert_eq!(member.points_balance, 10);

        // lot A (12, exp 2026-01-31) has 2 left after the redemption,
        // lot B (8, exp 2026-03-31) is untouched
        let expired = expire_points(&member, &history, at(2026, 3, 10));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].points, -2);
        assert_eq!(expired[0].points_before, 10);
        assert_eq!(expired[0].points_after, 8);
        assert_eq!(expired[0].lot_id.as_deref(), Some(earn_a.id.as_str()));
    }

    #[test]
    fn test_expiry_oldest_first_and_idempotent() {
        let mut member = member_with(0);
        let r = rate(Some(10));

        let a = earn_points(Some(&member), "s1", Money::from_rupiah(50_000), &r, at(2026, 1, 1)).unwrap();
        apply(&mut member, &a);
        let b = earn_points(Some(&member), "s2", Money::from_rupiah(30_000), &r, at(2026, 1, 5)).unwrap();
        apply(&mut member, &b);
        let c = earn_points(Some(&member), "s3", Money::from_rupiah(70_000), &r, at(2026, 6, 1)).unwrap();
        apply(&mut member, &c);
        let mut history = vec![a.clone(), b.clone(), c];
        assert_eq!(member.points_balance, 15);

        let expired = expire_points(&member, &history, at(2026, 2, 1));
        assert_eq!(expired.len(), 2);
        assert_eq!(expired[0].lot_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(expired[1].lot_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(expired[0].points_after, expired[1].points_before);
        assert_eq!(expired[1].points_after, 7);

        for tx in &expired {
            apply(&mut member, tx);
        }
        history.extend(expired);

        assert!(expire_points(&member, &history, at(2026, 2, 1)).is_empty());
        assert_eq!(member.points_balance, 7);
    }

    #[test]
    fn test_reversed_lot_leaves_older_lot_to_expire() {
        let mut member = member_with(0);
        let r = rate(Some(30));

        let a = earn_points(Some(&member), "s1", Money::from_rupiah(100_000), &r, at(2026, 1, 1)).unwrap();
        apply(&mut member, &a);
        let b = earn_points(Some(&member), "s2", Money::from_rupiah(50_000), &r, at(2026, 1, 20)).unwrap();
        apply(&mut member, &b);
        let reversal = reverse_earn(&member, &b, Some("cancelled".into()), at(2026, 1, 21)).unwrap();
        apply(&mut member, &reversal);
        assert_eq!(reversal.points, -5);
        assert_eq!(reversal.lot_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(reversal.sale_id.as_deref(), Some("s2"));
        assert_eq!(member.points_balance, 10);

        // lot A (10, exp 01-31) is whole again, lot B is gone
        let history = vec![a.clone(), b, reversal];
        let expired = expire_points(&member, &history, at(2026, 2, 2));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].lot_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(expired[0].points, -10);
        assert_eq!(expired[0].points_after, 0);
    }

    #[test]
    fn test_reversal_of_partly_redeemed_lot_drains_oldest_for_the_rest() {
        let mut member = member_with(0);
        let r = rate(Some(30));

        let a = earn_points(Some(&member), "s1", Money::from_rupiah(100_000), &r, at(2026, 1, 1)).unwrap();
        apply(&mut member, &a);
        let b = earn_points(Some(&member), "s2", Money::from_rupiah(50_000), &r, at(2026, 1, 10)).unwrap();
        apply(&mut member, &b);
        // empties A and leaves 3 in B
        let redeem = redeem_points(&member, 12, at(2026, 1, 11)).unwrap();
        apply(&mut member, &redeem);
        let c = earn_points(Some(&member), "s3", Money::from_rupiah(100_000), &r, at(2026, 1, 12)).unwrap();
        apply(&mut member, &c);
        let reversal = reverse_earn(&member, &b, None, at(2026, 1, 13)).unwrap();
        apply(&mut member, &reversal);
        assert_eq!(member.points_balance, 8);

        // 3 came out of B, the other 2 out of C
        let history = vec![a, b, redeem, c.clone(), reversal];
        let expired = expire_points(&member, &history, at(2026, 3, 1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].lot_id.as_deref(), Some(c.id.as_str()));
        assert_eq!(expired[0].points, -8);
        assert_eq!(expired[0].points_after, 0);
    }

    #[test]
    fn test_positive_adjustment_never_expires() {
        let mut member = member_with(0);
        let bonus = adjust_points(&member, 5, Some("bonus RAT".into()), at(2026, 1, 1)).unwrap();
        apply(&mut member, &bonus);
        let history = vec![bonus];

        assert!(expire_points(&member, &history, at(2030, 1, 1)).is_empty());
    }
}
