//! # Stock Reconciliation
//!
//! Pure planning of stock movements. The store applies the plans; this module
//! decides whether they are allowed.
//!
//! ## Single Mutation Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sale commit ──────► OUT  × lines ─┐                                   │
//! │  Purchase commit ──► IN   × items ─┤                                   │
//! │  Adjustment ───────► ADJUSTMENT ───┼──► StockPlanner::plan()           │
//! │  Sales return ─────► RETURN_IN ────┤      │ direction check            │
//! │  Purchase return ──► RETURN_OUT ───┘      │ after = before + delta     │
//! │                                           │ after >= 0                 │
//! │                                           ▼                            │
//! │                              MovementPlan (one per line, in order)     │
//! │                                           │                            │
//! │                                           ▼                            │
//! │                  store: version-guarded UPDATE + ledger INSERT         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The planner threads a running stock per product, so a cart holding the
//! same product on two lines is checked against what is left after the
//! first line, never against the stale snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{
    new_id, ApprovalStatus, MovementType, ReferenceType, ReturnKind, StockMovement,
};

// =============================================================================
// Direction Rules
// =============================================================================

impl MovementType {
    /// Checks the sign of a delta against the movement type.
    ///
    /// IN / RETURN_IN add stock, OUT / RETURN_OUT remove it, ADJUSTMENT may
    /// go either way. Zero is never a movement.
    pub fn check_delta(&self, delta: i64) -> CoreResult<()> {
        if delta == 0 {
            return Err(ValidationError::MustBeNonZero {
                field: "movement quantity".to_string(),
            }
            .into());
        }

        let ok = match self {
            MovementType::In | MovementType::ReturnIn => delta > 0,
            MovementType::Out | MovementType::ReturnOut => delta < 0,
            MovementType::Adjustment => true,
        };

        if !ok {
            return Err(ValidationError::InvalidFormat {
                field: "movement quantity".to_string(),
                reason: format!("{:?} cannot move {} units", self, delta),
            }
            .into());
        }

        Ok(())
    }
}

impl ReturnKind {
    /// Movement produced when a return of this kind is approved.
    pub fn movement_type(&self) -> MovementType {
        match self {
            ReturnKind::Sales => MovementType::ReturnIn,
            ReturnKind::Purchase => MovementType::ReturnOut,
        }
    }

    /// Signed delta for `quantity` returned units.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            ReturnKind::Sales => quantity,
            ReturnKind::Purchase => -quantity,
        }
    }
}

// =============================================================================
// Planning
// =============================================================================

/// A checked, not yet applied, stock movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementPlan {
    pub product_id: String,
    pub sku: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
}

impl MovementPlan {
    /// Turns the plan into the ledger row the store appends.
    pub fn into_movement(
        self,
        reference_type: ReferenceType,
        reference_id: &str,
        user_id: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> StockMovement {
        StockMovement {
            id: new_id(),
            product_id: self.product_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            reference_type,
            reference_id: reference_id.to_string(),
            user_id: user_id.to_string(),
            notes,
            created_at: at,
        }
    }
}

/// Plans one movement against a known stock level.
///
/// ## Errors
/// - `Validation` when the delta sign does not fit the type
/// - `InsufficientStock` when the result would be negative
pub fn plan_movement(
    product_id: &str,
    sku: &str,
    current: i64,
    movement_type: MovementType,
    delta: i64,
) -> CoreResult<MovementPlan> {
    movement_type.check_delta(delta)?;

    let after = current + delta;
    if after < 0 {
        return Err(CoreError::InsufficientStock {
            sku: sku.to_string(),
            available: current,
            requested: -delta,
        });
    }

    Ok(MovementPlan {
        product_id: product_id.to_string(),
        sku: sku.to_string(),
        movement_type,
        quantity: delta,
        quantity_before: current,
        quantity_after: after,
    })
}

/// Plans a batch of movements with a running stock per product.
#[derive(Debug, Default)]
pub struct StockPlanner {
    running: HashMap<String, i64>,
    plans: Vec<MovementPlan>,
}

impl StockPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the stock read for a product. The first value wins, so a
    /// later re-read cannot undo what earlier lines consumed.
    pub fn observe(&mut self, product_id: &str, stock: i64) {
        self.running.entry(product_id.to_string()).or_insert(stock);
    }

    /// Running stock for a product, if observed.
    pub fn current(&self, product_id: &str) -> Option<i64> {
        self.running.get(product_id).copied()
    }

    /// Plans the next movement. On error nothing is recorded.
    pub fn plan(
        &mut self,
        product_id: &str,
        sku: &str,
        movement_type: MovementType,
        delta: i64,
    ) -> CoreResult<&MovementPlan> {
        let current = self
            .current(product_id)
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        let plan = plan_movement(product_id, sku, current, movement_type, delta)?;
        self.running.insert(product_id.to_string(), plan.quantity_after);
        self.plans.push(plan);

        // just pushed
        Ok(&self.plans[self.plans.len() - 1])
    }

    /// Planned movements in application order.
    pub fn into_plans(self) -> Vec<MovementPlan> {
        self.plans
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

/// Net change recorded by a set of ledger rows.
pub fn ledger_delta<'a, I>(movements: I) -> i64
where
    I: IntoIterator<Item = &'a StockMovement>,
{
    movements.into_iter().map(|m| m.quantity).sum()
}

// =============================================================================
// Approvals
// =============================================================================

impl ApprovalStatus {
    /// PENDING → APPROVED | REJECTED. Decisions are final.
    pub fn decide(self, approve: bool) -> CoreResult<ApprovalStatus> {
        let next = if approve {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };

        match self {
            ApprovalStatus::Pending => Ok(next),
            from => Err(CoreError::transition("approval", from, next)),
        }
    }
}

/// Checks a return against what was transacted and already returned.
pub fn check_returnable(
    sku: &str,
    transacted: i64,
    already_returned: i64,
    requested: i64,
) -> CoreResult<()> {
    if requested <= 0 {
        return Err(ValidationError::positive("return quantity").into());
    }

    let returnable = (transacted - already_returned).max(0);
    if requested > returnable {
        return Err(CoreError::ReturnExceedsTransacted {
            sku: sku.to_string(),
            returnable,
            requested,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_rules() {
        assert!(MovementType::In.check_delta(5).is_ok());
        assert!(MovementType::In.check_delta(-5).is_err());
        assert!(MovementType::Out.check_delta(-5).is_ok());
        assert!(MovementType::Out.check_delta(5).is_err());
        assert!(MovementType::ReturnIn.check_delta(1).is_ok());
        assert!(MovementType::ReturnOut.check_delta(-1).is_ok());
        assert!(MovementType::Adjustment.check_delta(-3).is_ok());
        assert!(MovementType::Adjustment.check_delta(3).is_ok());

        for t in [MovementType::In, MovementType::Out, MovementType::Adjustment] {
            assert!(matches!(
                t.check_delta(0),
                Err(CoreError::Validation(ValidationError::MustBeNonZero { .. }))
            ));
        }
    }

    #[test]
    fn test_insufficient_stock_plans_nothing() {
        let mut planner = StockPlanner::new();
        planner.observe("p1", 5);

        let err = planner.plan("p1", "MYK-2L", MovementType::Out, -6).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 5,
                requested: 6,
                ..
            }
        ));
        assert!(planner.is_empty());
        assert_eq!(planner.current("p1"), Some(5));
    }

    #[test]
    fn test_purchase_in_movement() {
        let plan = plan_movement("p1", "BRS-5KG", 5, MovementType::In, 20).unwrap();
        assert_eq!(plan.quantity_before, 5);
        assert_eq!(plan.quantity_after, 25);
    }

    #[test]
    fn test_planner_threads_running_stock() {
        let mut planner = StockPlanner::new();
        planner.observe("p1", 10);
        planner.observe("p2", 3);

        planner.plan("p1", "A", MovementType::Out, -4).unwrap();
        planner.plan("p2", "B", MovementType::Out, -3).unwrap();
        let second = planner.plan("p1", "A", MovementType::Out, -5).unwrap();
        assert_eq!(second.quantity_before, 6);
        assert_eq!(second.quantity_after, 1);

        // stale snapshot would have allowed this
        planner.observe("p1", 10);
        assert!(planner.plan("p1", "A", MovementType::Out, -2).is_err());

        let plans = planner.into_plans();
        assert_eq!(plans.len(), 3);
        assert!(plans.iter().all(|p| p.quantity_after == p.quantity_before + p.quantity));
    }

    #[test]
    fn test_unobserved_product_rejected() {
        let mut planner = StockPlanner::new();
        assert!(matches!(
            planner.plan("ghost", "X", MovementType::In, 1),
            Err(CoreError::ProductNotFound(_))
        ));
    }

    #[test]
    fn test_ledger_delta_matches_stock_change() {
        let mut planner = StockPlanner::new();
        planner.observe("p1", 5);
        planner.plan("p1", "A", MovementType::In, 20).unwrap();
        planner.plan("p1", "A", MovementType::Out, -7).unwrap();
        planner.plan("p1", "A", MovementType::Adjustment, -1).unwrap();

        let now = Utc::now();
        let rows: Vec<StockMovement> = planner
            .into_plans()
            .into_iter()
            .map(|p| p.into_movement(ReferenceType::Adjustment, "ref", "u1", None, now))
            .collect();

        assert_eq!(ledger_delta(&rows), 12);
        assert_eq!(rows.last().unwrap().quantity_after, 5 + 12);
    }

    #[test]
    fn test_return_kinds() {
        assert_eq!(ReturnKind::Sales.movement_type(), MovementType::ReturnIn);
        assert_eq!(ReturnKind::Purchase.movement_type(), MovementType::ReturnOut);
        assert_eq!(ReturnKind::Sales.signed(3), 3);
        assert_eq!(ReturnKind::Purchase.signed(3), -3);
    }

    #[test]
    fn test_approval_is_final() {
        assert_eq!(
            ApprovalStatus::Pending.decide(true).unwrap(),
            ApprovalStatus::Approved
        );
        assert_eq!(
            ApprovalStatus::Pending.decide(false).unwrap(),
            ApprovalStatus::Rejected
        );
        assert!(ApprovalStatus::Approved.decide(false).is_err());
        assert!(ApprovalStatus::Rejected.decide(true).is_err());
    }

    #[test]
    fn test_check_returnable() {
        assert!(check_returnable("A", 10, 0, 10).is_ok());
        assert!(check_returnable("A", 10, 4, 6).is_ok());
        assert!(matches!(
            check_returnable("A", 10, 4, 7),
            Err(CoreError::ReturnExceedsTransacted { returnable: 6, .. })
        ));
        assert!(check_returnable("A", 10, 0, 0).is_err());
    }
}
