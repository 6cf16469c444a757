//! Pending-balance arithmetic and status derivation.
//!
//! Every rule here runs inside a transaction that holds the requisition
//! row lock, so the sums these functions receive are stable for the
//! duration of the check-and-write.

use crate::models::{Requisition, RequisitionStatus};
use crate::services::error::LedgerError;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use service_core::error::AppError;

/// Tolerance for fixed-point rounding when comparing sums against the
/// authorized total.
pub static AMOUNT_EPSILON: Lazy<Decimal> = Lazy::new(|| Decimal::new(1, 5));

/// Remaining room against the authorized total, floored at zero. The
/// subtraction keeps the currency scale, so an exactly settled
/// requisition reports 0.00, not 0.
pub fn pending(total: Decimal, applied: Decimal) -> Decimal {
    let diff = total - applied;
    if diff < Decimal::ZERO {
        Decimal::ZERO
    } else {
        diff
    }
}

/// Whether the approved sum covers the total within epsilon.
pub fn covers(sum_approved: Decimal, total: Decimal) -> bool {
    sum_approved + *AMOUNT_EPSILON >= total
}

/// Admission rule shared by both ledgers. `AmountExceedsPending` is
/// checked before `PendingIsZero`, so a zero-pending requisition rejects
/// any visible amount as exceeding, and `PendingIsZero` only fires for a
/// nonzero amount within epsilon of zero.
pub fn check_pending(pending: Decimal, amount: Decimal) -> Result<(), LedgerError> {
    if amount > pending + *AMOUNT_EPSILON {
        return Err(LedgerError::AmountExceedsPending { amount, pending });
    }
    if pending.is_zero() && !amount.is_zero() {
        return Err(LedgerError::PendingIsZero);
    }
    Ok(())
}

/// Reject mutations on requisitions in a terminal state. A status string
/// outside the closed enumeration means corrupt data, not a business rule.
pub fn ensure_open(requisition: &Requisition) -> Result<RequisitionStatus, AppError> {
    let status = requisition.parsed_status().ok_or_else(|| {
        AppError::DatabaseError(anyhow::anyhow!(
            "Requisition {} carries unknown status '{}'",
            requisition.requisition_id,
            requisition.status
        ))
    })?;
    if status.is_terminal() {
        return Err(LedgerError::RequisitionClosed(requisition.requisition_id, status).into());
    }
    Ok(status)
}

/// Status change implied by the approved-evidence sum, if any.
///
/// Covering the total promotes to `comprobada`; losing coverage regresses
/// an evidenced requisition to `autorizada`. Anything else is left alone,
/// which makes repeated identical reviews idempotent.
pub fn derive_status(
    current: RequisitionStatus,
    sum_approved: Decimal,
    total: Decimal,
) -> Option<RequisitionStatus> {
    let covered = covers(sum_approved, total);
    if covered && !current.is_evidenced() {
        Some(RequisitionStatus::Comprobada)
    } else if !covered && current.is_evidenced() {
        Some(RequisitionStatus::Autorizada)
    } else {
        None
    }
}
