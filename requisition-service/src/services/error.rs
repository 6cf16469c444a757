//! Business-rule error taxonomy for the ledgers.

use crate::models::{AdjustmentStatus, RequisitionStatus};
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// Failures a caller can recover from by resubmitting corrected input,
/// plus the not-found cases. Converted to transport errors at the handler
/// boundary.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("amount {amount} exceeds the pending balance of {pending}")]
    AmountExceedsPending { amount: Decimal, pending: Decimal },

    #[error("requisition has no pending balance; only a zero-amount closing entry is accepted")]
    PendingIsZero,

    #[error("a rejection requires a non-empty review comment")]
    CommentRequired,

    #[error("requisition {0} is {1} and accepts no further entries")]
    RequisitionClosed(Uuid, RequisitionStatus),

    #[error("requisition {0} is {1}; review acceptance requires comprobada")]
    NotFullyEvidenced(Uuid, RequisitionStatus),

    #[error("adjustment cannot move from {from} to {to}")]
    InvalidTransition {
        from: AdjustmentStatus,
        to: AdjustmentStatus,
    },

    #[error("requisition {0} not found")]
    RequisitionNotFound(Uuid),

    #[error("entry {0} not found")]
    EntryNotFound(Uuid),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::RequisitionNotFound(_) | LedgerError::EntryNotFound(_) => {
                AppError::NotFound(anyhow::Error::new(err))
            }
            _ => AppError::BusinessRule(anyhow::Error::new(err)),
        }
    }
}
