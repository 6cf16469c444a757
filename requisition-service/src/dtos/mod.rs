//! Request and response DTOs for the HTTP surface.

use crate::models::{
    AdjustmentDirection, AdjustmentEntry, AdjustmentKind, AdjustmentResolution, EvidenceEntry,
    PaymentEntry, Requisition, RequisitionKind, ReviewDecision,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount < Decimal::ZERO {
        return Err(ValidationError::new("amount_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRequisitionRequest {
    #[validate(length(min = 1, max = 32))]
    pub folio: String,
    pub kind: RequisitionKind,
    #[validate(custom(function = "validate_non_negative"))]
    pub subtotal: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub total: Decimal,
    pub captured_on: NaiveDate,
    pub requester_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub beneficiary_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustmentRequest {
    pub kind: AdjustmentKind,
    pub direction: AdjustmentDirection,
    #[validate(custom(function = "validate_non_negative"))]
    pub amount: Decimal,
    #[validate(length(max = 64))]
    pub method: Option<String>,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    #[validate(length(min = 1))]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveAdjustmentRequest {
    pub resolution: AdjustmentResolution,
}

/// The aggregate view every mutation returns: the requisition, its
/// entries, and the computed pending amounts.
#[derive(Debug, Clone, Serialize)]
pub struct RequisitionView {
    pub requisition: Requisition,
    pub payments: Vec<PaymentEntry>,
    pub evidence: Vec<EvidenceEntry>,
    pub adjustments: Vec<AdjustmentEntry>,
    pub pending_to_pay: Decimal,
    pub pending_to_evidence: Decimal,
    pub sum_approved: Decimal,
}
