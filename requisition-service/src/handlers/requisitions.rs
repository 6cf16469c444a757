//! HTTP surface over the ledgers. Thin: parse, validate, delegate, then
//! return the updated aggregate view.

use crate::dtos::{
    AdjustmentRequest, CreateRequisitionRequest, RequisitionView, ResolveAdjustmentRequest,
    ReviewRequest,
};
use crate::middleware::capability::{ActorId, ResolverGrant, ReviewerGrant};
use crate::models::{AuditAction, BeneficiarySnapshot, DocKind, NewAdjustment, NewRequisition};
use crate::services::error::LedgerError;
use crate::services::payment_ledger::RecordPayment;
use crate::services::evidence_ledger::RecordEvidence;
use crate::services::{reconcile, FileUpload};
use crate::startup::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Assemble the aggregate view for a requisition.
async fn load_view(state: &AppState, requisition_id: Uuid) -> Result<RequisitionView, AppError> {
    let requisition = state
        .db
        .get_requisition(requisition_id)
        .await?
        .ok_or(LedgerError::RequisitionNotFound(requisition_id))?;

    let payments = state.db.list_payments(requisition_id).await?;
    let evidence = state.db.list_evidence(requisition_id).await?;
    let adjustments = state.db.list_adjustments(requisition_id).await?;

    let paid: Decimal = payments.iter().map(|p| p.amount).sum();
    let evidenced: Decimal = evidence.iter().map(|e| e.amount).sum();
    let sum_approved: Decimal = evidence
        .iter()
        .filter(|e| e.review_status == "aprobado")
        .map(|e| e.amount)
        .sum();

    Ok(RequisitionView {
        pending_to_pay: reconcile::pending(requisition.total, paid),
        pending_to_evidence: reconcile::pending(requisition.total, evidenced),
        sum_approved,
        requisition,
        payments,
        evidence,
        adjustments,
    })
}

pub async fn create_requisition(
    State(state): State<AppState>,
    actor: ActorId,
    Json(request): Json<CreateRequisitionRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let requisition = state
        .db
        .create_requisition(&NewRequisition {
            folio: request.folio,
            kind: request.kind,
            subtotal: request.subtotal,
            total: request.total,
            captured_on: request.captured_on,
            requester_id: request.requester_id,
            buyer_id: request.buyer_id,
            beneficiary_id: request.beneficiary_id,
        })
        .await?;

    state.audit.record(
        &actor.0,
        AuditAction::Create,
        "requisitions",
        requisition.requisition_id,
    );

    let view = load_view(&state, requisition.requisition_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_requisition(
    State(state): State<AppState>,
    Path(requisition_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = load_view(&state, requisition_id).await?;
    Ok(Json(view))
}

pub async fn record_payment(
    State(state): State<AppState>,
    actor: ActorId,
    Path(requisition_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let input = parse_payment(multipart).await?;

    state.payments.record(&actor.0, requisition_id, input).await?;

    let view = load_view(&state, requisition_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn record_evidence(
    State(state): State<AppState>,
    actor: ActorId,
    Path(requisition_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let input = parse_evidence(multipart).await?;

    state.evidence.record(&actor.0, requisition_id, input).await?;

    let view = load_view(&state, requisition_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn review_evidence(
    State(state): State<AppState>,
    actor: ActorId,
    reviewer: ReviewerGrant,
    Path(evidence_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .evidence
        .review(
            &actor.0,
            evidence_id,
            request.decision,
            request.comment,
            &reviewer,
        )
        .await?;

    let view = load_view(&state, entry.requisition_id).await?;
    Ok(Json(view))
}

pub async fn delete_evidence(
    State(state): State<AppState>,
    actor: ActorId,
    Path(evidence_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state.evidence.delete(&actor.0, evidence_id).await?;

    let view = load_view(&state, removed.requisition_id).await?;
    Ok(Json(view))
}

pub async fn accept_review(
    State(state): State<AppState>,
    actor: ActorId,
    resolver: ResolverGrant,
    Path(requisition_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .evidence
        .accept(&actor.0, requisition_id, &resolver)
        .await?;

    let view = load_view(&state, requisition_id).await?;
    Ok(Json(view))
}

pub async fn record_adjustment(
    State(state): State<AppState>,
    actor: ActorId,
    resolver: Option<ResolverGrant>,
    Path(requisition_id): Path<Uuid>,
    Json(request): Json<AdjustmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    state
        .adjustments
        .record(
            &actor.0,
            requisition_id,
            NewAdjustment {
                kind: request.kind,
                direction: request.direction,
                amount: request.amount,
                method: request.method,
                reference: request.reference,
                reason: request.reason,
            },
            resolver.as_ref(),
        )
        .await?;

    let view = load_view(&state, requisition_id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn resolve_adjustment(
    State(state): State<AppState>,
    actor: ActorId,
    Path(adjustment_id): Path<Uuid>,
    Json(request): Json<ResolveAdjustmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state
        .adjustments
        .resolve(&actor.0, adjustment_id, request.resolution)
        .await?;

    let view = load_view(&state, entry.requisition_id).await?;
    Ok(Json(view))
}

// ---------------------------------------------------------------------------
// Multipart parsing
// ---------------------------------------------------------------------------

async fn next_field_pair(
    multipart: &mut Multipart,
) -> Result<Option<(String, Option<String>, Option<String>, axum::extract::multipart::Field<'_>)>, AppError>
{
    let field = match multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        Some(field) => field,
        None => return Ok(None),
    };

    let name = field.name().unwrap_or("").to_string();
    let file_name = field.file_name().map(|s| s.to_string());
    let content_type = field.content_type().map(|s| s.to_string());
    Ok(Some((name, file_name, content_type, field)))
}

async fn field_text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid field '{}': {}", name, e)))
}

async fn field_file(
    field: axum::extract::multipart::Field<'_>,
    file_name: Option<String>,
    content_type: Option<String>,
) -> Result<FileUpload, AppError> {
    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e)))?
        .to_vec();

    Ok(FileUpload {
        data,
        name: file_name.unwrap_or_else(|| "unnamed".to_string()),
        mime: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
    })
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid amount '{}': {}", raw, e)))
}

fn parse_date(raw: &str, name: &str) -> Result<NaiveDate, AppError> {
    raw.trim()
        .parse::<NaiveDate>()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid {} '{}': {}", name, raw, e)))
}

async fn parse_payment(mut multipart: Multipart) -> Result<RecordPayment, AppError> {
    let mut amount = None;
    let mut paid_on = None;
    let mut beneficiary_name = None;
    let mut beneficiary_bank = None;
    let mut beneficiary_account = None;
    let mut receipt = None;

    while let Some((name, file_name, content_type, field)) = next_field_pair(&mut multipart).await? {
        match name.as_str() {
            "amount" => amount = Some(parse_amount(&field_text(field, "amount").await?)?),
            "paid_on" => {
                paid_on = Some(parse_date(&field_text(field, "paid_on").await?, "paid_on")?)
            }
            "beneficiary_name" => {
                beneficiary_name = Some(field_text(field, "beneficiary_name").await?)
            }
            "beneficiary_bank" => {
                beneficiary_bank = Some(field_text(field, "beneficiary_bank").await?)
            }
            "beneficiary_account" => {
                beneficiary_account = Some(field_text(field, "beneficiary_account").await?)
            }
            "receipt" => receipt = Some(field_file(field, file_name, content_type).await?),
            _ => {}
        }
    }

    let beneficiary_name = beneficiary_name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("beneficiary_name is required")))?;

    Ok(RecordPayment {
        amount: amount
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("amount is required")))?,
        paid_on: paid_on
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("paid_on is required")))?,
        beneficiary: BeneficiarySnapshot {
            name: beneficiary_name,
            bank: beneficiary_bank.filter(|b| !b.trim().is_empty()),
            account: beneficiary_account.filter(|a| !a.trim().is_empty()),
        },
        receipt: receipt
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("receipt file is required")))?,
    })
}

async fn parse_evidence(mut multipart: Multipart) -> Result<RecordEvidence, AppError> {
    let mut amount = None;
    let mut doc_kind = None;
    let mut issued_on = None;
    let mut note = String::new();
    let mut file = None;

    while let Some((name, file_name, content_type, field)) = next_field_pair(&mut multipart).await? {
        match name.as_str() {
            "amount" => amount = Some(parse_amount(&field_text(field, "amount").await?)?),
            "doc_kind" => {
                let raw = field_text(field, "doc_kind").await?;
                doc_kind = Some(DocKind::parse(raw.trim()).ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!("Invalid doc_kind '{}'", raw))
                })?);
            }
            "issued_on" => {
                issued_on = Some(parse_date(&field_text(field, "issued_on").await?, "issued_on")?)
            }
            "note" => note = field_text(field, "note").await?,
            "file" => file = Some(field_file(field, file_name, content_type).await?),
            _ => {}
        }
    }

    Ok(RecordEvidence {
        amount: amount
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("amount is required")))?,
        doc_kind: doc_kind
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("doc_kind is required")))?,
        issued_on: issued_on
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("issued_on is required")))?,
        note,
        file: file
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("evidence file is required")))?,
    })
}
