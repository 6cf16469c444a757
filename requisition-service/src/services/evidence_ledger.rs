//! Evidence ledger: proof-of-expense records and the reviewer workflow.
//!
//! Admission uses the same locked pending-balance check as payments, but
//! against the sum of all evidence regardless of review status. Review and
//! deletion recompute the approved sum and derive the requisition status
//! from it inside the same transaction.

use crate::models::{
    AuditAction, DocKind, EvidenceEntry, NewEvidence, RequisitionStatus, ReviewDecision,
};
use crate::services::audit::ActivityAudit;
use crate::services::database::{self, Database};
use crate::services::error::LedgerError;
use crate::services::metrics::{
    record_blob_compensation, record_ledger_operation, record_notification,
};
use crate::services::notifier::{EvidenceReadyMessage, ReviewNotifier};
use crate::services::reconcile::{self, ensure_open};
use crate::services::storage::{BlobHandle, BlobStore, FileUpload};
use crate::middleware::capability::{ResolverGrant, ReviewerGrant};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

pub struct RecordEvidence {
    pub amount: Decimal,
    pub doc_kind: DocKind,
    pub issued_on: NaiveDate,
    pub note: String,
    pub file: FileUpload,
}

#[derive(Clone)]
pub struct EvidenceLedger {
    db: Arc<Database>,
    storage: Arc<dyn BlobStore>,
    audit: ActivityAudit,
    notifier: Arc<dyn ReviewNotifier>,
}

impl EvidenceLedger {
    pub fn new(
        db: Arc<Database>,
        storage: Arc<dyn BlobStore>,
        audit: ActivityAudit,
        notifier: Arc<dyn ReviewNotifier>,
    ) -> Self {
        Self {
            db,
            storage,
            audit,
            notifier,
        }
    }

    /// Record an evidence entry in `pendiente` and notify the configured
    /// reviewer. A missing reviewer address fails the whole operation
    /// before any work is done.
    #[instrument(skip(self, input), fields(requisition_id = %requisition_id, amount = %input.amount))]
    pub async fn record(
        &self,
        actor: &str,
        requisition_id: Uuid,
        input: RecordEvidence,
    ) -> Result<EvidenceEntry, AppError> {
        if input.amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Evidence amount cannot be negative"
            )));
        }
        if input.file.data.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An evidence file is required"
            )));
        }
        // Misconfiguration fails loudly, before the blob or the row exist.
        if self.notifier.recipient().is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "No review recipient configured"
            )));
        }

        let handle = self
            .storage
            .put(input.file.data.clone(), &input.file.mime)
            .await?;

        let result = self.record_tx(actor, requisition_id, &input, &handle).await;

        match result {
            Ok((entry, folio, total)) => {
                record_ledger_operation("evidence_record", "success");
                self.notify(requisition_id, folio, total, input.note).await;
                Ok(entry)
            }
            Err(e) => {
                record_ledger_operation("evidence_record", "failure");
                self.compensate_blob(&handle).await;
                Err(e)
            }
        }
    }

    async fn record_tx(
        &self,
        actor: &str,
        requisition_id: Uuid,
        input: &RecordEvidence,
        handle: &BlobHandle,
    ) -> Result<(EvidenceEntry, String, Decimal), AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let requisition = database::lock_requisition(&mut tx, requisition_id)
            .await?
            .ok_or(LedgerError::RequisitionNotFound(requisition_id))?;
        ensure_open(&requisition)?;

        let evidenced = database::sum_evidence(&mut tx, requisition_id).await?;
        let pending = reconcile::pending(requisition.total, evidenced);
        reconcile::check_pending(pending, input.amount)?;

        let new_evidence = NewEvidence {
            amount: input.amount,
            doc_kind: input.doc_kind,
            issued_on: input.issued_on,
            file_key: handle.as_str().to_string(),
            file_name: input.file.name.clone(),
            file_mime: input.file.mime.clone(),
            file_size: input.file.data.len() as i64,
        };

        let entry = database::insert_evidence(&mut tx, requisition_id, &new_evidence).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        tracing::info!(
            evidence_id = %entry.evidence_id,
            amount = %entry.amount,
            pending_before = %pending,
            "Evidence recorded"
        );

        self.audit.record(
            actor,
            AuditAction::Create,
            "evidence_entries",
            entry.evidence_id,
        );

        Ok((entry, requisition.folio, requisition.total))
    }

    /// Delete the evidence blob after a failed transaction. The compensation
    /// outcome is logged; the caller keeps its original error either way.
    async fn compensate_blob(&self, handle: &BlobHandle) {
        match self.storage.delete(handle).await {
            Ok(()) => record_blob_compensation("success"),
            Err(e) => {
                record_blob_compensation("failure");
                tracing::error!(
                    blob_key = %handle.as_str(),
                    error = %e,
                    "Failed to delete evidence blob after rolled-back record"
                );
            }
        }
    }

    /// Apply a reviewer verdict, then derive the requisition status from
    /// the new approved sum. Re-applying the same verdict leaves the
    /// status untouched.
    #[instrument(skip(self, reviewer), fields(evidence_id = %evidence_id, reviewer_id = %reviewer.reviewer_id))]
    pub async fn review(
        &self,
        actor: &str,
        evidence_id: Uuid,
        decision: ReviewDecision,
        comment: Option<String>,
        reviewer: &ReviewerGrant,
    ) -> Result<EvidenceEntry, AppError> {
        let comment = match decision {
            ReviewDecision::Rechazado => {
                let comment = comment.map(|c| c.trim().to_string()).unwrap_or_default();
                if comment.is_empty() {
                    record_ledger_operation("evidence_review", "failure");
                    return Err(LedgerError::CommentRequired.into());
                }
                Some(comment)
            }
            // Approval clears any previous rejection comment.
            ReviewDecision::Aprobado => None,
        };

        let existing = self
            .db
            .get_evidence(evidence_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(evidence_id))?;

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let requisition = database::lock_requisition(&mut tx, existing.requisition_id)
            .await?
            .ok_or(LedgerError::RequisitionNotFound(existing.requisition_id))?;
        ensure_open(&requisition)?;

        // The entry may have been deleted between the unlocked read and
        // taking the lock.
        let entry = database::update_evidence_review(
            &mut tx,
            evidence_id,
            decision.as_review_status(),
            comment.as_deref(),
            reviewer.reviewer_id,
        )
        .await?
        .ok_or(LedgerError::EntryNotFound(evidence_id))?;

        self.recompute_status(&mut tx, &requisition).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        record_ledger_operation("evidence_review", "success");
        self.audit.record(
            actor,
            AuditAction::Update,
            "evidence_entries",
            entry.evidence_id,
        );

        Ok(entry)
    }

    /// Delete an evidence entry and re-derive the requisition status. The
    /// row goes first inside the transaction; the blob is removed after
    /// commit, where a failure leaves an orphaned blob (logged) but never
    /// a dangling row.
    #[instrument(skip(self), fields(evidence_id = %evidence_id))]
    pub async fn delete(&self, actor: &str, evidence_id: Uuid) -> Result<EvidenceEntry, AppError> {
        let existing = self
            .db
            .get_evidence(evidence_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(evidence_id))?;

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let requisition = database::lock_requisition(&mut tx, existing.requisition_id)
            .await?
            .ok_or(LedgerError::RequisitionNotFound(existing.requisition_id))?;
        ensure_open(&requisition)?;

        let removed = database::delete_evidence(&mut tx, evidence_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(evidence_id))?;
        self.recompute_status(&mut tx, &requisition).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        record_ledger_operation("evidence_delete", "success");
        self.audit.record(
            actor,
            AuditAction::Delete,
            "evidence_entries",
            removed.evidence_id,
        );

        let handle = BlobHandle(removed.file_key.clone());
        if let Err(e) = self.storage.delete(&handle).await {
            tracing::error!(
                blob_key = %removed.file_key,
                error = %e,
                "Failed to delete evidence blob after row removal"
            );
        }

        Ok(removed)
    }

    /// Resolver sign-off over a fully evidenced requisition.
    #[instrument(skip(self, resolver), fields(requisition_id = %requisition_id, resolver_id = %resolver.resolver_id))]
    pub async fn accept(
        &self,
        actor: &str,
        requisition_id: Uuid,
        resolver: &ResolverGrant,
    ) -> Result<(), AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let requisition = database::lock_requisition(&mut tx, requisition_id)
            .await?
            .ok_or(LedgerError::RequisitionNotFound(requisition_id))?;
        let status = ensure_open(&requisition)?;

        if status != RequisitionStatus::Comprobada {
            return Err(LedgerError::NotFullyEvidenced(requisition_id, status).into());
        }

        database::set_status(&mut tx, requisition_id, RequisitionStatus::ComprobacionAceptada)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        record_ledger_operation("evidence_accept", "success");
        self.audit
            .record(actor, AuditAction::Update, "requisitions", requisition_id);

        Ok(())
    }

    /// Derive the requisition status from the current approved sum and
    /// write it back when it changed.
    async fn recompute_status(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        requisition: &crate::models::Requisition,
    ) -> Result<(), AppError> {
        let sum_approved =
            database::sum_approved_evidence(&mut *tx, requisition.requisition_id).await?;
        let current = requisition.parsed_status().ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Requisition {} carries unknown status '{}'",
                requisition.requisition_id,
                requisition.status
            ))
        })?;

        if let Some(next) = reconcile::derive_status(current, sum_approved, requisition.total) {
            database::set_status(&mut *tx, requisition.requisition_id, next).await?;
            tracing::info!(
                requisition_id = %requisition.requisition_id,
                from = %current,
                to = %next,
                sum_approved = %sum_approved,
                total = %requisition.total,
                "Requisition status derived from approved evidence"
            );
        }

        Ok(())
    }

    async fn notify(&self, requisition_id: Uuid, folio: String, total: Decimal, note: String) {
        let message = EvidenceReadyMessage {
            requisition_id,
            folio,
            total,
            note,
        };
        // The entry is committed; a transport failure is logged, not
        // propagated. The misconfiguration case was rejected up front.
        match self.notifier.evidence_ready(&message).await {
            Ok(()) => record_notification("success"),
            Err(e) => {
                record_notification("failure");
                tracing::error!(
                    requisition_id = %message.requisition_id,
                    error = %e,
                    "Failed to send review notification"
                );
            }
        }
    }
}
