//! Payment ledger: records beneficiary payments against a requisition.
//!
//! The pending-balance check and the insert happen inside one transaction
//! that holds the requisition row lock, so two racing submissions cannot
//! both observe the same pending value. The receipt blob is written before
//! the transaction; if anything downstream fails the blob is deleted
//! (compensation) so no stored file is left unreferenced.

use crate::models::{AuditAction, BeneficiarySnapshot, NewPayment, PaymentEntry};
use crate::services::audit::ActivityAudit;
use crate::services::database::{self, Database};
use crate::services::error::LedgerError;
use crate::services::metrics::{record_blob_compensation, record_ledger_operation};
use crate::services::reconcile::{self, ensure_open};
use crate::services::storage::{BlobHandle, BlobStore, FileUpload};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

pub struct RecordPayment {
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub beneficiary: BeneficiarySnapshot,
    pub receipt: FileUpload,
}

#[derive(Clone)]
pub struct PaymentLedger {
    db: Arc<Database>,
    storage: Arc<dyn BlobStore>,
    audit: ActivityAudit,
}

impl PaymentLedger {
    pub fn new(db: Arc<Database>, storage: Arc<dyn BlobStore>, audit: ActivityAudit) -> Self {
        Self { db, storage, audit }
    }

    /// Record a payment. On success the requisition carries its first
    /// payment date and moves into the evidence-collection phase.
    #[instrument(skip(self, input), fields(requisition_id = %requisition_id, amount = %input.amount))]
    pub async fn record(
        &self,
        actor: &str,
        requisition_id: Uuid,
        input: RecordPayment,
    ) -> Result<PaymentEntry, AppError> {
        if input.amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount cannot be negative"
            )));
        }
        if input.receipt.data.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "A transfer receipt file is required"
            )));
        }

        // Blob first; compensated on any downstream failure.
        let handle = self
            .storage
            .put(input.receipt.data.clone(), &input.receipt.mime)
            .await?;

        match self.record_tx(actor, requisition_id, &input, &handle).await {
            Ok(entry) => {
                record_ledger_operation("payment_record", "success");
                Ok(entry)
            }
            Err(e) => {
                record_ledger_operation("payment_record", "failure");
                self.compensate_blob(&handle).await;
                Err(e)
            }
        }
    }

    async fn record_tx(
        &self,
        actor: &str,
        requisition_id: Uuid,
        input: &RecordPayment,
        handle: &BlobHandle,
    ) -> Result<PaymentEntry, AppError> {
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let requisition = database::lock_requisition(&mut tx, requisition_id)
            .await?
            .ok_or(LedgerError::RequisitionNotFound(requisition_id))?;
        ensure_open(&requisition)?;

        let paid = database::sum_payments(&mut tx, requisition_id).await?;
        let pending = reconcile::pending(requisition.total, paid);

        reconcile::check_pending(pending, input.amount)?;
        if input.amount.is_zero() && !pending.is_zero() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive while a balance is pending"
            )));
        }

        let new_payment = NewPayment {
            amount: input.amount,
            paid_on: input.paid_on,
            beneficiary: input.beneficiary.clone(),
            receipt_key: handle.as_str().to_string(),
            receipt_name: input.receipt.name.clone(),
            receipt_mime: input.receipt.mime.clone(),
            receipt_size: input.receipt.data.len() as i64,
        };

        let entry = database::insert_payment(&mut tx, requisition_id, &new_payment).await?;
        database::mark_paid(&mut tx, requisition_id, input.paid_on).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        tracing::info!(
            payment_id = %entry.payment_id,
            amount = %entry.amount,
            pending_before = %pending,
            "Payment recorded"
        );

        self.audit
            .record(actor, AuditAction::Create, "payment_entries", entry.payment_id);

        Ok(entry)
    }

    /// Delete the receipt blob after a failed transaction. The compensation
    /// outcome is logged; the caller keeps its original error either way.
    async fn compensate_blob(&self, handle: &BlobHandle) {
        match self.storage.delete(handle).await {
            Ok(()) => record_blob_compensation("success"),
            Err(e) => {
                record_blob_compensation("failure");
                tracing::error!(
                    blob_key = %handle.as_str(),
                    error = %e,
                    "Failed to delete receipt blob after rolled-back payment"
                );
            }
        }
    }
}

