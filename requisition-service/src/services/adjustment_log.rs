//! Adjustment log: post-hoc corrections to a requisition's financial
//! record.
//!
//! Refunds and shortfalls are bookkeeping rows. An authorized increase is
//! the only path that changes the requisition total after creation; it
//! snapshots the total before and after under the same row lock the
//! ledgers use, so the enlarged room is visible to the very next
//! admission check.

use crate::middleware::capability::ResolverGrant;
use crate::models::{
    AdjustmentEntry, AdjustmentKind, AdjustmentResolution, AdjustmentStatus, AuditAction,
    NewAdjustment,
};
use crate::services::audit::ActivityAudit;
use crate::services::database::{self, Database};
use crate::services::error::LedgerError;
use crate::services::metrics::record_ledger_operation;
use crate::services::reconcile::ensure_open;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct AdjustmentLog {
    db: Arc<Database>,
    audit: ActivityAudit,
}

impl AdjustmentLog {
    pub fn new(db: Arc<Database>, audit: ActivityAudit) -> Self {
        Self { db, audit }
    }

    /// Record an adjustment. Authorized increases require the resolver
    /// capability and are applied (and inserted as `aplicado`) in the same
    /// transaction.
    #[instrument(skip(self, input, resolver), fields(requisition_id = %requisition_id, kind = %input.kind.as_str()))]
    pub async fn record(
        &self,
        actor: &str,
        requisition_id: Uuid,
        input: NewAdjustment,
        resolver: Option<&ResolverGrant>,
    ) -> Result<AdjustmentEntry, AppError> {
        if input.amount < Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Adjustment amount cannot be negative"
            )));
        }

        let is_increase = input.kind == AdjustmentKind::AuthorizedIncrease;
        if is_increase {
            if resolver.is_none() {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "Authorized increases require the resolver capability"
                )));
            }
            if input.amount.is_zero() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "An authorized increase must raise the total"
                )));
            }
        }

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let requisition = database::lock_requisition(&mut tx, requisition_id)
            .await?
            .ok_or(LedgerError::RequisitionNotFound(requisition_id))?;
        ensure_open(&requisition)?;

        let entry = if is_increase {
            let previous_total = requisition.total;
            let new_total = previous_total + input.amount;

            let entry = database::insert_adjustment(
                &mut tx,
                requisition_id,
                &input,
                AdjustmentStatus::Aplicado,
                Some(previous_total),
                Some(new_total),
            )
            .await?;
            database::apply_total(&mut tx, requisition_id, new_total).await?;

            tracing::info!(
                adjustment_id = %entry.adjustment_id,
                previous_total = %previous_total,
                new_total = %new_total,
                "Authorized increase applied"
            );

            entry
        } else {
            database::insert_adjustment(
                &mut tx,
                requisition_id,
                &input,
                AdjustmentStatus::Pendiente,
                None,
                None,
            )
            .await?
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        record_ledger_operation("adjustment_record", "success");
        self.audit.record(
            actor,
            AuditAction::Create,
            "adjustment_entries",
            entry.adjustment_id,
        );

        Ok(entry)
    }

    /// Move an adjustment through its lifecycle:
    /// pendiente -> {aprobado|rechazado} -> aplicado, or cancelado from
    /// any non-terminal state.
    #[instrument(skip(self), fields(adjustment_id = %adjustment_id))]
    pub async fn resolve(
        &self,
        actor: &str,
        adjustment_id: Uuid,
        resolution: AdjustmentResolution,
    ) -> Result<AdjustmentEntry, AppError> {
        let target = resolution.as_status();

        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = database::lock_adjustment(&mut tx, adjustment_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(adjustment_id))?;

        let current = existing.parsed_status().ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Adjustment {} carries unknown status '{}'",
                adjustment_id,
                existing.status
            ))
        })?;

        if !current.can_move_to(target) {
            return Err(LedgerError::InvalidTransition {
                from: current,
                to: target,
            }
            .into());
        }

        let entry = database::update_adjustment_status(&mut tx, adjustment_id, target).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        record_ledger_operation("adjustment_resolve", "success");
        self.audit.record(
            actor,
            AuditAction::Update,
            "adjustment_entries",
            entry.adjustment_id,
        );

        Ok(entry)
    }
}
