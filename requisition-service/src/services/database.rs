//! Database service for requisition-service.
//!
//! Pool-level operations live on [`Database`]; the free functions take a
//! `PgConnection` so the ledgers can compose them inside one transaction
//! while holding the requisition row lock.

use crate::models::{
    AdjustmentEntry, AdjustmentStatus, EvidenceEntry, NewAdjustment, NewEvidence, NewPayment,
    NewRequisition, PaymentEntry, Requisition, RequisitionStatus, ReviewStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const REQUISITION_COLUMNS: &str = "requisition_id, folio, kind, status, subtotal, total, \
     captured_on, paid_on, requester_id, buyer_id, beneficiary_id, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "requisition-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Create a requisition (capture workflow entry point).
    #[instrument(skip(self, input), fields(folio = %input.folio))]
    pub async fn create_requisition(&self, input: &NewRequisition) -> Result<Requisition, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_requisition"])
            .start_timer();

        let requisition = sqlx::query_as::<_, Requisition>(
            r#"
            INSERT INTO requisitions
                (requisition_id, folio, kind, status, subtotal, total, captured_on,
                 requester_id, buyer_id, beneficiary_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING requisition_id, folio, kind, status, subtotal, total, captured_on,
                      paid_on, requester_id, buyer_id, beneficiary_id, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.folio)
        .bind(input.kind.as_str())
        .bind(RequisitionStatus::Capturada.as_str())
        .bind(input.subtotal)
        .bind(input.total)
        .bind(input.captured_on)
        .bind(input.requester_id)
        .bind(input.buyer_id)
        .bind(input.beneficiary_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Requisition with folio '{}' already exists",
                    input.folio
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create requisition: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            requisition_id = %requisition.requisition_id,
            total = %requisition.total,
            "Requisition created"
        );

        Ok(requisition)
    }

    /// Get a requisition by ID without locking.
    #[instrument(skip(self), fields(requisition_id = %requisition_id))]
    pub async fn get_requisition(
        &self,
        requisition_id: Uuid,
    ) -> Result<Option<Requisition>, AppError> {
        let requisition = sqlx::query_as::<_, Requisition>(&format!(
            "SELECT {} FROM requisitions WHERE requisition_id = $1",
            REQUISITION_COLUMNS
        ))
        .bind(requisition_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get requisition: {}", e)))?;

        Ok(requisition)
    }

    /// List payment entries for a requisition, oldest first.
    pub async fn list_payments(
        &self,
        requisition_id: Uuid,
    ) -> Result<Vec<PaymentEntry>, AppError> {
        let entries = sqlx::query_as::<_, PaymentEntry>(
            r#"
            SELECT payment_id, requisition_id, amount, paid_on, beneficiary_name,
                   beneficiary_bank, beneficiary_account, receipt_key, receipt_name,
                   receipt_mime, receipt_size, created_utc
            FROM payment_entries
            WHERE requisition_id = $1
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(requisition_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        Ok(entries)
    }

    /// List evidence entries for a requisition, oldest first.
    pub async fn list_evidence(
        &self,
        requisition_id: Uuid,
    ) -> Result<Vec<EvidenceEntry>, AppError> {
        let entries = sqlx::query_as::<_, EvidenceEntry>(
            r#"
            SELECT evidence_id, requisition_id, amount, doc_kind, issued_on, review_status,
                   review_comment, reviewer_id, reviewed_utc, file_key, file_name, file_mime,
                   file_size, created_utc
            FROM evidence_entries
            WHERE requisition_id = $1
            ORDER BY created_utc, evidence_id
            "#,
        )
        .bind(requisition_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list evidence: {}", e)))?;

        Ok(entries)
    }

    /// List adjustment entries for a requisition, oldest first.
    pub async fn list_adjustments(
        &self,
        requisition_id: Uuid,
    ) -> Result<Vec<AdjustmentEntry>, AppError> {
        let entries = sqlx::query_as::<_, AdjustmentEntry>(
            r#"
            SELECT adjustment_id, requisition_id, kind, direction, amount, previous_total,
                   new_total, method, reference, reason, status, created_utc, resolved_utc
            FROM adjustment_entries
            WHERE requisition_id = $1
            ORDER BY created_utc, adjustment_id
            "#,
        )
        .bind(requisition_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list adjustments: {}", e))
        })?;

        Ok(entries)
    }

    /// Get an evidence entry by ID without locking.
    pub async fn get_evidence(
        &self,
        evidence_id: Uuid,
    ) -> Result<Option<EvidenceEntry>, AppError> {
        let entry = sqlx::query_as::<_, EvidenceEntry>(
            r#"
            SELECT evidence_id, requisition_id, amount, doc_kind, issued_on, review_status,
                   review_comment, reviewer_id, reviewed_utc, file_key, file_name, file_mime,
                   file_size, created_utc
            FROM evidence_entries
            WHERE evidence_id = $1
            "#,
        )
        .bind(evidence_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get evidence: {}", e)))?;

        Ok(entry)
    }

    /// Get an adjustment entry by ID without locking.
    pub async fn get_adjustment(
        &self,
        adjustment_id: Uuid,
    ) -> Result<Option<AdjustmentEntry>, AppError> {
        let entry = sqlx::query_as::<_, AdjustmentEntry>(
            r#"
            SELECT adjustment_id, requisition_id, kind, direction, amount, previous_total,
                   new_total, method, reference, reason, status, created_utc, resolved_utc
            FROM adjustment_entries
            WHERE adjustment_id = $1
            "#,
        )
        .bind(adjustment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get adjustment: {}", e)))?;

        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// In-transaction helpers. Callers hold a transaction; the requisition lock
// acquired by `lock_requisition` serializes every check-and-write against
// the same aggregate.
// ---------------------------------------------------------------------------

/// Take the exclusive row lock on a requisition for the duration of the
/// surrounding transaction.
pub async fn lock_requisition(
    conn: &mut PgConnection,
    requisition_id: Uuid,
) -> Result<Option<Requisition>, AppError> {
    let requisition = sqlx::query_as::<_, Requisition>(&format!(
        "SELECT {} FROM requisitions WHERE requisition_id = $1 FOR UPDATE",
        REQUISITION_COLUMNS
    ))
    .bind(requisition_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock requisition: {}", e)))?;

    Ok(requisition)
}

/// Sum of all committed payment amounts for a requisition.
pub async fn sum_payments(
    conn: &mut PgConnection,
    requisition_id: Uuid,
) -> Result<Decimal, AppError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payment_entries WHERE requisition_id = $1",
    )
    .bind(requisition_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))?;

    Ok(sum.unwrap_or(Decimal::ZERO))
}

/// Sum of all evidence amounts for a requisition, regardless of review
/// status.
pub async fn sum_evidence(
    conn: &mut PgConnection,
    requisition_id: Uuid,
) -> Result<Decimal, AppError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM evidence_entries WHERE requisition_id = $1",
    )
    .bind(requisition_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum evidence: {}", e)))?;

    Ok(sum.unwrap_or(Decimal::ZERO))
}

/// Sum of approved evidence amounts for a requisition.
pub async fn sum_approved_evidence(
    conn: &mut PgConnection,
    requisition_id: Uuid,
) -> Result<Decimal, AppError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM evidence_entries
        WHERE requisition_id = $1 AND review_status = $2
        "#,
    )
    .bind(requisition_id)
    .bind(ReviewStatus::Aprobado.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to sum approved evidence: {}", e))
    })?;

    Ok(sum.unwrap_or(Decimal::ZERO))
}

/// Insert a payment entry.
pub async fn insert_payment(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    input: &NewPayment,
) -> Result<PaymentEntry, AppError> {
    let entry = sqlx::query_as::<_, PaymentEntry>(
        r#"
        INSERT INTO payment_entries
            (payment_id, requisition_id, amount, paid_on, beneficiary_name, beneficiary_bank,
             beneficiary_account, receipt_key, receipt_name, receipt_mime, receipt_size)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING payment_id, requisition_id, amount, paid_on, beneficiary_name,
                  beneficiary_bank, beneficiary_account, receipt_key, receipt_name,
                  receipt_mime, receipt_size, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(requisition_id)
    .bind(input.amount)
    .bind(input.paid_on)
    .bind(&input.beneficiary.name)
    .bind(&input.beneficiary.bank)
    .bind(&input.beneficiary.account)
    .bind(&input.receipt_key)
    .bind(&input.receipt_name)
    .bind(&input.receipt_mime)
    .bind(input.receipt_size)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)))?;

    Ok(entry)
}

/// Record the payment consequence on the requisition: first payment date
/// and the move into the evidence-collection phase.
pub async fn mark_paid(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    paid_on: chrono::NaiveDate,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE requisitions
        SET paid_on = COALESCE(paid_on, $2), status = $3, updated_utc = now()
        WHERE requisition_id = $1
        "#,
    )
    .bind(requisition_id)
    .bind(paid_on)
    .bind(RequisitionStatus::PorComprobar.as_str())
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark paid: {}", e)))?;

    Ok(())
}

/// Write a derived status back onto the requisition.
pub async fn set_status(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    status: RequisitionStatus,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE requisitions SET status = $2, updated_utc = now() WHERE requisition_id = $1",
    )
    .bind(requisition_id)
    .bind(status.as_str())
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to set status: {}", e)))?;

    Ok(())
}

/// Insert an evidence entry in `pendiente`.
pub async fn insert_evidence(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    input: &NewEvidence,
) -> Result<EvidenceEntry, AppError> {
    let entry = sqlx::query_as::<_, EvidenceEntry>(
        r#"
        INSERT INTO evidence_entries
            (evidence_id, requisition_id, amount, doc_kind, issued_on, review_status,
             file_key, file_name, file_mime, file_size)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING evidence_id, requisition_id, amount, doc_kind, issued_on, review_status,
                  review_comment, reviewer_id, reviewed_utc, file_key, file_name, file_mime,
                  file_size, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(requisition_id)
    .bind(input.amount)
    .bind(input.doc_kind.as_str())
    .bind(input.issued_on)
    .bind(ReviewStatus::Pendiente.as_str())
    .bind(&input.file_key)
    .bind(&input.file_name)
    .bind(&input.file_mime)
    .bind(input.file_size)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert evidence: {}", e)))?;

    Ok(entry)
}

/// Apply a reviewer verdict to an evidence entry. Returns `None` when the
/// entry disappeared between the caller's read and the row lock.
pub async fn update_evidence_review(
    conn: &mut PgConnection,
    evidence_id: Uuid,
    status: ReviewStatus,
    comment: Option<&str>,
    reviewer_id: Uuid,
) -> Result<Option<EvidenceEntry>, AppError> {
    let entry = sqlx::query_as::<_, EvidenceEntry>(
        r#"
        UPDATE evidence_entries
        SET review_status = $2, review_comment = $3, reviewer_id = $4, reviewed_utc = now()
        WHERE evidence_id = $1
        RETURNING evidence_id, requisition_id, amount, doc_kind, issued_on, review_status,
                  review_comment, reviewer_id, reviewed_utc, file_key, file_name, file_mime,
                  file_size, created_utc
        "#,
    )
    .bind(evidence_id)
    .bind(status.as_str())
    .bind(comment)
    .bind(reviewer_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update review: {}", e)))?;

    Ok(entry)
}

/// Delete an evidence entry, returning the removed row when it still
/// existed.
pub async fn delete_evidence(
    conn: &mut PgConnection,
    evidence_id: Uuid,
) -> Result<Option<EvidenceEntry>, AppError> {
    let entry = sqlx::query_as::<_, EvidenceEntry>(
        r#"
        DELETE FROM evidence_entries
        WHERE evidence_id = $1
        RETURNING evidence_id, requisition_id, amount, doc_kind, issued_on, review_status,
                  review_comment, reviewer_id, reviewed_utc, file_key, file_name, file_mime,
                  file_size, created_utc
        "#,
    )
    .bind(evidence_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete evidence: {}", e)))?;

    Ok(entry)
}

/// Insert an adjustment entry. Total snapshots are present only for
/// authorized increases, which are inserted already applied.
pub async fn insert_adjustment(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    input: &NewAdjustment,
    status: AdjustmentStatus,
    previous_total: Option<Decimal>,
    new_total: Option<Decimal>,
) -> Result<AdjustmentEntry, AppError> {
    let entry = sqlx::query_as::<_, AdjustmentEntry>(
        r#"
        INSERT INTO adjustment_entries
            (adjustment_id, requisition_id, kind, direction, amount, previous_total,
             new_total, method, reference, reason, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING adjustment_id, requisition_id, kind, direction, amount, previous_total,
                  new_total, method, reference, reason, status, created_utc, resolved_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(requisition_id)
    .bind(input.kind.as_str())
    .bind(input.direction.as_str())
    .bind(input.amount)
    .bind(previous_total)
    .bind(new_total)
    .bind(&input.method)
    .bind(&input.reference)
    .bind(&input.reason)
    .bind(status.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert adjustment: {}", e)))?;

    Ok(entry)
}

/// Lock an adjustment row for a lifecycle move.
pub async fn lock_adjustment(
    conn: &mut PgConnection,
    adjustment_id: Uuid,
) -> Result<Option<AdjustmentEntry>, AppError> {
    let entry = sqlx::query_as::<_, AdjustmentEntry>(
        r#"
        SELECT adjustment_id, requisition_id, kind, direction, amount, previous_total,
               new_total, method, reference, reason, status, created_utc, resolved_utc
        FROM adjustment_entries
        WHERE adjustment_id = $1
        FOR UPDATE
        "#,
    )
    .bind(adjustment_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock adjustment: {}", e)))?;

    Ok(entry)
}

/// Move an adjustment to a new lifecycle state.
pub async fn update_adjustment_status(
    conn: &mut PgConnection,
    adjustment_id: Uuid,
    status: AdjustmentStatus,
) -> Result<AdjustmentEntry, AppError> {
    let entry = sqlx::query_as::<_, AdjustmentEntry>(
        r#"
        UPDATE adjustment_entries
        SET status = $2, resolved_utc = now()
        WHERE adjustment_id = $1
        RETURNING adjustment_id, requisition_id, kind, direction, amount, previous_total,
                  new_total, method, reference, reason, status, created_utc, resolved_utc
        "#,
    )
    .bind(adjustment_id)
    .bind(status.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to update adjustment: {}", e))
    })?;

    Ok(entry)
}

/// Apply an authorized increase to the requisition total.
pub async fn apply_total(
    conn: &mut PgConnection,
    requisition_id: Uuid,
    new_total: Decimal,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE requisitions SET total = $2, updated_utc = now() WHERE requisition_id = $1",
    )
    .bind(requisition_id)
    .bind(new_total)
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to apply new total: {}", e)))?;

    Ok(())
}
