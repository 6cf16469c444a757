//! Payment entries recorded against a requisition.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Beneficiary bank details copied into the entry at write time. Later
/// edits to the supplier or employee record must not alter historical
/// payment rows, so this is a snapshot, not a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneficiarySnapshot {
    pub name: String,
    pub bank: Option<String>,
    pub account: Option<String>,
}

/// A committed beneficiary payment. Insert-only: never updated, never
/// deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub payment_id: Uuid,
    pub requisition_id: Uuid,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub beneficiary_name: String,
    pub beneficiary_bank: Option<String>,
    pub beneficiary_account: Option<String>,
    pub receipt_key: String,
    pub receipt_name: String,
    pub receipt_mime: String,
    pub receipt_size: i64,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment. The transfer receipt has already been
/// written to the blob store when this reaches the ledger.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub beneficiary: BeneficiarySnapshot,
    pub receipt_key: String,
    pub receipt_name: String,
    pub receipt_mime: String,
    pub receipt_size: i64,
}
