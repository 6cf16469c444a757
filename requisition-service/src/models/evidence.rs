//! Evidence entries (comprobantes) and the reviewer workflow vocabulary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of proof-of-expense document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Invoice,
    Ticket,
    Note,
    Other,
}

impl DocKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Ticket => "ticket",
            Self::Note => "note",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "invoice" => Some(Self::Invoice),
            "ticket" => Some(Self::Ticket),
            "note" => Some(Self::Note),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Review state of a single evidence entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pendiente,
    Aprobado,
    Rechazado,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Aprobado => "aprobado",
            Self::Rechazado => "rechazado",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pendiente" => Some(Self::Pendiente),
            "aprobado" => Some(Self::Aprobado),
            "rechazado" => Some(Self::Rechazado),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reviewer verdict over one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Aprobado,
    Rechazado,
}

impl ReviewDecision {
    pub fn as_review_status(&self) -> ReviewStatus {
        match self {
            Self::Aprobado => ReviewStatus::Aprobado,
            Self::Rechazado => ReviewStatus::Rechazado,
        }
    }
}

/// A proof-of-expense document submitted against a requisition.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub evidence_id: Uuid,
    pub requisition_id: Uuid,
    pub amount: Decimal,
    pub doc_kind: String,
    pub issued_on: NaiveDate,
    pub review_status: String,
    pub review_comment: Option<String>,
    pub reviewer_id: Option<Uuid>,
    pub reviewed_utc: Option<DateTime<Utc>>,
    pub file_key: String,
    pub file_name: String,
    pub file_mime: String,
    pub file_size: i64,
    pub created_utc: DateTime<Utc>,
}

impl EvidenceEntry {
    pub fn parsed_review_status(&self) -> Option<ReviewStatus> {
        ReviewStatus::parse(&self.review_status)
    }
}

/// Input for recording an evidence entry. File already in the blob store.
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub amount: Decimal,
    pub doc_kind: DocKind,
    pub issued_on: NaiveDate,
    pub file_key: String,
    pub file_name: String,
    pub file_mime: String,
    pub file_size: i64,
}
