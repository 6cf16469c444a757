//! Requisition aggregate root and its status machine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Whether money moves before or after the expense happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequisitionKind {
    Advance,
    Reimbursement,
}

impl RequisitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Reimbursement => "reimbursement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "advance" => Some(Self::Advance),
            "reimbursement" => Some(Self::Reimbursement),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequisitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requisition lifecycle. One closed enumeration; the database stores the
/// lowercase string. The ledgers only ever write `por_comprobar`,
/// `comprobada`, `comprobacion_aceptada` and the `autorizada` regression;
/// the remaining states come from the capture/authorization workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Borrador,
    Capturada,
    Autorizada,
    Pagada,
    PorComprobar,
    Comprobada,
    ComprobacionAceptada,
    Rechazada,
    Eliminada,
}

impl RequisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Borrador => "borrador",
            Self::Capturada => "capturada",
            Self::Autorizada => "autorizada",
            Self::Pagada => "pagada",
            Self::PorComprobar => "por_comprobar",
            Self::Comprobada => "comprobada",
            Self::ComprobacionAceptada => "comprobacion_aceptada",
            Self::Rechazada => "rechazada",
            Self::Eliminada => "eliminada",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "borrador" => Some(Self::Borrador),
            "capturada" => Some(Self::Capturada),
            "autorizada" => Some(Self::Autorizada),
            "pagada" => Some(Self::Pagada),
            "por_comprobar" => Some(Self::PorComprobar),
            "comprobada" => Some(Self::Comprobada),
            "comprobacion_aceptada" => Some(Self::ComprobacionAceptada),
            "rechazada" => Some(Self::Rechazada),
            "eliminada" => Some(Self::Eliminada),
            _ => None,
        }
    }

    /// Terminal states accept no further ledger mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rechazada | Self::Eliminada)
    }

    /// States in which approved evidence currently covers the total.
    pub fn is_evidenced(&self) -> bool {
        matches!(self, Self::Comprobada | Self::ComprobacionAceptada)
    }
}

impl std::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Requisition row. Amounts are fixed-point; `total` only ever changes via
/// an applied authorized-increase adjustment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Requisition {
    pub requisition_id: Uuid,
    pub folio: String,
    pub kind: String,
    pub status: String,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub captured_on: NaiveDate,
    pub paid_on: Option<NaiveDate>,
    pub requester_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub beneficiary_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Requisition {
    pub fn parsed_status(&self) -> Option<RequisitionStatus> {
        RequisitionStatus::parse(&self.status)
    }

    pub fn parsed_kind(&self) -> Option<RequisitionKind> {
        RequisitionKind::parse(&self.kind)
    }
}

/// Input for creating a requisition (capture workflow).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRequisition {
    pub folio: String,
    pub kind: RequisitionKind,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub captured_on: NaiveDate,
    pub requester_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub beneficiary_id: Option<Uuid>,
}
