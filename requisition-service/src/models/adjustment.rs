//! Post-hoc corrections to a requisition's financial record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Refund,
    Shortfall,
    AuthorizedIncrease,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refund => "refund",
            Self::Shortfall => "shortfall",
            Self::AuthorizedIncrease => "authorized_increase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refund" => Some(Self::Refund),
            "shortfall" => Some(Self::Shortfall),
            "authorized_increase" => Some(Self::AuthorizedIncrease),
            _ => None,
        }
    }
}

/// Who the correction favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    FavorsOrganization,
    FavorsRequester,
}

impl AdjustmentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FavorsOrganization => "favors_organization",
            Self::FavorsRequester => "favors_requester",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "favors_organization" => Some(Self::FavorsOrganization),
            "favors_requester" => Some(Self::FavorsRequester),
            _ => None,
        }
    }
}

/// Adjustment lifecycle: pendiente -> {aprobado|rechazado} -> aplicado,
/// or cancelado from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentStatus {
    Pendiente,
    Aprobado,
    Rechazado,
    Aplicado,
    Cancelado,
}

impl AdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Aprobado => "aprobado",
            Self::Rechazado => "rechazado",
            Self::Aplicado => "aplicado",
            Self::Cancelado => "cancelado",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pendiente" => Some(Self::Pendiente),
            "aprobado" => Some(Self::Aprobado),
            "rechazado" => Some(Self::Rechazado),
            "aplicado" => Some(Self::Aplicado),
            "cancelado" => Some(Self::Cancelado),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rechazado | Self::Aplicado | Self::Cancelado)
    }

    /// Legal lifecycle moves, `cancelado` reachable from any live state.
    pub fn can_move_to(&self, next: AdjustmentStatus) -> bool {
        if next == Self::Cancelado {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Pendiente, Self::Aprobado)
                | (Self::Pendiente, Self::Rechazado)
                | (Self::Aprobado, Self::Aplicado)
        )
    }
}

impl std::fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Target state for resolving an adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentResolution {
    Aprobado,
    Rechazado,
    Aplicado,
    Cancelado,
}

impl AdjustmentResolution {
    pub fn as_status(&self) -> AdjustmentStatus {
        match self {
            Self::Aprobado => AdjustmentStatus::Aprobado,
            Self::Rechazado => AdjustmentStatus::Rechazado,
            Self::Aplicado => AdjustmentStatus::Aplicado,
            Self::Cancelado => AdjustmentStatus::Cancelado,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdjustmentEntry {
    pub adjustment_id: Uuid,
    pub requisition_id: Uuid,
    pub kind: String,
    pub direction: String,
    pub amount: Decimal,
    pub previous_total: Option<Decimal>,
    pub new_total: Option<Decimal>,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub reason: String,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub resolved_utc: Option<DateTime<Utc>>,
}

impl AdjustmentEntry {
    pub fn parsed_status(&self) -> Option<AdjustmentStatus> {
        AdjustmentStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct NewAdjustment {
    pub kind: AdjustmentKind,
    pub direction: AdjustmentDirection,
    pub amount: Decimal,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves() {
        use AdjustmentStatus::*;
        assert!(Pendiente.can_move_to(Aprobado));
        assert!(Pendiente.can_move_to(Rechazado));
        assert!(Aprobado.can_move_to(Aplicado));
        assert!(!Pendiente.can_move_to(Aplicado));
        assert!(!Rechazado.can_move_to(Aplicado));
        assert!(!Aplicado.can_move_to(Aprobado));
    }

    #[test]
    fn cancel_allowed_from_live_states_only() {
        use AdjustmentStatus::*;
        assert!(Pendiente.can_move_to(Cancelado));
        assert!(Aprobado.can_move_to(Cancelado));
        assert!(!Aplicado.can_move_to(Cancelado));
        assert!(!Cancelado.can_move_to(Cancelado));
    }
}
