//! Actor identity and capability extractors.
//!
//! The surrounding system authenticates callers and forwards identity and
//! role claims through trusted headers (X-User-ID, X-Roles). The ledgers
//! take typed grants as arguments instead of reading ambient session
//! state, so the core stays testable without a simulated request context.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

const USER_ID_HEADER: &str = "x-user-id";
const ROLES_HEADER: &str = "x-roles";

/// Identity of the caller, used for audit attribution.
#[derive(Debug, Clone)]
pub struct ActorId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header"))
            })?;

        Ok(ActorId(user_id.to_string()))
    }
}

fn require_role(parts: &Parts, role: &str) -> Result<Uuid, AppError> {
    let user_id = parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

    let has_role = parts
        .headers
        .get(ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|roles| roles.split(',').any(|r| r.trim().eq_ignore_ascii_case(role)))
        .unwrap_or(false);

    if !has_role {
        // Deliberately says nothing about the target resource.
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Caller lacks the {} capability",
            role
        )));
    }

    Ok(user_id)
}

/// Capability to review evidence entries.
#[derive(Debug, Clone)]
pub struct ReviewerGrant {
    pub reviewer_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for ReviewerGrant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let reviewer_id = require_role(parts, "reviewer")?;
        Ok(ReviewerGrant { reviewer_id })
    }
}

/// Capability to authorize increases and sign off completed reviews.
#[derive(Debug, Clone)]
pub struct ResolverGrant {
    pub resolver_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for ResolverGrant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resolver_id = require_role(parts, "resolver")?;
        Ok(ResolverGrant { resolver_id })
    }
}
