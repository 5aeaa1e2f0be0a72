//! Operator JWT authentication extractor.
//!
//! Validates the Bearer token on management endpoints and exposes the
//! operator's identity and merchant scope. Token issuance lives in the
//! external auth service; this side only verifies.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated operator identity from JWT claims.
#[derive(Debug, Clone)]
pub struct OperatorAuth {
    /// Operator user id from the subject claim.
    pub user_id: i64,
    /// Operator role ("superadmin" sees every merchant).
    pub role: String,
    /// Merchant the operator belongs to, if any.
    pub merchant_id: Option<i64>,
}

impl OperatorAuth {
    /// Merchant filter for scoped queries (`None` = unrestricted).
    pub fn merchant_scope(&self) -> Option<i64> {
        if self.role == "superadmin" {
            None
        } else {
            self.merchant_id
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OperatorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Invalid Authorization header format".to_string())
        })?;

        let claims = shared::jwt::verify(
            &state.config.jwt.secret,
            token,
            state.config.jwt.leeway_secs,
        )
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(OperatorAuth {
            user_id,
            role: claims.role,
            merchant_id: claims.merchant_id,
        })
    }
}
