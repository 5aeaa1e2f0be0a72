//! Operator JWT utilities using HS256.
//!
//! Token issuance (login, refresh) lives in the management frontend's auth
//! service; this module only defines the claims shape shared with it and the
//! verification path the API uses. The signing helper exists for local
//! tooling and tests.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for JWT operations.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    EncodingError(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,
}

/// Operator identity claims.
///
/// `merchant_id` is `None` for superadmins, who see every merchant's fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorClaims {
    /// Subject (operator user id, stringified).
    pub sub: String,
    /// Operator role ("superadmin", "merchant_admin", ...).
    pub role: String,
    /// Merchant scope for non-superadmin operators.
    #[serde(default)]
    pub merchant_id: Option<i64>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    pub iat: i64,
}

impl OperatorClaims {
    /// Parses the subject claim as a numeric user id.
    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidToken)
    }

    /// Whether this operator sees all merchants.
    pub fn is_superadmin(&self) -> bool {
        self.role == "superadmin"
    }

    /// Merchant filter for scoped queries (`None` = unrestricted).
    pub fn merchant_scope(&self) -> Option<i64> {
        if self.is_superadmin() {
            None
        } else {
            self.merchant_id
        }
    }
}

/// Signs operator claims with the shared HS256 secret.
pub fn sign(secret: &str, user_id: i64, role: &str, merchant_id: Option<i64>, ttl_secs: i64) -> Result<String, JwtError> {
    let now = Utc::now();
    let claims = OperatorClaims {
        sub: user_id.to_string(),
        role: role.to_string(),
        merchant_id,
        exp: (now + Duration::seconds(ttl_secs)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::EncodingError(e.to_string()))
}

/// Verifies a token and returns its claims.
///
/// `leeway_secs` tolerates clock skew between the auth service and this API.
pub fn verify(secret: &str, token: &str, leeway_secs: u64) -> Result<OperatorClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = leeway_secs;

    decode::<OperatorClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::InvalidToken,
    })
}
