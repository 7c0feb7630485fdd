//! Access token (HS256 JWT) verification. Tokens are issued by the
//! account service that shares `JWT_SECRET`.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: i64,
}

fn default_role() -> String {
    "user".to_string()
}

/// Verify signature and expiry, returning the claims.
pub fn verify_access_token(secret: &str, token: &str) -> Result<AccessClaims, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(?e, "access token validation failed");
        ApiError::unauthorized("Invalid or expired token")
    })
}
