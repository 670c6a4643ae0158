use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tagg_core::error::ApiError;

use crate::error::AppError;
use crate::state::AppState;

/// JWT claims payload, as issued by the session service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user ID
    pub username: String,
    pub exp: usize,
}

/// Issue a token. The login flow lives elsewhere; this is its signing half.
pub fn issue_token(
    user_id: &str,
    username: &str,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, ApiError> {
    let exp = chrono::Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| ApiError::Internal("time overflow".into()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding failed: {e}")))
}

/// Validate a JWT token and return claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::Unauthorized(format!("invalid token: {e}")))?;

    Ok(data.claims)
}

/// Verified caller of a transcode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".into(),
            username: "anonymous".into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Pulls the token from `Authorization: Bearer …` or, for browsers that
/// cannot set headers on an upgrade, from `?token=`. Without a configured
/// secret every caller is anonymous.
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.jwt_secret.as_deref() else {
            return Ok(Identity::anonymous());
        };

        let header_token = match parts.headers.get("authorization") {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| ApiError::Unauthorized("malformed authorization header".into()))?;
                let token = value
                    .strip_prefix("Bearer ")
                    .ok_or_else(|| ApiError::Unauthorized("invalid authorization scheme".into()))?;
                Some(token.to_string())
            }
            None => None,
        };

        let token = match header_token {
            Some(token) => token,
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|q| q.0.token)
                .ok_or_else(|| ApiError::Unauthorized("missing token".into()))?,
        };

        let claims = validate_token(&token, secret)?;

        Ok(Identity {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}
