//! Bearer token issuance and the authenticated-user extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::server::config::TOKEN_TTL_SECS;
use crate::server::state::ServerState;
use crate::server::utils::{api_error, now_secs};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub email: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
}

/// Sign a token for a verified user.
pub fn issue_token(
    user_id: i64,
    email: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: now_secs() + TOKEN_TTL_SECS,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Decode and validate a token, returning the authenticated user id.
pub fn verify_token(token: &str, secret: &str) -> Option<i64> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .ok()
}

/// Extractor for handlers that require a caller identity. Missing or invalid
/// bearer tokens are rejected with 401 before the handler runs.
pub struct AuthUser {
    pub user_id: i64,
}

#[axum::async_trait]
impl FromRequestParts<ServerState> for AuthUser {
    type Rejection = axum::response::Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "missing bearer token"))?;

        let secret = {
            let st = state.shared.lock().await;
            st.jwt_secret.clone()
        };

        match verify_token(token, &secret) {
            Some(user_id) => Ok(AuthUser { user_id }),
            None => Err(api_error(
                StatusCode::UNAUTHORIZED,
                "invalid or expired token",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let token = issue_token(42, "a@example.com", "secret").unwrap();
        assert_eq!(verify_token(&token, "secret"), Some(42));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = issue_token(42, "a@example.com", "secret").unwrap();
        assert_eq!(verify_token(&token, "other"), None);
    }

    #[test]
    fn garbage_rejected() {
        assert_eq!(verify_token("not-a-token", "secret"), None);
    }
}
