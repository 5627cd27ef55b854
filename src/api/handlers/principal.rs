//! Bearer token authentication.

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use tracing::debug;

use crate::session::{IdentityId, JwtIssuer};

/// Caller identity taken from a verified session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: IdentityId,
    pub phone_number: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the `Authorization` header into a principal, or 401.
pub fn require_auth(headers: &HeaderMap, tokens: &JwtIssuer) -> Result<Principal, StatusCode> {
    let token = bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let claims = tokens.verify(token).map_err(|err| {
        debug!("Rejected bearer token: {err}");
        StatusCode::UNAUTHORIZED
    })?;
    Ok(Principal {
        user_id: claims.user_id,
        phone_number: claims.phone_number,
    })
}
