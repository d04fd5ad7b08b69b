use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use subtle::ConstantTimeEq;

use crate::error::AutoreplyError;
use crate::router::AppState;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Check the request against the configured admin key.
/// Accepts either:
/// - Header: `x-admin-key: ...`
/// - Header: `Authorization: Bearer ...`
///
/// With no key configured the admin surface does not exist, so callers get 404.
pub fn ensure_admin(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AutoreplyError> {
    let Some(expected) = expected.filter(|k| !k.is_empty()) else {
        return Err(AutoreplyError::NotFound("no such route".to_string()));
    };

    if let Some(hv) = headers.get(ADMIN_KEY_HEADER).and_then(|v| v.to_str().ok())
        && key_matches(hv.trim(), expected)
    {
        return Ok(());
    }

    if let Some(auth) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && key_matches(token.trim(), expected)
        {
            return Ok(());
        }
    }

    Err(AutoreplyError::Unauthorized)
}

fn key_matches(given: &str, expected: &str) -> bool {
    bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
pub struct RequireAdminKey;

impl FromRequestParts<AppState> for RequireAdminKey {
    type Rejection = AutoreplyError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        ensure_admin(&parts.headers, state.admin_key.as_deref())?;
        Ok(Self)
    }
}
