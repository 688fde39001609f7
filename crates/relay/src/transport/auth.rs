// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token validation for the HTTP/WS shim (`SPEC_FULL.md` §6
//! "Authentication collaborator"). The Relay itself never validates tokens —
//! it only ever consumes an already-resolved `user_id` for the ownership
//! check in `spec.md` §4.4. Grounded on the teacher's (`coopmux`)
//! `transport::auth::validate_bearer` / `validate_ws_query`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::RelayError;
use crate::state::AppState;

/// Constant-time string comparison to avoid a timing side-channel on the
/// configured token.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. No-op if no token is configured.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), RelayError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header =
        headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(RelayError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(RelayError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(RelayError::Unauthorized)
    }
}

/// Validate a token carried as a WebSocket query parameter. No-op if no
/// token is configured.
pub fn validate_token_param(token: Option<&str>, expected: Option<&str>) -> Result<(), RelayError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };
    match token {
        Some(t) if constant_time_eq(t, expected) => Ok(()),
        _ => Err(RelayError::Unauthorized),
    }
}

/// Axum middleware enforcing Bearer token auth on the HTTP routes. Exempt:
/// `/healthz` and WebSocket upgrades under `/ws/` (those validate the token
/// as a query parameter instead, see `validate_token_param`).
pub async fn http_auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if path == "/healthz" || path.starts_with("/ws/") {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        return code.to_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn bearer_passes_when_no_token_configured() {
        let headers = HeaderMap::new();
        assert!(validate_bearer(&headers, None).is_ok());
    }

    #[test]
    fn bearer_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(validate_bearer(&headers, Some("secret")), Err(RelayError::Unauthorized));
    }

    #[test]
    fn bearer_accepts_matching_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        assert!(validate_bearer(&headers, Some("secret")).is_ok());
    }

    #[test]
    fn bearer_rejects_mismatched_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer wrong"));
        assert_eq!(validate_bearer(&headers, Some("secret")), Err(RelayError::Unauthorized));
    }

    #[test]
    fn ws_token_param_accepts_match_and_rejects_mismatch() {
        assert!(validate_token_param(Some("secret"), Some("secret")).is_ok());
        assert_eq!(
            validate_token_param(Some("nope"), Some("secret")),
            Err(RelayError::Unauthorized)
        );
        assert_eq!(validate_token_param(None, Some("secret")), Err(RelayError::Unauthorized));
        assert!(validate_token_param(None, None).is_ok());
    }
}
