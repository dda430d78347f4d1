// crates/clace-server/src/auth.rs
// ============================================================================
// Module: Control API Authentication
// Description: HTTP Basic Auth against a bcrypt admin password hash.
// Purpose: Gate every `/_clace/*` route (spec.md §6.1, §7).
// Dependencies: axum, base64, bcrypt, clace-core, tracing
// ============================================================================

//! ## Overview
//! [`require_admin`] runs as axum middleware ahead of every control-API
//! route. An empty `security.admin_password_hash` disables the check
//! entirely — intended for local development only, and logged loudly
//! every time a request passes through unauthenticated.

use axum::body::Body;
use axum::extract::Request;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use tracing::warn;

use crate::state::AppState;

fn decode_basic_auth(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.strip_prefix("Basic ")?;
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Basic realm=\"clace\""),
    );
    response
}

/// axum middleware enforcing HTTP Basic Auth against the configured admin
/// credentials.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let hash = &state.config.security.admin_password_hash;
    if hash.is_empty() {
        warn!("admin auth disabled: security.admin_password_hash is empty");
        return next.run(request).await;
    }

    let Some(header_value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return unauthorized();
    };
    let Some((user, pass)) = decode_basic_auth(header_value) else {
        return unauthorized();
    };
    if user != state.config.security.admin_user {
        return unauthorized();
    }
    match bcrypt::verify(pass, hash) {
        Ok(true) => next.run(request).await,
        _ => unauthorized(),
    }
}

#[cfg(test)]
mod tests {
    use super::decode_basic_auth;

    #[test]
    fn decodes_user_and_password() {
        let header = format!(
            "Basic {}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b"admin:secret")
        );
        let (user, pass) = decode_basic_auth(&header).unwrap();
        assert_eq!(user, "admin");
        assert_eq!(pass, "secret");
    }

    #[test]
    fn rejects_non_basic_scheme() {
        assert!(decode_basic_auth("Bearer abc").is_none());
    }
}
