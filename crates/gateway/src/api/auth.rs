//! Bearer-token authentication.
//!
//! Both tokens are read **once at startup** and kept only as SHA-256 digests
//! in `AppState`. Provided tokens are hashed and compared in constant time,
//! so neither content nor length leaks through timing.
//!
//! - `require_api_token` guards every `/v1` route except `/health`.
//! - `AdminGuard` additionally guards `/v1/admin/*`.
//!
//! A token that is not configured disables its check (dev mode); bootstrap
//! logs a warning when that happens.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Axum middleware for protected routes. Attach via
/// `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_token_hash {
        if !bearer_matches(req.headers(), expected) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid or missing API token" })),
            )
                .into_response();
        }
    }
    next.run(req).await
}

/// Extractor enforcing the admin token. Handlers opt in with
/// `_guard: AdminGuard`.
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match &state.admin_token_hash {
            Some(expected) if !bearer_matches(&parts.headers, expected) => Err((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid admin token" })),
            )),
            _ => Ok(AdminGuard),
        }
    }
}

fn bearer_matches(headers: &HeaderMap, expected_hash: &[u8]) -> bool {
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    let provided_hash = Sha256::digest(provided.as_bytes());
    bool::from(provided_hash.ct_eq(expected_hash))
}
