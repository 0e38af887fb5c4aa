use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use crate::api::auth::AdminGuard;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/admin/reset: zero every service's daily counters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn reset(_guard: AdminGuard, State(state): State<AppState>) -> impl IntoResponse {
    match state.gateway.reset_daily_counters() {
        Some(day) => (
            StatusCode::OK,
            Json(serde_json::json!({ "reset": true, "day": day })),
        ),
        None => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "reset": false,
                "error": "a reset is already in progress",
            })),
        ),
    }
}
