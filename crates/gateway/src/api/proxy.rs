//! Request routing and cancellation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use uuid::Uuid;

use tg_domain::request::{ProxyRequest, ProxyResponse};

use crate::api::error::ApiError;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/proxy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds the connection open while the request waits in its queue. If the
/// client disconnects first, the dropped future withdraws the request.
pub async fn proxy(
    State(state): State<AppState>,
    Json(mut request): Json<ProxyRequest>,
) -> Result<Json<ProxyResponse>, ApiError> {
    let request_id = *request.request_id.get_or_insert_with(Uuid::new_v4);
    state
        .gateway
        .route(request)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(Some(request_id), e))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/requests/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn cancel(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> impl IntoResponse {
    if state.gateway.cancel(&request_id) {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "cancelled": true, "request_id": request_id })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "cancelled": false,
                "request_id": request_id,
                "error": "request is not queued",
            })),
        )
    }
}
