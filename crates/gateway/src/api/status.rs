//! Read-only views: health, per-service status, per-agent usage, stats.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use tg_limits::ServiceStatus;

use crate::api::error::ApiError;
use crate::state::AppState;

/// Lightweight health probe (public, no auth).
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "services": state.gateway.state().registry().len(),
    }))
}

pub async fn list_status(State(state): State<AppState>) -> impl IntoResponse {
    let services = state.gateway.statuses();
    Json(serde_json::json!({
        "count": services.len(),
        "services": services,
    }))
}

pub async fn service_status(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<ServiceStatus>, ApiError> {
    Ok(Json(state.gateway.status(&service)?))
}

pub async fn all_usage(State(state): State<AppState>) -> impl IntoResponse {
    let usage = state.gateway.all_agent_usage();
    Json(serde_json::json!({
        "count": usage.len(),
        "usage": usage,
    }))
}

/// One entry per configured service, zeros where the agent has no activity.
pub async fn agent_usage(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "agent_id": agent_id,
        "usage": state.gateway.agent_usage(&agent_id),
    }))
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.stats())
}
