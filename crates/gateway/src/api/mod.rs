pub mod admin;
pub mod auth;
pub mod error;
pub mod proxy;
pub mod status;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the `TOLLGATE_API_TOKEN` bearer-token middleware). Admin
/// routes check the admin token instead, via [`auth::AdminGuard`].
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(status::health));

    let admin_routes = Router::new().route("/v1/admin/reset", post(admin::reset));

    let protected = Router::new()
        // Routing
        .route("/v1/proxy", post(proxy::proxy))
        .route("/v1/requests/:id", delete(proxy::cancel))
        // Status
        .route("/v1/status", get(status::list_status))
        .route("/v1/status/:service", get(status::service_status))
        .route("/v1/usage", get(status::all_usage))
        .route("/v1/usage/:agent_id", get(status::agent_usage))
        .route("/v1/stats", get(status::stats))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public.merge(admin_routes).merge(protected)
}
