//! Maps gateway errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use uuid::Uuid;

use tg_domain::request::ErrorPayload;
use tg_domain::Error;

/// A gateway error, tagged with the request it terminated when known.
pub struct ApiError {
    pub request_id: Option<Uuid>,
    pub error: Error,
}

impl ApiError {
    pub fn new(request_id: Option<Uuid>, error: Error) -> Self {
        Self { request_id, error }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self::new(None, error)
    }
}

pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::QuotaExceeded { .. } | Error::CapacityExceeded { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        Error::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
        Error::UnknownService(_) => StatusCode::NOT_FOUND,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::Cancelled(_) => StatusCode::CONFLICT,
        Error::PricingNotFound { .. } | Error::Config(_) | Error::Io(_) | Error::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        (
            status,
            Json(ErrorPayload::from_error(self.request_id, &self.error)),
        )
            .into_response()
    }
}
