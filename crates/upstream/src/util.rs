//! Shared helpers for the HTTP forwarder.

use tg_domain::config::ServiceConfig;

use crate::error::UpstreamError;

/// Convert a [`reqwest::Error`] into an [`UpstreamError`].
///
/// Timeout errors map to [`UpstreamError::Timeout`]; everything else maps to
/// [`UpstreamError::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout(e.to_string())
    } else {
        UpstreamError::Http(e.to_string())
    }
}

/// Resolve the service's API key from its `api_key_env` variable.
///
/// `Ok(None)` when the service is configured without credentials.
pub fn resolve_api_key(service: &ServiceConfig) -> Result<Option<String>, UpstreamError> {
    let Some(env_var) = &service.api_key_env else {
        return Ok(None);
    };
    match std::env::var(env_var) {
        Ok(key) if !key.is_empty() => Ok(Some(key)),
        _ => Err(UpstreamError::Auth(format!(
            "environment variable '{env_var}' not set or empty"
        ))),
    }
}

/// Join `base_url` and `endpoint` with exactly one slash between them.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}
