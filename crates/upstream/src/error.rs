use serde_json::Value;

/// Why a forwarded request did not produce a usable provider response.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: Value },

    #[error("auth: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// HTTP status returned by the provider, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Lift into the shared error type, tagged with the service name.
    pub fn into_domain(self, service: &str) -> tg_domain::Error {
        tg_domain::Error::Upstream {
            service: service.to_string(),
            status: self.status(),
            message: self.to_string(),
        }
    }
}
