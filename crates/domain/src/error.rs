use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::usage::Outcome;

/// Which allotment a quota rejection was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    /// The agent's share of the service's daily token limit.
    Agent,
    /// The service's daily token limit as a whole.
    Service,
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => f.write_str("agent"),
            Self::Service => f.write_str("service"),
        }
    }
}

/// Shared error type used across all Tollgate crates.
///
/// The request-level variants (`QuotaExceeded` through `Cancelled`) are all
/// terminal: the gateway never retries them on the caller's behalf.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(
        "{scope} quota exceeded for agent {agent_id} on {service}: \
         {used} used + {requested} requested > {limit}"
    )]
    QuotaExceeded {
        service: String,
        agent_id: String,
        scope: QuotaScope,
        used: u64,
        requested: u64,
        limit: u64,
    },

    #[error("capacity exceeded on {service}: {reason}")]
    CapacityExceeded { service: String, reason: String },

    #[error("timed out after {waited_ms}ms in the {service} queue")]
    TimedOut { service: String, waited_ms: u64 },

    #[error("no pricing configured for {service}/{model}")]
    PricingNotFound { service: String, model: String },

    #[error("upstream {service}: {message}")]
    Upstream {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("request {0} was cancelled while queued")]
    Cancelled(Uuid),
}

impl Error {
    /// The usage-record outcome this error terminates a request with.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::QuotaExceeded { .. } => Outcome::QuotaExceeded,
            Self::CapacityExceeded { .. } => Outcome::CapacityExceeded,
            Self::TimedOut { .. } => Outcome::TimedOut,
            Self::PricingNotFound { .. } => Outcome::PricingNotFound,
            Self::Upstream { .. } => Outcome::UpstreamError,
            Self::Cancelled(_) => Outcome::Cancelled,
            Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::UnknownService(_)
            | Self::InvalidRequest(_) => Outcome::Rejected,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
