//! Inbound request and outbound response shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::usage::Outcome;

/// Priority assigned when the caller does not specify one. Lower numbers are
/// serviced first.
pub const DEFAULT_PRIORITY: u32 = 5;

/// A provider call submitted by an agent.
///
/// Only `service`, `agent_id`, `estimated_tokens` and `priority` drive
/// admission. `endpoint`, `method`, `headers` and `body` are passed through to
/// the upstream untouched, except that `body.model` selects the price entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub service: String,
    /// Path appended to the service's `base_url` (e.g. `/v1/chat/completions`).
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "d_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Value,
    pub agent_id: String,
    pub estimated_tokens: u64,
    #[serde(default = "d_priority")]
    pub priority: u32,
    /// Caller-supplied id, used for cancellation. Assigned when absent.
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

impl ProxyRequest {
    pub fn new(service: impl Into<String>, agent_id: impl Into<String>, estimated_tokens: u64) -> Self {
        Self {
            service: service.into(),
            endpoint: String::new(),
            method: d_method(),
            headers: HashMap::new(),
            body: Value::Null,
            agent_id: agent_id.into(),
            estimated_tokens,
            priority: DEFAULT_PRIORITY,
            request_id: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The model named in the request body, if any.
    pub fn model(&self) -> Option<&str> {
        self.body.get("model").and_then(Value::as_str)
    }
}

fn d_method() -> String {
    "POST".into()
}

fn d_priority() -> u32 {
    DEFAULT_PRIORITY
}

/// Successful result of a routed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub success: bool,
    pub request_id: Uuid,
    pub status_code: u16,
    pub data: Value,
    pub tokens_used: u64,
    pub cost: f64,
    pub queue_time_ms: u64,
    pub request_time_ms: u64,
}

/// Error body returned to callers: `{ "success": false, "error": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub kind: Outcome,
    pub error: String,
}

impl ErrorPayload {
    pub fn from_error(request_id: Option<Uuid>, err: &Error) -> Self {
        Self {
            success: false,
            request_id,
            kind: err.outcome(),
            error: err.to_string(),
        }
    }
}
