use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Metered services
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One external provider endpoint and its throughput ceilings.
///
/// Services are data-driven: adding a provider means adding a
/// `[services.<name>]` table, not code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL requests are forwarded to (e.g. `https://api.openai.com`).
    #[serde(default)]
    pub base_url: String,
    /// Environment variable holding the provider API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Header the API key is sent in (e.g. "Authorization", "x-api-key").
    #[serde(default = "d_auth_header")]
    pub auth_header: String,
    /// Prefix prepended to the key (e.g. "Bearer "). Empty for raw keys.
    #[serde(default = "d_auth_prefix")]
    pub auth_prefix: String,
    /// Tokens per minute.
    pub tpm_limit: u64,
    /// Requests per minute.
    pub rpm_limit: u64,
    /// Tokens per UTC day, across all agents.
    pub daily_token_limit: u64,
    /// Model used for pricing when the request body names none.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServiceConfig {
    /// Build a service with the given limits and every other field defaulted.
    pub fn with_limits(tpm_limit: u64, rpm_limit: u64, daily_token_limit: u64) -> Self {
        Self {
            base_url: String::new(),
            api_key_env: None,
            auth_header: d_auth_header(),
            auth_prefix: d_auth_prefix(),
            tpm_limit,
            rpm_limit,
            daily_token_limit,
            default_model: None,
            request_timeout_ms: d_request_timeout_ms(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn d_auth_header() -> String {
    "Authorization".into()
}
fn d_auth_prefix() -> String {
    "Bearer ".into()
}
fn d_request_timeout_ms() -> u64 {
    60_000
}
