use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admission settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Global admission-control knobs shared by every service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Share of a service's daily token limit any single agent may use,
    /// in percent. Per-agent overrides live in `[quota.agents]`.
    #[serde(default = "d_agent_quota_percent")]
    pub agent_quota_percent: f64,
    /// Maximum number of waiting requests per service queue.
    #[serde(default = "d_max_queue_size")]
    pub max_queue_size: usize,
    /// How long a request may wait in a queue before it times out.
    #[serde(default = "d_queue_timeout_seconds")]
    pub queue_timeout_seconds: u64,
    /// Period of the dispatcher's refill tick, in milliseconds.
    #[serde(default = "d_dispatch_tick_ms")]
    pub dispatch_tick_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            agent_quota_percent: d_agent_quota_percent(),
            max_queue_size: d_max_queue_size(),
            queue_timeout_seconds: d_queue_timeout_seconds(),
            dispatch_tick_ms: d_dispatch_tick_ms(),
        }
    }
}

impl GatewaySettings {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_seconds)
    }

    pub fn dispatch_tick(&self) -> Duration {
        Duration::from_millis(self.dispatch_tick_ms.max(1))
    }
}

fn d_agent_quota_percent() -> f64 {
    20.0
}
fn d_max_queue_size() -> usize {
    100
}
fn d_queue_timeout_seconds() -> u64 {
    30
}
fn d_dispatch_tick_ms() -> u64 {
    100
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where usage records are shipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogConfig {
    /// Emit each record as a structured `tracing` event
    /// (target `tollgate::usage`).
    #[serde(default = "d_true")]
    pub tracing: bool,
    /// Append each record as one JSON line to this file.
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
}

impl Default for UsageLogConfig {
    fn default() -> Self {
        Self {
            tracing: true,
            jsonl_path: None,
        }
    }
}

fn d_true() -> bool {
    true
}
