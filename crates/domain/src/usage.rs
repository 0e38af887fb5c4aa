//! Usage records, the unit the external logging sink consumes.
//!
//! Exactly one [`UsageRecord`] is produced per terminal request outcome,
//! including rejections and timeouts, so totals reconcile against requests
//! attempted rather than requests that succeeded.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal outcome of a routed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    QuotaExceeded,
    CapacityExceeded,
    TimedOut,
    PricingNotFound,
    UpstreamError,
    Cancelled,
    /// Malformed requests and unknown services.
    Rejected,
}

impl Outcome {
    pub const ALL: [Outcome; 8] = [
        Outcome::Success,
        Outcome::QuotaExceeded,
        Outcome::CapacityExceeded,
        Outcome::TimedOut,
        Outcome::PricingNotFound,
        Outcome::UpstreamError,
        Outcome::Cancelled,
        Outcome::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::QuotaExceeded => "quota_exceeded",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::TimedOut => "timed_out",
            Self::PricingNotFound => "pricing_not_found",
            Self::UpstreamError => "upstream_error",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable fact about one completed, failed or rejected request.
///
/// `tokens` carries the provider-reported total on success and the caller's
/// estimate otherwise. `cost` is zero for every outcome except `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: Uuid,
    pub service: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub tokens: u64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    pub cost: f64,
    /// Wall time from submission to the terminal outcome.
    pub duration_ms: u64,
    #[serde(default)]
    pub queue_time_ms: u64,
    pub outcome: Outcome,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_snake_case() {
        for outcome in Outcome::ALL {
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.as_str()));
        }
    }

    #[test]
    fn record_omits_missing_model() {
        let record = UsageRecord {
            request_id: Uuid::new_v4(),
            service: "openai".into(),
            agent_id: "alpha".into(),
            model: None,
            tokens: 10,
            input_tokens: 10,
            output_tokens: 0,
            cost: 0.0,
            duration_ms: 3,
            queue_time_ms: 0,
            outcome: Outcome::QuotaExceeded,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("model").is_none());
        assert_eq!(value["outcome"], "quota_exceeded");
    }
}
