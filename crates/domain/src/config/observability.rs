use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Log filtering and optional trace export.
///
/// Logs are always JSON on stdout. Usage records are logged under the
/// `tollgate::usage` target, so `log_filter` can route them separately
/// from admission chatter. With `otlp_endpoint` set, each `route` span
/// (one per proxied request, carrying `request_id`, `service` and
/// `agent_id`) is also exported over OTLP/gRPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// OTLP gRPC collector, e.g. `http://localhost:4317`.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of `route` traces exported, in `[0.0, 1.0]`.
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: d_log_filter(),
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

impl ObservabilityConfig {
    pub fn exports_traces(&self) -> bool {
        self.otlp_endpoint.is_some() && self.sample_rate > 0.0
    }
}

fn d_log_filter() -> String {
    "info,tg_gateway=debug".into()
}

fn d_service_name() -> String {
    "tollgate".into()
}

fn d_sample_rate() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_log_only() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.log_filter, "info,tg_gateway=debug");
        assert_eq!(cfg.service_name, "tollgate");
        assert!(!cfg.exports_traces());
    }

    #[test]
    fn zero_sample_rate_disables_export() {
        let cfg: ObservabilityConfig = toml::from_str(
            r#"
            otlp_endpoint = "http://localhost:4317"
            log_filter = "warn,tollgate::usage=info"
            sample_rate = 0.0
        "#,
        )
        .unwrap();
        assert_eq!(cfg.log_filter, "warn,tollgate::usage=info");
        assert!(!cfg.exports_traces());
    }
}
