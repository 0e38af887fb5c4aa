mod gateway;
mod observability;
mod pricing;
mod quota;
mod server;
mod services;

pub use gateway::*;
pub use observability::*;
pub use pricing::*;
pub use quota::*;
pub use server::*;
pub use services::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub usage_log: UsageLogConfig,
    /// Metered services keyed by name (e.g. "openai", "anthropic").
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
    #[serde(default)]
    pub pricing: PricingTable,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the admin bearer token.
    /// If the env var is unset, admin endpoints run without auth (dev mode).
    #[serde(default = "d_admin_token_env")]
    pub token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token_env: d_admin_token_env(),
        }
    }
}

fn d_admin_token_env() -> String {
    "TOLLGATE_ADMIN_TOKEN".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        let pct = self.gateway.agent_quota_percent;
        if !(pct > 0.0 && pct <= 100.0) {
            errors.push(ConfigError::error(
                "gateway.agent_quota_percent",
                format!("must be in (0, 100], got {pct}"),
            ));
        }
        if self.gateway.queue_timeout_seconds == 0 {
            errors.push(ConfigError::error(
                "gateway.queue_timeout_seconds",
                "queue timeout must be greater than 0",
            ));
        }
        if self.gateway.max_queue_size == 0 {
            errors.push(ConfigError::warning(
                "gateway.max_queue_size",
                "0 disables queueing: every throttled request is rejected",
            ));
        }

        if self.services.is_empty() {
            errors.push(ConfigError::warning("services", "no services configured"));
        }

        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        for name in names {
            let svc = &self.services[name];
            for (field, value) in [
                ("tpm_limit", svc.tpm_limit),
                ("rpm_limit", svc.rpm_limit),
                ("daily_token_limit", svc.daily_token_limit),
            ] {
                if value == 0 {
                    errors.push(ConfigError::error(
                        format!("services.{name}.{field}"),
                        "limit must be greater than 0",
                    ));
                }
            }
            if svc.base_url.is_empty() {
                errors.push(ConfigError::warning(
                    format!("services.{name}.base_url"),
                    "no base_url: admitted requests will fail upstream",
                ));
            }
            if let Some(model) = &svc.default_model {
                if self.pricing.get(name, model).is_none() {
                    errors.push(ConfigError::warning(
                        format!("services.{name}.default_model"),
                        format!("no pricing entry for {name}/{model}"),
                    ));
                }
            }
        }

        for (service, model, price) in self.pricing.entries() {
            if !self.services.contains_key(service) {
                errors.push(ConfigError::warning(
                    format!("pricing.{service}"),
                    "pricing for a service that is not configured",
                ));
            }
            let valid = |v: f64| v.is_finite() && v >= 0.0;
            if !valid(price.input_per_1m) || !valid(price.output_per_1m) {
                errors.push(ConfigError::error(
                    format!("pricing.{service}.{model}"),
                    "prices must be finite and non-negative",
                ));
            }
        }

        for (agent, quota) in &self.quota.agents {
            if let Some(p) = quota.quota_percent {
                if !(p > 0.0 && p <= 100.0) {
                    errors.push(ConfigError::error(
                        format!("quota.agents.{agent}.quota_percent"),
                        format!("must be in (0, 100], got {p}"),
                    ));
                }
            }
        }

        let rate = self.observability.sample_rate;
        if !(0.0..=1.0).contains(&rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                format!("must be between 0.0 and 1.0, got {rate}"),
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(issues: &[ConfigError], field: &str) -> bool {
        issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == field)
    }

    #[test]
    fn default_config_only_warns() {
        let issues = Config::default().validate();
        assert!(issues
            .iter()
            .all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_limits_are_errors() {
        let mut config = Config::default();
        config
            .services
            .insert("openai".into(), ServiceConfig::with_limits(0, 10, 1000));
        let issues = config.validate();
        assert!(has_error(&issues, "services.openai.tpm_limit"));
        assert!(!has_error(&issues, "services.openai.rpm_limit"));
    }

    #[test]
    fn out_of_range_percent_is_error() {
        let mut config = Config::default();
        config.gateway.agent_quota_percent = 150.0;
        assert!(has_error(&config.validate(), "gateway.agent_quota_percent"));
    }

    #[test]
    fn sample_rate_outside_unit_interval_is_error() {
        let mut config = Config::default();
        config.observability.sample_rate = 1.5;
        assert!(has_error(&config.validate(), "observability.sample_rate"));
        config.observability.sample_rate = 0.0;
        assert!(!has_error(&config.validate(), "observability.sample_rate"));
    }

    #[test]
    fn negative_price_is_error() {
        let mut config = Config::default();
        config
            .services
            .insert("openai".into(), ServiceConfig::with_limits(1, 1, 1));
        config.pricing.insert(
            "openai",
            "gpt-4o",
            ModelPricing {
                input_per_1m: -1.0,
                output_per_1m: 1.0,
            },
        );
        assert!(has_error(&config.validate(), "pricing.openai.gpt-4o"));
    }

    #[test]
    fn display_tags_severity() {
        let issue = ConfigError::warning("services", "no services configured");
        assert_eq!(issue.to_string(), "[WARN] services: no services configured");
    }
}
