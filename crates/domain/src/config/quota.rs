use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-agent overrides of the default fair-share quota.
///
/// Agents without an entry get `gateway.agent_quota_percent` of each
/// service's daily token limit.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuotaConfig {
    /// Overrides keyed by agent_id.
    #[serde(default)]
    pub agents: HashMap<String, AgentQuota>,
}

/// Daily quota override for a specific agent. When both fields are set,
/// `daily_tokens` wins.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentQuota {
    /// Share of each service's daily token limit, in percent.
    #[serde(default)]
    pub quota_percent: Option<f64>,
    /// Absolute daily token ceiling per service.
    #[serde(default)]
    pub daily_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_agent_overrides() {
        let toml_str = r#"
            [agents.planner]
            quota_percent = 50.0

            [agents.batch]
            daily_tokens = 2500
        "#;
        let cfg: QuotaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.agents["planner"].quota_percent, Some(50.0));
        assert_eq!(cfg.agents["batch"].daily_tokens, Some(2500));
        assert!(cfg.agents["batch"].quota_percent.is_none());
    }
}
