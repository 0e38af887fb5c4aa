use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pricing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1 million input (prompt) tokens.
    pub input_per_1m: f64,
    /// Dollars per 1 million output (completion) tokens.
    pub output_per_1m: f64,
}

/// Pricing table keyed by service, then model:
///
/// ```toml
/// [pricing.openai."gpt-4o-mini"]
/// input_per_1m = 0.15
/// output_per_1m = 0.60
/// ```
///
/// Loaded once from configuration and never written by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable(HashMap<String, HashMap<String, ModelPricing>>);

impl PricingTable {
    pub fn get(&self, service: &str, model: &str) -> Option<&ModelPricing> {
        self.0.get(service)?.get(model)
    }

    pub fn insert(&mut self, service: impl Into<String>, model: impl Into<String>, pricing: ModelPricing) {
        self.0
            .entry(service.into())
            .or_default()
            .insert(model.into(), pricing);
    }

    /// Iterate `(service, model, pricing)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &ModelPricing)> {
        self.0.iter().flat_map(|(service, models)| {
            models
                .iter()
                .map(move |(model, pricing)| (service.as_str(), model.as_str(), pricing))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(HashMap::is_empty)
    }
}
