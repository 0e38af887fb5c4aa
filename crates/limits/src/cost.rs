use tg_domain::config::{ModelPricing, PricingTable};
use tg_domain::{Error, Result};

/// Prices completed requests from the configured pricing table.
#[derive(Debug, Clone, Default)]
pub struct CostCalculator {
    pricing: PricingTable,
}

impl CostCalculator {
    pub fn new(pricing: PricingTable) -> Self {
        Self { pricing }
    }

    /// Look up pricing for `(service, model)`.
    pub fn price(&self, service: &str, model: &str) -> Result<ModelPricing> {
        self.pricing
            .get(service, model)
            .copied()
            .ok_or_else(|| Error::PricingNotFound {
                service: service.to_string(),
                model: model.to_string(),
            })
    }

    /// Dollar cost of a request.
    pub fn calculate_cost(
        &self,
        service: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<f64> {
        let pricing = self.price(service, model)?;
        Ok(cost_of(&pricing, input_tokens, output_tokens))
    }
}

/// `input / 1e6 × input price + output / 1e6 × output price`.
pub fn cost_of(pricing: &ModelPricing, input_tokens: u64, output_tokens: u64) -> f64 {
    input_tokens as f64 / 1_000_000.0 * pricing.input_per_1m
        + output_tokens as f64 / 1_000_000.0 * pricing.output_per_1m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> CostCalculator {
        let mut table = PricingTable::default();
        table.insert(
            "openai",
            "gpt-4o-mini",
            ModelPricing {
                input_per_1m: 0.15,
                output_per_1m: 0.60,
            },
        );
        CostCalculator::new(table)
    }

    #[test]
    fn prices_input_and_output_separately() {
        let cost = calculator()
            .calculate_cost("openai", "gpt-4o-mini", 1_000_000, 500_000)
            .unwrap();
        assert!((cost - 0.45).abs() < 1e-12);
    }

    #[test]
    fn same_inputs_same_cost() {
        let calc = calculator();
        let a = calc.calculate_cost("openai", "gpt-4o-mini", 1234, 567).unwrap();
        let b = calc.calculate_cost("openai", "gpt-4o-mini", 1234, 567).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn unknown_model_is_pricing_not_found() {
        let err = calculator()
            .calculate_cost("openai", "gpt-9", 1, 1)
            .unwrap_err();
        assert!(matches!(err, Error::PricingNotFound { ref model, .. } if model == "gpt-9"));
    }
}
