//! Model pricing table and cost estimation

use serde::Serialize;

/// USD price per million tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPricing {
    pub input_usd_per_million: f64,
    pub output_usd_per_million: f64,
}

/// Lookup pricing for a model; unknown models fall back to the most
/// expensive row so cost estimates err high rather than low.
pub fn pricing_for(model: &str) -> ModelPricing {
    match model {
        "gpt-4o-mini" => ModelPricing {
            input_usd_per_million: 0.15,
            output_usd_per_million: 0.60,
        },
        "gpt-4o" => ModelPricing {
            input_usd_per_million: 2.50,
            output_usd_per_million: 10.00,
        },
        "claude-sonnet-4" => ModelPricing {
            input_usd_per_million: 3.00,
            output_usd_per_million: 15.00,
        },
        _ => ModelPricing {
            input_usd_per_million: 3.00,
            output_usd_per_million: 15.00,
        },
    }
}

/// Estimated cost in USD for one generation.
pub fn cost_estimate(model: &str, input_tokens: i64, output_tokens: i64) -> f64 {
    let pricing = pricing_for(model);
    (input_tokens as f64 * pricing.input_usd_per_million
        + output_tokens as f64 * pricing.output_usd_per_million)
        / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_pricing() {
        let mini = pricing_for("gpt-4o-mini");
        assert_eq!(mini.input_usd_per_million, 0.15);
        assert_eq!(mini.output_usd_per_million, 0.60);
    }

    #[test]
    fn test_unknown_model_errs_high() {
        let unknown = pricing_for("some-new-model");
        let sonnet = pricing_for("claude-sonnet-4");
        assert_eq!(unknown, sonnet);
    }

    #[test]
    fn test_cost_estimate_arithmetic() {
        // 1M input + 1M output on gpt-4o = 2.50 + 10.00
        let cost = cost_estimate("gpt-4o", 1_000_000, 1_000_000);
        assert!((cost - 12.50).abs() < 1e-9);

        // 500 in + 1500 out on gpt-4o-mini
        let cost = cost_estimate("gpt-4o-mini", 500, 1500);
        let expected = (500.0 * 0.15 + 1500.0 * 0.60) / 1_000_000.0;
        assert!((cost - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        assert_eq!(cost_estimate("gpt-4o", 0, 0), 0.0);
    }
}
