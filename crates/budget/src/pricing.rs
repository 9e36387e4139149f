//! Pricing table (C3): base per-model prices plus config-supplied overrides.

use std::collections::HashMap;

use platform_domain::{ModelPrice, FALLBACK_PRICE};

/// Base table, seeded at `PricingTable::default()`. Plain literal array
/// favoring simple data over an extra crate (no `phf`) — prices are USD per
/// 1k tokens, `{input, output}`.
fn base_prices() -> HashMap<String, ModelPrice> {
    [
        ("gpt-4o", ModelPrice { input: 0.005, output: 0.015 }),
        ("gpt-4o-mini", ModelPrice { input: 0.00015, output: 0.0006 }),
        ("gemini-1.5-flash", ModelPrice { input: 0.000075, output: 0.0003 }),
        ("gemini-2.5-pro", ModelPrice { input: 0.00125, output: 0.01 }),
        ("gemini-2.5-flash", ModelPrice { input: 0.0003, output: 0.0025 }),
        ("claude-3-5-sonnet", ModelPrice { input: 0.003, output: 0.015 }),
        ("claude-3-5-haiku", ModelPrice { input: 0.0008, output: 0.004 }),
    ]
    .into_iter()
    .map(|(name, price)| (name.to_string(), price))
    .collect()
}

pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            prices: base_prices(),
        }
    }
}

impl PricingTable {
    /// Builds the table from the base set, overridden per-key by
    /// `BudgetConfig.custom_model_prices`.
    pub fn with_overrides(overrides: &HashMap<String, ModelPrice>) -> Self {
        let mut prices = base_prices();
        for (model, price) in overrides {
            prices.insert(model.clone(), *price);
        }
        Self { prices }
    }

    /// Looks up a model's price, falling back to the conservative default
    /// and logging the miss so pricing gaps surface in ops rather than
    /// silently under-billing.
    pub fn price_for(&self, model: &str) -> ModelPrice {
        match self.prices.get(model) {
            Some(price) => *price,
            None => {
                tracing::warn!(model = %model, "model-not-priced");
                FALLBACK_PRICE
            }
        }
    }

    /// `(input_cost, output_cost, total_cost)` for a call, prices per 1k tokens.
    pub fn cost(&self, model: &str, prompt_tokens: i64, completion_tokens: i64) -> (f64, f64, f64) {
        let price = self.price_for(model);
        let input_cost = (prompt_tokens as f64 / 1000.0) * price.input;
        let output_cost = (completion_tokens as f64 / 1000.0) * price.output;
        (input_cost, output_cost, input_cost + output_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back() {
        let table = PricingTable::default();
        let (input, output, total) = table.cost("some-unreleased-model", 1000, 1000);
        assert_eq!(input, FALLBACK_PRICE.input);
        assert_eq!(output, FALLBACK_PRICE.output);
        assert_eq!(total, FALLBACK_PRICE.input + FALLBACK_PRICE.output);
    }

    #[test]
    fn override_replaces_base_price() {
        let mut overrides = HashMap::new();
        overrides.insert("gpt-4o".to_string(), ModelPrice { input: 1.0, output: 2.0 });
        let table = PricingTable::with_overrides(&overrides);
        assert_eq!(table.price_for("gpt-4o").input, 1.0);
    }
}
