use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-million-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Used for any model missing from the table.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_mtok: 15.0,
    output_per_mtok: 75.0,
};

impl ModelPricing {
    /// Estimated cost of one call. Streaming and non-streaming results both
    /// go through here.
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_per_mtok
            + (output_tokens as f64 / 1_000_000.0) * self.output_per_mtok
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        DEFAULT_PRICING
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert("claude-sonnet-4-5".to_string(), DEFAULT_PRICING);
        models.insert(
            "claude-haiku-4-5".to_string(),
            ModelPricing {
                input_per_mtok: 1.0,
                output_per_mtok: 5.0,
            },
        );
        models.insert("stub".to_string(), DEFAULT_PRICING);
        Self { models }
    }
}

impl PricingTable {
    /// Built-in prices with config entries layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, ModelPricing>) -> Self {
        let mut table = Self::default();
        for (model, pricing) in overrides {
            table.models.insert(model.clone(), *pricing);
        }
        table
    }

    pub fn lookup(&self, model: &str) -> ModelPricing {
        match self.models.get(model) {
            Some(p) => *p,
            None => {
                tracing::warn!(model, "no pricing entry for model; using default rates");
                DEFAULT_PRICING
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelPricing)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }
}
