// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing tables and cost calculation.
//!
//! Built-in prices are list prices in USD per million tokens. Anthropic
//! models bill cache writes at a 25% premium over input and cache reads at
//! 10% of input; OpenAI-style models have no separate cache-write charge.

use std::collections::BTreeMap;

use serde::Serialize;
use tokenscope_config::model::PricingEntry;
use tokenscope_core::UsageTotals;
use tracing::debug;

/// Catalog key holding the fallback price record.
pub const DEFAULT_PRICING_KEY: &str = "default";

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPricing {
    /// Cost per million input tokens.
    pub input_per_mtok: f64,
    /// Cost per million output tokens (reasoning is billed as output).
    pub output_per_mtok: f64,
    /// Cost per million cache-read tokens.
    pub cache_read_per_mtok: f64,
    /// Cost per million cache-write (creation) tokens.
    pub cache_write_per_mtok: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64, cache_read: f64, cache_write: f64) -> Self {
        Self {
            input_per_mtok: input,
            output_per_mtok: output,
            cache_read_per_mtok: cache_read,
            cache_write_per_mtok: cache_write,
        }
    }
}

impl From<PricingEntry> for ModelPricing {
    fn from(entry: PricingEntry) -> Self {
        Self::new(entry.input, entry.output, entry.cache_read, entry.cache_write)
    }
}

/// USD for `tokens` at `per_mtok`.
pub fn token_cost(tokens: u64, per_mtok: f64) -> f64 {
    (tokens as f64 / 1_000_000.0) * per_mtok
}

/// Calculate cost in USD for a usage total and pricing.
///
/// Four classes: input, output plus reasoning, cache read, cache write.
pub fn calculate_cost(usage: &UsageTotals, pricing: &ModelPricing) -> f64 {
    let input = token_cost(usage.input, pricing.input_per_mtok);
    let output = token_cost(usage.output + usage.reasoning, pricing.output_per_mtok);
    let cache_read = token_cost(usage.cache_read, pricing.cache_read_per_mtok);
    let cache_write = token_cost(usage.cache_write, pricing.cache_write_per_mtok);
    input + output + cache_read + cache_write
}

/// Result of a catalog lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingMatch {
    /// Catalog key that matched, `default` for the fallback.
    pub key: String,
    pub pricing: ModelPricing,
}

/// Mapping from normalized model name to pricing, with a mandatory fallback.
#[derive(Debug, Clone)]
pub struct PricingCatalog {
    entries: BTreeMap<String, ModelPricing>,
    default: ModelPricing,
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PricingCatalog {
    pub fn new(default: ModelPricing) -> Self {
        Self {
            entries: BTreeMap::new(),
            default,
        }
    }

    pub fn builtin() -> Self {
        // Unknown models are priced like a mid-tier model so cost never silently reads as zero.
        let mut catalog = Self::new(ModelPricing::new(3.0, 15.0, 0.30, 3.75));
        for (model, pricing) in [
            ("claude-opus-4", ModelPricing::new(15.0, 75.0, 1.50, 18.75)),
            ("claude-sonnet-4", ModelPricing::new(3.0, 15.0, 0.30, 3.75)),
            ("claude-3-7-sonnet", ModelPricing::new(3.0, 15.0, 0.30, 3.75)),
            ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0, 0.30, 3.75)),
            ("claude-haiku-4-5", ModelPricing::new(1.0, 5.0, 0.10, 1.25)),
            ("claude-3-5-haiku", ModelPricing::new(0.80, 4.0, 0.08, 1.0)),
            ("gpt-5", ModelPricing::new(1.25, 10.0, 0.125, 0.0)),
            ("gpt-4.1", ModelPricing::new(2.0, 8.0, 0.50, 0.0)),
            ("gpt-4.1-mini", ModelPricing::new(0.40, 1.60, 0.10, 0.0)),
            ("gpt-4o", ModelPricing::new(2.50, 10.0, 1.25, 0.0)),
            ("gpt-4o-mini", ModelPricing::new(0.15, 0.60, 0.075, 0.0)),
            ("o3", ModelPricing::new(2.0, 8.0, 0.50, 0.0)),
            ("o4-mini", ModelPricing::new(1.10, 4.40, 0.275, 0.0)),
            ("gemini-2.5-pro", ModelPricing::new(1.25, 10.0, 0.31, 0.0)),
            ("gemini-2.5-flash", ModelPricing::new(0.30, 2.50, 0.075, 0.0)),
            ("deepseek-chat", ModelPricing::new(0.27, 1.10, 0.07, 0.0)),
            ("deepseek-reasoner", ModelPricing::new(0.55, 2.19, 0.14, 0.0)),
        ] {
            catalog.insert(model, pricing);
        }
        catalog
    }

    /// Merge configured entries; the `default` key replaces the fallback.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, PricingEntry>) -> Self {
        for (model, entry) in overrides {
            if normalize_model(model) == DEFAULT_PRICING_KEY {
                self.default = ModelPricing::from(*entry);
            } else {
                self.insert(model, ModelPricing::from(*entry));
            }
        }
        self
    }

    pub fn insert(&mut self, model: &str, pricing: ModelPricing) {
        self.entries.insert(normalize_model(model), pricing);
    }

    pub fn default_pricing(&self) -> ModelPricing {
        self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match, then longest key that prefixes the model, then `default`.
    pub fn lookup(&self, model: &str) -> PricingMatch {
        let normalized = normalize_model(model);

        if let Some(pricing) = self.entries.get(&normalized) {
            return PricingMatch {
                key: normalized,
                pricing: *pricing,
            };
        }

        let prefix = self
            .entries
            .iter()
            .filter(|(key, _)| normalized.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len());

        match prefix {
            Some((key, pricing)) => PricingMatch {
                key: key.clone(),
                pricing: *pricing,
            },
            None => {
                debug!(model, "no pricing entry, using default");
                PricingMatch {
                    key: DEFAULT_PRICING_KEY.to_string(),
                    pricing: self.default,
                }
            }
        }
    }

    pub fn get_pricing(&self, model: &str) -> ModelPricing {
        self.lookup(model).pricing
    }
}

/// Strip any vendor prefix (`anthropic/claude-x` -> `claude-x`) and lowercase.
pub fn normalize_model(model: &str) -> String {
    model
        .trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sonnet_pricing_by_prefix() {
        let p = PricingCatalog::builtin().get_pricing("claude-sonnet-4-20250514");
        assert!((p.input_per_mtok - 3.0).abs() < f64::EPSILON);
        assert!((p.output_per_mtok - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn vendor_prefix_and_case_are_ignored() {
        let catalog = PricingCatalog::builtin();
        let m = catalog.lookup("Anthropic/Claude-Opus-4-1");
        assert_eq!(m.key, "claude-opus-4");
        assert!((m.pricing.output_per_mtok - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exact_match_beats_shorter_prefix() {
        let catalog = PricingCatalog::builtin();
        assert_eq!(catalog.lookup("gpt-4o-mini").key, "gpt-4o-mini");
        assert_eq!(catalog.lookup("gpt-4o-mini-2024-07-18").key, "gpt-4o-mini");
        assert_eq!(catalog.lookup("gpt-4o-2024-08-06").key, "gpt-4o");
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        let m = PricingCatalog::builtin().lookup("mystery-9000");
        assert_eq!(m.key, DEFAULT_PRICING_KEY);
        assert!((m.pricing.input_per_mtok - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overrides_replace_entries_and_default() {
        let overrides = BTreeMap::from([
            (
                "default".to_string(),
                PricingEntry {
                    input: 1.0,
                    output: 2.0,
                    cache_read: 0.0,
                    cache_write: 0.0,
                },
            ),
            (
                "acme/house-model".to_string(),
                PricingEntry {
                    input: 0.5,
                    output: 0.5,
                    cache_read: 0.05,
                    cache_write: 0.0,
                },
            ),
        ]);
        let catalog = PricingCatalog::builtin().with_overrides(&overrides);
        assert!((catalog.default_pricing().output_per_mtok - 2.0).abs() < f64::EPSILON);
        assert_eq!(catalog.lookup("house-model-v2").key, "house-model");
        assert_eq!(catalog.lookup("unknown").key, DEFAULT_PRICING_KEY);
    }

    #[test]
    fn calculate_cost_with_all_token_types() {
        let pricing = ModelPricing::new(3.0, 15.0, 0.30, 3.75);
        let usage = UsageTotals {
            input: 1000,
            output: 400,
            reasoning: 100,
            cache_read: 200,
            cache_write: 0,
            cost: 0.0,
        };
        let cost = calculate_cost(&usage, &pricing);
        // input 0.003, output+reasoning 0.0075, cache read 0.00006
        let expected = 0.003 + 0.0075 + 0.00006;
        assert!(
            (cost - expected).abs() < 1e-10,
            "expected {expected}, got {cost}"
        );
    }

    #[test]
    fn zero_tokens_zero_cost() {
        let cost = calculate_cost(&UsageTotals::default(), &PricingCatalog::builtin().default_pricing());
        assert!(cost.abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn cost_is_sum_of_four_classes(
            input in 0u64..10_000_000,
            output in 0u64..10_000_000,
            reasoning in 0u64..1_000_000,
            cache_read in 0u64..10_000_000,
            cache_write in 0u64..10_000_000,
            prices in proptest::array::uniform4(0.0f64..100.0),
        ) {
            let pricing = ModelPricing::new(prices[0], prices[1], prices[2], prices[3]);
            let usage = UsageTotals { input, output, reasoning, cache_read, cache_write, cost: 0.0 };
            let expected = input as f64 / 1e6 * prices[0]
                + (output + reasoning) as f64 / 1e6 * prices[1]
                + cache_read as f64 / 1e6 * prices[2]
                + cache_write as f64 / 1e6 * prices[3];
            let cost = calculate_cost(&usage, &pricing);
            prop_assert!((cost - expected).abs() <= 1e-9 * expected.max(1.0));
        }
    }
}
