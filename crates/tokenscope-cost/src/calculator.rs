// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-level cost estimation and subscription detection.

use std::sync::Arc;

use serde::Serialize;
use tokenscope_config::ScopeConfig;
use tokenscope_core::UsageTotals;
use tracing::debug;

use crate::pricing::{ModelPricing, PricingCatalog, token_cost};

/// Estimated USD per token class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input: f64,
    /// Output and reasoning tokens, both billed at the output price.
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.input + self.output + self.cache_read + self.cache_write
    }
}

/// Cost view of one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub model: Option<String>,
    /// Catalog key the price came from.
    pub pricing_key: String,
    pub pricing: ModelPricing,
    pub breakdown: CostBreakdown,
    /// Metered cost computed from token counts.
    pub estimated_total: f64,
    /// Cost reported by the provider, summed across assistant turns.
    pub api_cost: f64,
    pub is_subscription: bool,
    /// The number to show: the estimate for subscription sessions, else the API cost.
    pub headline_cost: f64,
}

/// Real activity with a zero provider cost means flat-rate billing.
pub fn is_subscription(assistant_turns: usize, usage: &UsageTotals) -> bool {
    assistant_turns > 0 && (usage.input > 0 || usage.output > 0) && usage.cost == 0.0
}

/// Prices usage totals against a shared catalog.
#[derive(Debug, Clone)]
pub struct CostCalculator {
    catalog: Arc<PricingCatalog>,
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new(Arc::new(PricingCatalog::builtin()))
    }
}

impl CostCalculator {
    pub fn new(catalog: Arc<PricingCatalog>) -> Self {
        Self { catalog }
    }

    /// Built-in catalog with `[pricing.*]` overrides applied.
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::new(Arc::new(
            PricingCatalog::builtin().with_overrides(&config.pricing),
        ))
    }

    pub fn catalog(&self) -> &PricingCatalog {
        &self.catalog
    }

    /// Pricing for a model, or the catalog default when the model is unknown.
    pub fn pricing_for(&self, model: Option<&str>) -> ModelPricing {
        match model {
            Some(model) => self.catalog.get_pricing(model),
            None => self.catalog.default_pricing(),
        }
    }

    pub fn calculate(
        &self,
        model: Option<&str>,
        usage: &UsageTotals,
        assistant_turns: usize,
    ) -> CostEstimate {
        let (pricing_key, pricing) = match model {
            Some(model) => {
                let found = self.catalog.lookup(model);
                (found.key, found.pricing)
            }
            None => (
                crate::pricing::DEFAULT_PRICING_KEY.to_string(),
                self.catalog.default_pricing(),
            ),
        };

        let breakdown = CostBreakdown {
            input: token_cost(usage.input, pricing.input_per_mtok),
            output: token_cost(usage.output + usage.reasoning, pricing.output_per_mtok),
            cache_read: token_cost(usage.cache_read, pricing.cache_read_per_mtok),
            cache_write: token_cost(usage.cache_write, pricing.cache_write_per_mtok),
        };
        let estimated_total = breakdown.total();
        let subscription = is_subscription(assistant_turns, usage);
        let headline_cost = if subscription {
            estimated_total
        } else {
            usage.cost
        };

        debug!(
            model = model.unwrap_or("<unknown>"),
            pricing_key = %pricing_key,
            estimated_total,
            api_cost = usage.cost,
            subscription,
            "cost calculated"
        );

        CostEstimate {
            model: model.map(str::to_string),
            pricing_key,
            pricing,
            breakdown,
            estimated_total,
            api_cost: usage.cost,
            is_subscription: subscription,
            headline_cost,
        }
    }
}
