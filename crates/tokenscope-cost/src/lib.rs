// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost estimation for tokenscope.
//!
//! Provides the pricing catalog with prefix lookup and the calculator that
//! prices session usage and detects subscription billing.

pub mod calculator;
pub mod pricing;

pub use calculator::{CostBreakdown, CostCalculator, CostEstimate, is_subscription};
pub use pricing::{ModelPricing, PricingCatalog, PricingMatch, calculate_cost, normalize_model};
