// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive limits, non-negative prices, and well-formed tokenizer specs.

use crate::diagnostic::ConfigError;
use crate::model::ScopeConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ScopeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.analysis.entry_limit == 0 {
        invalid("analysis.entry_limit must be at least 1".to_string());
    }

    if config.analysis.collaborator_timeout_secs == 0 {
        invalid("analysis.collaborator_timeout_secs must be at least 1".to_string());
    }

    if !LOG_LEVELS.contains(&config.analysis.log_level.as_str()) {
        invalid(format!(
            "analysis.log_level `{}` is not one of {}",
            config.analysis.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.tokenizer.load_timeout_secs == 0 {
        invalid("tokenizer.load_timeout_secs must be at least 1".to_string());
    }

    if config.tokenizer.cache_dir.trim().is_empty() {
        invalid("tokenizer.cache_dir must not be empty".to_string());
    }

    let tables = [
        ("models", &config.tokenizer.models),
        ("provider_models", &config.tokenizer.provider_models),
        ("providers", &config.tokenizer.providers),
    ];
    for (table, entries) in tables {
        for (key, spec) in entries {
            if !is_tokenizer_spec(spec) {
                invalid(format!(
                    "tokenizer.{table}.{key} = `{spec}` is not a tokenizer spec \
                     (expected `approx`, `tiktoken:<model>` or `hf:<hub-id>`)"
                ));
            }
        }
    }

    for key in config.tokenizer.provider_models.keys() {
        if !key.contains('/') {
            invalid(format!(
                "tokenizer.provider_models key `{key}` must have the form `provider/model`"
            ));
        }
    }

    if config.subagents.max_sessions == 0 {
        invalid("subagents.max_sessions must be at least 1".to_string());
    }

    if config.skills.tool_name.trim().is_empty() {
        invalid("skills.tool_name must not be empty".to_string());
    }

    for (model, entry) in &config.pricing {
        let prices = [
            ("input", entry.input),
            ("output", entry.output),
            ("cache_read", entry.cache_read),
            ("cache_write", entry.cache_write),
        ];
        for (class, price) in prices {
            if !price.is_finite() || price < 0.0 {
                invalid(format!(
                    "pricing.{model}.{class} must be a non-negative number, got {price}"
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Syntactic check for tokenizer spec strings. The tokenizer crate owns parsing.
fn is_tokenizer_spec(spec: &str) -> bool {
    let spec = spec.trim();
    if spec == "approx" {
        return true;
    }
    match spec.split_once(':') {
        Some(("tiktoken" | "hf", target)) => !target.trim().is_empty(),
        _ => false,
    }
}
