// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for tokenscope.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use tokenscope_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("top entries per category: {}", config.analysis.entry_limit);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ScopeConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// On a Figment error, the TOML sources are re-read so unknown keys can be
/// reported with source spans.
pub fn load_and_validate() -> Result<ScopeConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            tracing::debug!(
                entry_limit = config.analysis.entry_limit,
                pricing_overrides = config.pricing.len(),
                "configuration loaded"
            );
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Load configuration from a specific file path and validate it.
pub fn load_and_validate_path(path: &std::path::Path) -> Result<ScopeConfig, Vec<ConfigError>> {
    match loader::load_config_from_path(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = std::fs::read_to_string(path)
                .map(|content| vec![(path.display().to_string(), content)])
                .unwrap_or_default();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<ScopeConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut sources = Vec::new();

    if let Ok(content) = std::fs::read_to_string("tokenscope.toml") {
        let path = std::env::current_dir()
            .map(|d| d.join("tokenscope.toml").display().to_string())
            .unwrap_or_else(|_| "tokenscope.toml".to_string());
        sources.push((path, content));
    }

    let user = loader::user_config_path();
    if let Ok(content) = std::fs::read_to_string(&user) {
        sources.push((user.display().to_string(), content));
    }

    let system_path = std::path::Path::new("/etc/tokenscope/tokenscope.toml");
    if let Ok(content) = std::fs::read_to_string(system_path) {
        sources.push((system_path.display().to_string(), content));
    }

    sources
}
