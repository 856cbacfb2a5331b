// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tokenscope.toml` > `~/.config/tokenscope/tokenscope.toml`
//! > `/etc/tokenscope/tokenscope.toml` with environment variable overrides via
//! the `TOKENSCOPE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ScopeConfig;

const SYSTEM_CONFIG: &str = "/etc/tokenscope/tokenscope.toml";
const LOCAL_CONFIG: &str = "tokenscope.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tokenscope/tokenscope.toml` (system-wide)
/// 3. `~/.config/tokenscope/tokenscope.toml` (user XDG config)
/// 4. `./tokenscope.toml` (local directory)
/// 5. `TOKENSCOPE_*` environment variables
pub fn load_config() -> Result<ScopeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ScopeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScopeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ScopeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScopeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ScopeConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Path of the per-user config file, empty when no config dir exists.
pub(crate) fn user_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|d| d.join("tokenscope/tokenscope.toml"))
        .unwrap_or_default()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `TOKENSCOPE_ANALYSIS_ENTRY_LIMIT` must map to
/// `analysis.entry_limit`, not `analysis.entry.limit`.
fn env_provider() -> Env {
    Env::prefixed("TOKENSCOPE_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("analysis_", "analysis.", 1)
            .replacen("tokenizer_", "tokenizer.", 1)
            .replacen("context_", "context.", 1)
            .replacen("subagents_", "subagents.", 1)
            .replacen("skills_", "skills.", 1);
        mapped.into()
    })
}
