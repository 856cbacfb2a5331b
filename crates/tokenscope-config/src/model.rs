// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for tokenscope.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level tokenscope configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    /// Report shape and collaborator limits.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Tokenizer backend selection and caching.
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Cached-context estimation constants.
    #[serde(default)]
    pub context: ContextConfig,

    /// Subagent tree traversal limits.
    #[serde(default)]
    pub subagents: SubagentConfig,

    /// Skill tool detection.
    #[serde(default)]
    pub skills: SkillConfig,

    /// Per-model pricing overrides merged over the built-in catalog,
    /// keyed by normalized model name (`default` replaces the fallback entry).
    #[serde(default)]
    pub pricing: BTreeMap<String, PricingEntry>,
}

/// Analysis report configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Number of entries kept in each category's "top" view.
    #[serde(default = "default_entry_limit")]
    pub entry_limit: usize,

    /// Seconds to wait for a collaborator-backed sub-analysis before
    /// falling back to its empty result.
    #[serde(default = "default_collaborator_timeout_secs")]
    pub collaborator_timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            entry_limit: default_entry_limit(),
            collaborator_timeout_secs: default_collaborator_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

fn default_entry_limit() -> usize {
    3
}

fn default_collaborator_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Tokenizer backend configuration.
///
/// Override tables take tokenizer spec strings: `approx`,
/// `tiktoken:<model-or-encoding>`, or `hf:<hub-id>`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenizerConfig {
    /// Directory holding downloaded Hugging Face `tokenizer.json` files.
    #[serde(default = "default_tokenizer_cache_dir")]
    pub cache_dir: String,

    /// Fetch missing Hugging Face tokenizers from the hub on first use.
    #[serde(default = "default_allow_download")]
    pub allow_download: bool,

    /// Seconds allowed for loading one backend before it is treated as unavailable.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Model id -> spec overrides, applied irrespective of provider.
    #[serde(default)]
    pub models: BTreeMap<String, String>,

    /// `provider/model` -> spec overrides.
    #[serde(default)]
    pub provider_models: BTreeMap<String, String>,

    /// Provider -> default spec overrides.
    #[serde(default)]
    pub providers: BTreeMap<String, String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_tokenizer_cache_dir(),
            allow_download: default_allow_download(),
            load_timeout_secs: default_load_timeout_secs(),
            models: BTreeMap::new(),
            provider_models: BTreeMap::new(),
            providers: BTreeMap::new(),
        }
    }
}

fn default_tokenizer_cache_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("tokenscope").join("tokenizers"))
        .unwrap_or_else(|| std::path::PathBuf::from("tokenizers"))
        .to_string_lossy()
        .into_owned()
}

fn default_allow_download() -> bool {
    true
}

fn default_load_timeout_secs() -> u64 {
    20
}

/// Cached-context estimation configuration.
///
/// The estimate path apportions the first cache-write total using the
/// per-unit constants; tool schema constants feed per-tool estimates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Tokens attributed to each enabled tool definition.
    #[serde(default = "default_per_tool_tokens")]
    pub per_tool_tokens: u64,

    /// Tokens attributed to the environment block.
    #[serde(default = "default_environment_tokens")]
    pub environment_tokens: u64,

    /// Tokens attributed to the project file tree.
    #[serde(default = "default_project_tree_tokens")]
    pub project_tree_tokens: u64,

    /// Unmatched prompt text shorter than this (in characters) is dropped.
    #[serde(default = "default_min_base_prompt_chars")]
    pub min_base_prompt_chars: usize,

    /// Fixed overhead of any tool schema.
    #[serde(default = "default_schema_base_tokens")]
    pub schema_base_tokens: u64,

    /// Cost of one scalar argument.
    #[serde(default = "default_simple_arg_tokens")]
    pub simple_arg_tokens: u64,

    /// Cost of one array/object argument.
    #[serde(default = "default_complex_arg_tokens")]
    pub complex_arg_tokens: u64,

    /// Description allowance for tools with only scalar arguments.
    #[serde(default = "default_simple_description_tokens")]
    pub simple_description_tokens: u64,

    /// Description allowance for tools with any array/object argument.
    #[serde(default = "default_complex_description_tokens")]
    pub complex_description_tokens: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            per_tool_tokens: default_per_tool_tokens(),
            environment_tokens: default_environment_tokens(),
            project_tree_tokens: default_project_tree_tokens(),
            min_base_prompt_chars: default_min_base_prompt_chars(),
            schema_base_tokens: default_schema_base_tokens(),
            simple_arg_tokens: default_simple_arg_tokens(),
            complex_arg_tokens: default_complex_arg_tokens(),
            simple_description_tokens: default_simple_description_tokens(),
            complex_description_tokens: default_complex_description_tokens(),
        }
    }
}

fn default_per_tool_tokens() -> u64 {
    350
}

fn default_environment_tokens() -> u64 {
    150
}

fn default_project_tree_tokens() -> u64 {
    500
}

fn default_min_base_prompt_chars() -> usize {
    100
}

fn default_schema_base_tokens() -> u64 {
    40
}

fn default_simple_arg_tokens() -> u64 {
    15
}

fn default_complex_arg_tokens() -> u64 {
    40
}

fn default_simple_description_tokens() -> u64 {
    30
}

fn default_complex_description_tokens() -> u64 {
    60
}

/// Subagent traversal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubagentConfig {
    /// Maximum number of descendant sessions visited per analysis.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_max_sessions() -> usize {
    1000
}

/// Skill tool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SkillConfig {
    /// Name of the tool that lists and loads skills.
    #[serde(default = "default_skill_tool_name")]
    pub tool_name: String,

    /// Argument of the skill tool that carries the skill name.
    #[serde(default = "default_skill_name_argument")]
    pub name_argument: String,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            tool_name: default_skill_tool_name(),
            name_argument: default_skill_name_argument(),
        }
    }
}

fn default_skill_tool_name() -> String {
    "skill".to_string()
}

fn default_skill_name_argument() -> String {
    "name".to_string()
}

/// Price per million tokens for one model, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PricingEntry {
    pub input: f64,
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
}
