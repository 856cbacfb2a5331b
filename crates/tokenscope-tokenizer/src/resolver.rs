// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps a session's model/provider pair to a tokenizer strategy.
//!
//! Lookup order: exact provider+model, model alone, provider default,
//! model-name prefix heuristics, then the approximation.

use std::collections::HashMap;

use serde::Serialize;
use tokenscope_config::model::TokenizerConfig;
use tokenscope_core::Message;
use tracing::{debug, warn};

use crate::spec::TokenizerSpec;

const CLAUDE_HUB: &str = "Xenova/claude-tokenizer";
const LLAMA_HUB: &str = "meta-llama/Llama-3.1-8B-Instruct";
const MISTRAL_HUB: &str = "mistralai/Mistral-7B-Instruct-v0.3";
const DEEPSEEK_HUB: &str = "deepseek-ai/DeepSeek-V3";
const QWEN_HUB: &str = "Qwen/Qwen2.5-7B-Instruct";

/// Outcome of resolving a session's model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModel {
    pub tokenizer: TokenizerSpec,
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
}

impl ResolvedModel {
    fn approx() -> Self {
        Self {
            tokenizer: TokenizerSpec::Approx,
            provider_id: None,
            model_id: None,
        }
    }
}

/// Strip a namespace prefix (`anthropic/claude-x` -> `claude-x`) and lowercase.
pub fn canonicalize(id: &str) -> String {
    id.trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Lookup tables consulted by [`ModelResolver`].
#[derive(Debug, Clone, Default)]
pub struct ResolutionTables {
    provider_models: HashMap<(String, String), TokenizerSpec>,
    models: HashMap<String, TokenizerSpec>,
    providers: HashMap<String, TokenizerSpec>,
    /// Sorted longest prefix first.
    prefixes: Vec<(String, TokenizerSpec)>,
}

impl ResolutionTables {
    pub fn builtin() -> Self {
        let o200k = || TokenizerSpec::tiktoken("o200k_base");
        let cl100k = || TokenizerSpec::tiktoken("cl100k_base");
        let hf = TokenizerSpec::hugging_face;

        let mut tables = Self::default();

        for (provider, model, spec) in [
            ("deepseek", "deepseek-chat", hf(DEEPSEEK_HUB)),
            ("deepseek", "deepseek-reasoner", hf("deepseek-ai/DeepSeek-R1")),
            ("mistral", "codestral-latest", hf("mistralai/Codestral-22B-v0.1")),
            ("openai", "o1", o200k()),
            ("openai", "o3", o200k()),
            ("openai", "o4-mini", o200k()),
        ] {
            tables.insert_provider_model(provider, model, spec);
        }

        for (model, spec) in [
            ("gpt-4o", o200k()),
            ("gpt-4o-mini", o200k()),
            ("gpt-4.1", o200k()),
            ("gpt-4.1-mini", o200k()),
            ("gpt-4", cl100k()),
            ("gpt-4-turbo", cl100k()),
            ("gpt-3.5-turbo", cl100k()),
            ("llama-3.1-8b-instruct", hf(LLAMA_HUB)),
            ("llama-3.3-70b-instruct", hf("meta-llama/Llama-3.3-70B-Instruct")),
            ("qwen3-coder", hf("Qwen/Qwen3-Coder-480B-A35B-Instruct")),
            ("kimi-k2", hf("moonshotai/Kimi-K2-Instruct")),
        ] {
            tables.insert_model(model, spec);
        }

        for (provider, spec) in [
            ("openai", o200k()),
            ("azure", o200k()),
            ("anthropic", hf(CLAUDE_HUB)),
            ("deepseek", hf(DEEPSEEK_HUB)),
            ("mistral", hf(MISTRAL_HUB)),
        ] {
            tables.insert_provider(provider, spec);
        }

        for (prefix, spec) in [
            ("gpt-5", o200k()),
            ("gpt-4o", o200k()),
            ("gpt-4.1", o200k()),
            ("gpt-4", cl100k()),
            ("gpt-3.5", cl100k()),
            ("o1", o200k()),
            ("o3", o200k()),
            ("o4", o200k()),
            ("claude", hf(CLAUDE_HUB)),
            ("llama", hf(LLAMA_HUB)),
            ("mistral", hf(MISTRAL_HUB)),
            ("mixtral", hf(MISTRAL_HUB)),
            ("codestral", hf(MISTRAL_HUB)),
            ("deepseek", hf(DEEPSEEK_HUB)),
            ("qwen", hf(QWEN_HUB)),
        ] {
            tables.prefixes.push((prefix.to_string(), spec));
        }
        tables.sort_prefixes();
        tables
    }

    /// Layer configured overrides over these tables. Invalid spec strings
    /// are skipped with a warning (validation rejects them earlier).
    pub fn with_overrides(mut self, config: &TokenizerConfig) -> Self {
        for (key, raw) in &config.provider_models {
            let Some(spec) = parse_override("provider_models", key, raw) else {
                continue;
            };
            match key.split_once('/') {
                Some((provider, model)) => self.insert_provider_model(provider, model, spec),
                None => warn!(key = %key, "provider_models key lacks `/`, ignoring"),
            }
        }
        for (model, raw) in &config.models {
            if let Some(spec) = parse_override("models", model, raw) {
                self.insert_model(model, spec);
            }
        }
        for (provider, raw) in &config.providers {
            if let Some(spec) = parse_override("providers", provider, raw) {
                self.insert_provider(provider, spec);
            }
        }
        self
    }

    fn insert_provider_model(&mut self, provider: &str, model: &str, spec: TokenizerSpec) {
        self.provider_models
            .insert((canonicalize(provider), canonicalize(model)), spec);
    }

    fn insert_model(&mut self, model: &str, spec: TokenizerSpec) {
        self.models.insert(canonicalize(model), spec);
    }

    fn insert_provider(&mut self, provider: &str, spec: TokenizerSpec) {
        self.providers.insert(canonicalize(provider), spec);
    }

    fn sort_prefixes(&mut self) {
        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Tokenizer for a provider/model pair, always returning some strategy.
    pub fn spec_for(&self, provider_id: &str, model_id: &str) -> TokenizerSpec {
        let provider = canonicalize(provider_id);
        let model = canonicalize(model_id);

        if let Some(spec) = self
            .provider_models
            .get(&(provider.clone(), model.clone()))
        {
            return spec.clone();
        }
        if let Some(spec) = self.models.get(&model) {
            return spec.clone();
        }
        if let Some(spec) = self.providers.get(&provider) {
            return spec.clone();
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| model.starts_with(prefix.as_str()))
            .map(|(_, spec)| spec.clone())
            .unwrap_or(TokenizerSpec::Approx)
    }
}

fn parse_override(table: &str, key: &str, raw: &str) -> Option<TokenizerSpec> {
    match raw.parse::<TokenizerSpec>() {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!(table, key = %key, error = %e, "ignoring tokenizer override");
            None
        }
    }
}

/// Chooses the tokenizer for a session from its messages.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    tables: ResolutionTables,
}

impl Default for ModelResolver {
    fn default() -> Self {
        Self::new(ResolutionTables::builtin())
    }
}

impl ModelResolver {
    pub fn new(tables: ResolutionTables) -> Self {
        Self { tables }
    }

    pub fn from_config(config: &TokenizerConfig) -> Self {
        Self::new(ResolutionTables::builtin().with_overrides(config))
    }

    pub fn tables(&self) -> &ResolutionTables {
        &self.tables
    }

    /// Scans newest to oldest and uses the first message naming both a
    /// provider and a model. No such message resolves to the approximation.
    pub fn resolve(&self, messages: &[Message]) -> ResolvedModel {
        let Some((provider, model)) = messages.iter().rev().find_map(Message::model_pair) else {
            debug!(messages = messages.len(), "no model metadata, using approximation");
            return ResolvedModel::approx();
        };

        let tokenizer = self.tables.spec_for(provider, model);
        debug!(provider, model, tokenizer = %tokenizer, "resolved session tokenizer");
        ResolvedModel {
            tokenizer,
            provider_id: Some(provider.to_string()),
            model_id: Some(model.to_string()),
        }
    }
}
