// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached-context composition, tool schema estimates and cache efficiency.
//!
//! With raw system prompts available, prompt sections are located by their
//! delimiters and tokenized one by one. Otherwise the first cache write is
//! taken as the total cached context and apportioned with fixed per-unit
//! constants; every bucket in that case is marked as not identified.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use strum::Display;
use tokenscope_config::model::ContextConfig;
use tokenscope_core::{Message, Role, SessionExport};
use tokenscope_cost::ModelPricing;
use tokenscope_tokenizer::{TokenizerManager, TokenizerSpec};
use tracing::debug;

use crate::collector::{tool_names, tool_parts};

const INSTRUCTIONS_MARKER: &str = "Instructions from:";

/// How the breakdown was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContextMethod {
    /// Parsed from raw system prompt text.
    Parsed,
    /// Apportioned from cache-write telemetry.
    Estimated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContextBucket {
    pub tokens: u64,
    /// False when the value is estimated rather than measured.
    pub identified: bool,
}

impl ContextBucket {
    fn estimated(tokens: u64) -> Self {
        Self {
            tokens,
            identified: false,
        }
    }
}

/// Composition of the cached context window. Bucket tokens sum to
/// `total_cached_context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextBreakdown {
    pub method: ContextMethod,
    pub base_system_prompt: ContextBucket,
    pub tool_definitions: ContextBucket,
    pub tool_count: usize,
    pub environment_context: ContextBucket,
    pub environment_components: Vec<String>,
    pub project_tree: ContextBucket,
    pub file_count: usize,
    pub custom_instructions: ContextBucket,
    pub instruction_sources: Vec<String>,
    pub total_cached_context: u64,
}

impl ContextBreakdown {
    fn empty(method: ContextMethod) -> Self {
        Self {
            method,
            base_system_prompt: ContextBucket::default(),
            tool_definitions: ContextBucket::default(),
            tool_count: 0,
            environment_context: ContextBucket::default(),
            environment_components: Vec::new(),
            project_tree: ContextBucket::default(),
            file_count: 0,
            custom_instructions: ContextBucket::default(),
            instruction_sources: Vec::new(),
            total_cached_context: 0,
        }
    }

    pub fn bucket_sum(&self) -> u64 {
        self.base_system_prompt.tokens
            + self.tool_definitions.tokens
            + self.environment_context.tokens
            + self.project_tree.tokens
            + self.custom_instructions.tokens
    }
}

/// Estimated schema cost of one enabled tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolEstimate {
    pub name: String,
    pub tokens: u64,
    pub observed_calls: usize,
    pub argument_count: usize,
    pub complex_argument_count: usize,
    /// False when no call was observed and the default shape was assumed.
    pub from_observed_calls: bool,
}

/// Savings from prompt caching across all assistant calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheEfficiency {
    pub cache_read_tokens: u64,
    pub fresh_input_tokens: u64,
    /// `cache_read / (cache_read + fresh_input)`, 0 with no input.
    pub hit_rate: f64,
    pub cost_without_caching: f64,
    pub cost_with_caching: f64,
    pub savings: f64,
    pub savings_percent: f64,
    /// Blended USD per million input tokens actually paid.
    pub effective_rate_per_mtok: f64,
}

impl CacheEfficiency {
    pub fn compute(messages: &[Message], pricing: &ModelPricing) -> Self {
        let (cache_read, fresh) = messages
            .iter()
            .filter(|m| m.has_role(Role::Assistant))
            .map(|m| m.telemetry())
            .fold((0u64, 0u64), |(read, fresh), t| {
                (read + t.cache_read(), fresh + t.input())
            });

        let all_input = cache_read + fresh;
        if all_input == 0 {
            return Self::default();
        }

        let per_token = |tokens: u64, price: f64| tokens as f64 / 1_000_000.0 * price;
        let cost_without_caching = per_token(all_input, pricing.input_per_mtok);
        let cost_with_caching = per_token(fresh, pricing.input_per_mtok)
            + per_token(cache_read, pricing.cache_read_per_mtok);
        let savings = cost_without_caching - cost_with_caching;
        let savings_percent = if cost_without_caching > 0.0 {
            savings / cost_without_caching * 100.0
        } else {
            0.0
        };

        Self {
            cache_read_tokens: cache_read,
            fresh_input_tokens: fresh,
            hit_rate: cache_read as f64 / all_input as f64,
            cost_without_caching,
            cost_with_caching,
            savings,
            savings_percent,
            effective_rate_per_mtok: cost_with_caching / all_input as f64 * 1_000_000.0,
        }
    }
}

/// Output of the context analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextAnalysis {
    pub breakdown: ContextBreakdown,
    pub tool_estimates: Vec<ToolEstimate>,
    pub cache_efficiency: CacheEfficiency,
}

impl ContextAnalysis {
    pub fn empty() -> Self {
        Self {
            breakdown: ContextBreakdown::empty(ContextMethod::Estimated),
            tool_estimates: Vec::new(),
            cache_efficiency: CacheEfficiency::default(),
        }
    }
}

pub struct ContextAnalyzer {
    tokenizers: Arc<TokenizerManager>,
    config: ContextConfig,
}

impl ContextAnalyzer {
    pub fn new(tokenizers: Arc<TokenizerManager>, config: ContextConfig) -> Self {
        Self { tokenizers, config }
    }

    /// Analyze a session export. An export with no raw prompts takes the
    /// estimate path.
    pub async fn analyze(
        &self,
        export: &SessionExport,
        pricing: &ModelPricing,
        spec: &TokenizerSpec,
    ) -> ContextAnalysis {
        let messages = &export.messages;
        let enabled_tools = enabled_tools(export);

        let breakdown = if export.has_raw_prompts() {
            self.parse_prompts(&export.system_prompts, spec).await
        } else {
            let total = first_cache_write(messages);
            estimate_breakdown(total, enabled_tools.len(), &self.config)
        };

        debug!(
            method = %breakdown.method,
            total_cached_context = breakdown.total_cached_context,
            tools = enabled_tools.len(),
            "context breakdown computed"
        );

        ContextAnalysis {
            tool_estimates: estimate_tools(&enabled_tools, messages, &self.config),
            cache_efficiency: CacheEfficiency::compute(messages, pricing),
            breakdown,
        }
    }

    async fn parse_prompts(&self, prompts: &[String], spec: &TokenizerSpec) -> ContextBreakdown {
        let mut breakdown = ContextBreakdown::empty(ContextMethod::Parsed);
        let mut components = BTreeSet::new();
        let mut seen = HashSet::new();

        for prompt in prompts.iter().filter(|p| !p.trim().is_empty()) {
            if !seen.insert(prompt.as_str()) {
                continue;
            }
            let sections = split_prompt(prompt);

            for span in &sections.environment {
                let tokens = self.count(span, spec).await;
                add(&mut breakdown.environment_context, tokens);
                components.extend(environment_components(span));
            }
            for span in &sections.project_tree {
                let tokens = self.count(span, spec).await;
                add(&mut breakdown.project_tree, tokens);
                breakdown.file_count += count_files(span);
            }
            for span in &sections.tool_definitions {
                let tokens = self.count(span, spec).await;
                add(&mut breakdown.tool_definitions, tokens);
                breakdown.tool_count += span.matches("<function>").count();
            }
            for (path, span) in &sections.instructions {
                let tokens = self.count(span, spec).await;
                add(&mut breakdown.custom_instructions, tokens);
                if !breakdown.instruction_sources.contains(path) {
                    breakdown.instruction_sources.push(path.clone());
                }
            }

            let remainder = sections.remainder.trim();
            if remainder.chars().count() > self.config.min_base_prompt_chars {
                let tokens = self.count(remainder, spec).await;
                add(&mut breakdown.base_system_prompt, tokens);
            }
        }

        breakdown.environment_components = components.into_iter().collect();
        breakdown.total_cached_context = breakdown.bucket_sum();
        breakdown
    }

    async fn count(&self, text: &str, spec: &TokenizerSpec) -> u64 {
        self.tokenizers.count_tokens(text, spec).await as u64
    }
}

fn add(bucket: &mut ContextBucket, tokens: u64) {
    bucket.tokens += tokens;
    bucket.identified = true;
}

/// Delimited sections of one system prompt.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PromptSections {
    pub environment: Vec<String>,
    pub project_tree: Vec<String>,
    pub tool_definitions: Vec<String>,
    /// `(source path, block text)` per instructions block.
    pub instructions: Vec<(String, String)>,
    /// Text outside every detected section.
    pub remainder: String,
}

pub fn split_prompt(prompt: &str) -> PromptSections {
    let mut sections = PromptSections::default();
    let mut rest = prompt.to_string();

    sections.environment = take_blocks(&mut rest, "<env>", "</env>");
    sections.project_tree = take_blocks(&mut rest, "<project>", "</project>");
    sections
        .project_tree
        .extend(take_blocks(&mut rest, "<files>", "</files>"));
    sections.tool_definitions = take_blocks(&mut rest, "<functions>", "</functions>");

    // Instruction blocks run from their marker to the next marker or the end.
    if let Some(first) = rest.find(INSTRUCTIONS_MARKER) {
        let tail = rest.split_off(first);
        let mut starts: Vec<usize> = tail
            .match_indices(INSTRUCTIONS_MARKER)
            .map(|(i, _)| i)
            .collect();
        starts.push(tail.len());
        for window in starts.windows(2) {
            let block = &tail[window[0]..window[1]];
            let path = block[INSTRUCTIONS_MARKER.len()..]
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            sections.instructions.push((path, block.trim_end().to_string()));
        }
    }

    sections.remainder = rest;
    sections
}

/// Remove every `open ... close` block from `text`, returning the blocks
/// including delimiters. An unclosed block runs to the end of the text.
fn take_blocks(text: &mut String, open: &str, close: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    while let Some(start) = text.find(open) {
        let end = text[start + open.len()..]
            .find(close)
            .map(|i| start + open.len() + i + close.len())
            .unwrap_or(text.len());
        blocks.push(text[start..end].to_string());
        text.replace_range(start..end, "\n");
    }
    blocks
}

fn environment_components(block: &str) -> Vec<String> {
    let lower = block.to_lowercase();
    [
        ("working directory", "working directory"),
        ("platform", "platform"),
        ("git", "git status"),
        ("date", "date"),
    ]
    .into_iter()
    .filter(|(needle, _)| lower.contains(needle))
    .map(|(_, component)| component.to_string())
    .collect()
}

fn count_files(block: &str) -> usize {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('<'))
        .filter(|line| !line.ends_with('/'))
        .count()
}

/// Cache-write tokens of the first assistant message that wrote to the cache.
pub fn first_cache_write(messages: &[Message]) -> u64 {
    messages
        .iter()
        .filter(|m| m.has_role(Role::Assistant))
        .map(|m| m.telemetry().cache_write())
        .find(|&tokens| tokens > 0)
        .unwrap_or(0)
}

/// Apportion `total` cached tokens over the buckets.
///
/// Tools, environment and project tree take their constants in that order,
/// each capped by what is left; the base prompt gets the remainder. The
/// buckets therefore always sum to `total`.
pub fn estimate_breakdown(
    total: u64,
    tool_count: usize,
    config: &ContextConfig,
) -> ContextBreakdown {
    let mut left = total;
    let mut take = |want: u64| {
        let got = want.min(left);
        left -= got;
        got
    };
    let tools = take(tool_count as u64 * config.per_tool_tokens);
    let environment = take(config.environment_tokens);
    let tree = take(config.project_tree_tokens);
    let base = left;

    ContextBreakdown {
        method: ContextMethod::Estimated,
        base_system_prompt: ContextBucket::estimated(base),
        tool_definitions: ContextBucket::estimated(tools),
        tool_count,
        environment_context: ContextBucket::estimated(environment),
        environment_components: Vec::new(),
        project_tree: ContextBucket::estimated(tree),
        file_count: 0,
        custom_instructions: ContextBucket::estimated(0),
        instruction_sources: Vec::new(),
        total_cached_context: total,
    }
}

/// Tools reported as enabled, or the distinct tools invoked when the host
/// does not report them.
pub fn enabled_tools(export: &SessionExport) -> Vec<String> {
    if export.enabled_tools.is_empty() {
        return tool_names(&export.messages);
    }
    export
        .enabled_tools
        .iter()
        .filter(|t| !t.trim().is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn estimate_tools(
    enabled: &[String],
    messages: &[Message],
    config: &ContextConfig,
) -> Vec<ToolEstimate> {
    // argument name -> is complex, per tool, across every observed call
    let mut observed: BTreeMap<&str, (usize, BTreeMap<&str, bool>)> = BTreeMap::new();
    for (tool, state) in tool_parts(messages) {
        let (calls, args) = observed.entry(tool).or_default();
        *calls += 1;
        for (name, value) in &state.input {
            let complex = matches!(value, Value::Array(_) | Value::Object(_));
            let slot = args.entry(name.as_str()).or_insert(false);
            *slot |= complex;
        }
    }

    enabled
        .iter()
        .map(|name| match observed.get(name.as_str()) {
            Some((calls, args)) => {
                let complex = args.values().filter(|&&c| c).count();
                let simple = args.len() - complex;
                ToolEstimate {
                    name: name.clone(),
                    tokens: schema_tokens(simple, complex, config),
                    observed_calls: *calls,
                    argument_count: args.len(),
                    complex_argument_count: complex,
                    from_observed_calls: true,
                }
            }
            None => ToolEstimate {
                name: name.clone(),
                tokens: schema_tokens(2, 1, config),
                observed_calls: 0,
                argument_count: 3,
                complex_argument_count: 1,
                from_observed_calls: false,
            },
        })
        .collect()
}

fn schema_tokens(simple: usize, complex: usize, config: &ContextConfig) -> u64 {
    let description = if complex > 0 {
        config.complex_description_tokens
    } else {
        config.simple_description_tokens
    };
    config.schema_base_tokens
        + simple as u64 * config.simple_arg_tokens
        + complex as u64 * config.complex_arg_tokens
        + description
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tokenscope_test_utils::fixtures::{
        assistant_call, assistant_parts, completed_tool, telemetry, tool_part,
    };
    use tokenscope_core::ToolStatus;
    use tokenscope_tokenizer::{DefaultBackendLoader, TokenizerFileCache};

    fn analyzer() -> ContextAnalyzer {
        let loader = DefaultBackendLoader::new(TokenizerFileCache::new("/nonexistent", false));
        ContextAnalyzer::new(
            Arc::new(TokenizerManager::new(Arc::new(loader), Duration::from_secs(5))),
            ContextConfig::default(),
        )
    }

    fn pricing() -> ModelPricing {
        ModelPricing::new(3.0, 15.0, 0.30, 3.75)
    }

    #[test]
    fn estimate_matches_fixed_constants() {
        let b = estimate_breakdown(5000, 10, &ContextConfig::default());
        assert_eq!(b.tool_definitions.tokens, 3500);
        assert_eq!(b.environment_context.tokens, 150);
        assert_eq!(b.project_tree.tokens, 500);
        assert_eq!(b.base_system_prompt.tokens, 850);
        assert_eq!(b.bucket_sum(), 5000);
        assert!(!b.tool_definitions.identified && !b.base_system_prompt.identified);
    }

    #[test]
    fn estimate_with_small_total_still_conserves() {
        let b = estimate_breakdown(1000, 10, &ContextConfig::default());
        assert_eq!(b.tool_definitions.tokens, 1000);
        assert_eq!(b.environment_context.tokens, 0);
        assert_eq!(b.base_system_prompt.tokens, 0);
        assert_eq!(b.bucket_sum(), 1000);
    }

    #[test]
    fn split_prompt_finds_every_section() {
        let prompt = "You are a coding agent. Follow the user's lead.\n\
            <env>\nWorking directory: /repo\nIs directory a git repo: yes\nPlatform: linux\nToday's date: 2026-01-01\n</env>\n\
            <project>\n/repo/\n  src/\n    main.rs\n    lib.rs\n  Cargo.toml\n</project>\n\
            <functions>\n<function>{\"name\":\"read\"}</function>\n<function>{\"name\":\"bash\"}</function>\n</functions>\n\
            Instructions from: /repo/AGENTS.md\nUse tabs.\n\
            Instructions from: /home/u/.config/AGENTS.md\nBe terse.\n";

        let sections = split_prompt(prompt);
        assert_eq!(sections.environment.len(), 1);
        assert_eq!(sections.project_tree.len(), 1);
        assert_eq!(sections.tool_definitions[0].matches("<function>").count(), 2);
        assert_eq!(sections.instructions.len(), 2);
        assert_eq!(sections.instructions[0].0, "/repo/AGENTS.md");
        assert!(sections.instructions[1].1.ends_with("Be terse."));
        assert_eq!(
            sections.remainder.trim(),
            "You are a coding agent. Follow the user's lead."
        );
        assert_eq!(count_files(&sections.project_tree[0]), 3);
        assert_eq!(
            environment_components(&sections.environment[0]),
            vec!["working directory", "platform", "git status", "date"]
        );
    }

    #[test]
    fn unclosed_block_runs_to_end() {
        let sections = split_prompt("head <env>Platform: linux");
        assert_eq!(sections.environment, vec!["<env>Platform: linux"]);
        assert_eq!(sections.remainder.trim(), "head");
    }

    #[tokio::test]
    async fn exact_path_tokenizes_sections_and_drops_short_remainder() {
        let long_base = "b".repeat(400);
        let prompts = vec![
            format!("{long_base}\n<env>{}</env>", "e".repeat(91)),
            "short".to_string(),
            format!("{long_base}\n<env>{}</env>", "e".repeat(91)),
        ];
        let export = SessionExport {
            system_prompts: prompts,
            ..SessionExport::default()
        };
        let analysis = analyzer()
            .analyze(&export, &pricing(), &TokenizerSpec::Approx)
            .await;
        let b = &analysis.breakdown;
        assert_eq!(b.method, ContextMethod::Parsed);
        // duplicate prompt counted once; "<env>" + 91 + "</env>" = 102 chars
        assert_eq!(b.environment_context.tokens, 26);
        assert_eq!(b.base_system_prompt.tokens, 100);
        assert!(b.base_system_prompt.identified);
        assert!(!b.project_tree.identified);
        assert_eq!(b.total_cached_context, 126);
    }

    #[tokio::test]
    async fn estimate_path_uses_first_cache_write() {
        let export = SessionExport {
            messages: vec![
                assistant_call("a", telemetry(10, 5, 0, 0), 0.0, "openai", "gpt-4o"),
                assistant_call("b", telemetry(10, 5, 0, 5000), 0.0, "openai", "gpt-4o"),
                assistant_call("c", telemetry(10, 5, 4000, 9000), 0.0, "openai", "gpt-4o"),
            ],
            enabled_tools: (0..10).map(|i| format!("tool{i}")).collect(),
            ..SessionExport::default()
        };
        let analysis = analyzer()
            .analyze(&export, &pricing(), &TokenizerSpec::Approx)
            .await;
        assert_eq!(analysis.breakdown.method, ContextMethod::Estimated);
        assert_eq!(analysis.breakdown.total_cached_context, 5000);
        assert_eq!(analysis.breakdown.base_system_prompt.tokens, 850);
        assert_eq!(analysis.tool_estimates.len(), 10);
    }

    #[test]
    fn enabled_tools_fall_back_to_invoked_tools() {
        let export = SessionExport {
            messages: vec![assistant_parts(vec![
                completed_tool("read", json!({}), "x"),
                completed_tool("bash", json!({}), "y"),
            ])],
            ..SessionExport::default()
        };
        assert_eq!(enabled_tools(&export), vec!["bash", "read"]);
    }

    #[test]
    fn tool_estimates_from_observed_arguments() {
        let messages = vec![assistant_parts(vec![
            completed_tool("read", json!({"path": "a", "offset": 1}), "x"),
            tool_part(
                "edit",
                ToolStatus::Error,
                json!({"path": "a", "edits": [{"old": "x", "new": "y"}]}),
                None,
            ),
            completed_tool("read", json!({"path": "b", "limit": 5}), "y"),
        ])];
        let enabled = vec!["read".to_string(), "edit".to_string(), "glob".to_string()];
        let estimates = estimate_tools(&enabled, &messages, &ContextConfig::default());

        // read: 3 scalar args -> 40 + 45 + 30
        assert_eq!(estimates[0].tokens, 115);
        assert_eq!(estimates[0].observed_calls, 2);
        // edit: 1 scalar + 1 complex -> 40 + 15 + 40 + 60
        assert_eq!(estimates[1].tokens, 155);
        // glob: default shape
        assert_eq!(estimates[2].tokens, 170);
        assert!(!estimates[2].from_observed_calls);
    }

    #[test]
    fn cache_efficiency_math() {
        let messages = vec![
            assistant_call("a", telemetry(200_000, 0, 800_000, 0), 0.0, "anthropic", "claude"),
        ];
        let eff = CacheEfficiency::compute(&messages, &pricing());
        assert!((eff.hit_rate - 0.8).abs() < 1e-12);
        assert!((eff.cost_without_caching - 3.0).abs() < 1e-9);
        assert!((eff.cost_with_caching - (0.6 + 0.24)).abs() < 1e-9);
        assert!((eff.savings - 2.16).abs() < 1e-9);
        assert!((eff.savings_percent - 72.0).abs() < 1e-9);
        assert!((eff.effective_rate_per_mtok - 0.84).abs() < 1e-9);
    }

    #[test]
    fn cache_efficiency_without_input_is_zero() {
        assert_eq!(CacheEfficiency::compute(&[], &pricing()), CacheEfficiency::default());
    }

    proptest! {
        #[test]
        fn estimate_conserves_total(total in 0u64..200_000, tools in 0usize..60) {
            let config = ContextConfig::default();
            let b = estimate_breakdown(total, tools, &config);
            prop_assert_eq!(b.bucket_sum(), total);
            let fixed = tools as u64 * config.per_tool_tokens
                + config.environment_tokens
                + config.project_tree_tokens;
            if total >= fixed {
                prop_assert_eq!(b.tool_definitions.tokens, tools as u64 * config.per_tool_tokens);
                prop_assert_eq!(b.environment_context.tokens, config.environment_tokens);
                prop_assert_eq!(b.project_tree.tokens, config.project_tree_tokens);
                prop_assert_eq!(b.base_system_prompt.tokens, total - fixed);
            }
        }
    }
}
