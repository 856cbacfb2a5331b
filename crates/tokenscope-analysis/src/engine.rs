// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token analysis engine.
//!
//! Tokenizes every collected entry into five category summaries, then
//! reconciles them with provider telemetry. When the transcript exposes no
//! system prompt text but the most recent call reports input, the system
//! category is inferred as
//! `max(0, recent_input + recent_cache_read - user_tokens - tool_tokens)`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokenscope_core::{Message, Role, UsageTotals};
use tokenscope_tokenizer::{TokenizerManager, TokenizerSpec};
use tracing::debug;

use crate::category::{Category, CategorySummary, TokenEntry};
use crate::collector::{CollectedContent, ContentEntry};

/// Label of the synthetic entry holding an inferred system prompt.
pub const INFERRED_SYSTEM_LABEL: &str = "System prompt (inferred from telemetry)";

/// Usage of a single provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallSnapshot {
    pub message_id: Option<String>,
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    pub cost: f64,
}

impl CallSnapshot {
    pub fn from_message(message: &Message) -> Self {
        let telemetry = message.telemetry();
        Self {
            message_id: message.id.clone(),
            input: telemetry.input(),
            output: telemetry.output(),
            reasoning: telemetry.reasoning(),
            cache_read: telemetry.cache_read(),
            cache_write: telemetry.cache_write(),
            cost: message.cost_usd(),
        }
    }
}

/// The newest assistant message reporting nonzero usage.
pub fn most_recent_call(messages: &[Message]) -> Option<CallSnapshot> {
    messages
        .iter()
        .rev()
        .filter(|m| m.has_role(Role::Assistant))
        .find(|m| m.telemetry().has_usage())
        .map(CallSnapshot::from_message)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBreakdown {
    pub system: CategorySummary,
    pub user: CategorySummary,
    pub assistant: CategorySummary,
    pub tools: CategorySummary,
    pub reasoning: CategorySummary,
}

impl CategoryBreakdown {
    pub fn empty() -> Self {
        Self {
            system: CategorySummary::empty(Category::System.to_string()),
            user: CategorySummary::empty(Category::User.to_string()),
            assistant: CategorySummary::empty(Category::Assistant.to_string()),
            tools: CategorySummary::empty(Category::Tools.to_string()),
            reasoning: CategorySummary::empty(Category::Reasoning.to_string()),
        }
    }

    pub fn get(&self, category: Category) -> &CategorySummary {
        match category {
            Category::System => &self.system,
            Category::User => &self.user,
            Category::Assistant => &self.assistant,
            Category::Tools => &self.tools,
            Category::Reasoning => &self.reasoning,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.system.total_tokens
            + self.user.total_tokens
            + self.assistant.total_tokens
            + self.tools.total_tokens
            + self.reasoning.total_tokens
    }
}

/// Category breakdown reconciled with telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenAnalysis {
    pub tokenizer: TokenizerSpec,
    pub categories: CategoryBreakdown,
    /// Sum of the five category totals.
    pub total_tokens: u64,
    /// Telemetry and cost summed over assistant messages.
    pub session_totals: UsageTotals,
    pub most_recent_call: Option<CallSnapshot>,
    pub assistant_turns: usize,
    /// True when the system category came from telemetry rather than text.
    pub system_inferred: bool,
    pub tool_call_counts: BTreeMap<String, usize>,
    pub tool_names: Vec<String>,
}

impl TokenAnalysis {
    pub fn empty(tokenizer: TokenizerSpec) -> Self {
        Self {
            tokenizer,
            categories: CategoryBreakdown::empty(),
            total_tokens: 0,
            session_totals: UsageTotals::default(),
            most_recent_call: None,
            assistant_turns: 0,
            system_inferred: false,
            tool_call_counts: BTreeMap::new(),
            tool_names: Vec::new(),
        }
    }
}

/// Builds [`TokenAnalysis`] values with a shared tokenizer manager.
#[derive(Clone)]
pub struct AnalysisEngine {
    tokenizers: Arc<TokenizerManager>,
}

impl AnalysisEngine {
    pub fn new(tokenizers: Arc<TokenizerManager>) -> Self {
        Self { tokenizers }
    }

    pub async fn analyze(
        &self,
        messages: &[Message],
        spec: &TokenizerSpec,
        entry_limit: usize,
    ) -> TokenAnalysis {
        let content = CollectedContent::from_messages(messages);

        let (mut system, user, assistant, tools, reasoning) = tokio::join!(
            self.summarize(Category::System, &content.system, spec, entry_limit),
            self.summarize(Category::User, &content.user, spec, entry_limit),
            self.summarize(Category::Assistant, &content.assistant, spec, entry_limit),
            self.summarize(Category::Tools, &content.tools, spec, entry_limit),
            self.summarize(Category::Reasoning, &content.reasoning, spec, entry_limit),
        );

        let session_totals = UsageTotals::from_assistant_messages(messages);
        let most_recent_call = most_recent_call(messages);
        let assistant_turns = messages
            .iter()
            .filter(|m| m.has_role(Role::Assistant))
            .count();

        let mut system_inferred = false;
        if system.total_tokens == 0 {
            if let Some(call) = &most_recent_call {
                let inferred = infer_system_tokens(call, user.total_tokens, tools.total_tokens);
                if inferred > 0 {
                    debug!(inferred, "system prompt inferred from telemetry");
                    system = CategorySummary::new(
                        Category::System.to_string(),
                        vec![TokenEntry::new(INFERRED_SYSTEM_LABEL, inferred)],
                        entry_limit,
                    );
                    system_inferred = true;
                }
            }
        }

        let categories = CategoryBreakdown {
            system,
            user,
            assistant,
            tools,
            reasoning,
        };
        let total_tokens = categories.total_tokens();

        debug!(
            messages = messages.len(),
            tokenizer = %spec,
            total_tokens,
            assistant_turns,
            "token analysis complete"
        );

        TokenAnalysis {
            tokenizer: spec.clone(),
            categories,
            total_tokens,
            session_totals,
            most_recent_call,
            assistant_turns,
            system_inferred,
            tool_call_counts: content.tool_call_counts,
            tool_names: content.tool_names,
        }
    }

    async fn summarize(
        &self,
        category: Category,
        entries: &[ContentEntry],
        spec: &TokenizerSpec,
        entry_limit: usize,
    ) -> CategorySummary {
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        let counts = self.tokenizers.count_many(&contents, spec).await;
        let tokens = entries
            .iter()
            .zip(counts)
            .map(|(entry, count)| TokenEntry::new(entry.label.clone(), count as u64))
            .collect();
        CategorySummary::new(category.to_string(), tokens, entry_limit)
    }
}

/// Provider-seen prompt tokens not explained by local user and tool text.
pub fn infer_system_tokens(call: &CallSnapshot, user_tokens: u64, tool_tokens: u64) -> u64 {
    (call.input + call.cache_read).saturating_sub(user_tokens + tool_tokens)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use serde_json::json;
    use tokenscope_core::TokenTelemetry;
    use tokenscope_test_utils::fixtures::{
        assistant, assistant_call, assistant_parts, completed_tool, system, telemetry, user,
    };
    use tokenscope_tokenizer::{DefaultBackendLoader, TokenizerFileCache};

    fn engine() -> AnalysisEngine {
        let loader = DefaultBackendLoader::new(TokenizerFileCache::new("/nonexistent", false));
        AnalysisEngine::new(Arc::new(TokenizerManager::new(
            Arc::new(loader),
            Duration::from_secs(5),
        )))
    }

    #[tokio::test]
    async fn empty_transcript_is_all_zero() {
        let analysis = engine().analyze(&[], &TokenizerSpec::Approx, 3).await;
        assert_eq!(analysis.total_tokens, 0);
        assert_eq!(analysis.assistant_turns, 0);
        assert!(analysis.most_recent_call.is_none());
        assert!(!analysis.system_inferred);
        assert_eq!(analysis.categories, CategoryBreakdown::empty());
    }

    #[tokio::test]
    async fn total_is_sum_of_categories() {
        let messages = vec![
            system(&"s".repeat(40)),
            user(&"u".repeat(8)),
            assistant_parts(vec![completed_tool("read", json!({}), &"t".repeat(12))]),
            assistant(&"a".repeat(4)),
        ];
        let analysis = engine().analyze(&messages, &TokenizerSpec::Approx, 3).await;
        assert_eq!(analysis.categories.system.total_tokens, 10);
        assert_eq!(analysis.categories.user.total_tokens, 2);
        assert_eq!(analysis.categories.tools.total_tokens, 3);
        assert_eq!(analysis.categories.assistant.total_tokens, 1);
        assert_eq!(analysis.total_tokens, 16);
        assert_eq!(analysis.tool_call_counts.get("read"), Some(&1));
        assert_eq!(analysis.assistant_turns, 2);
    }

    #[tokio::test]
    async fn system_is_inferred_from_recent_call() {
        let messages = vec![
            user(&"u".repeat(40)),
            assistant_call("ok", telemetry(500, 20, 1500, 0), 0.01, "anthropic", "claude"),
            user(&"u".repeat(40)),
        ];
        let analysis = engine().analyze(&messages, &TokenizerSpec::Approx, 3).await;
        // 500 + 1500 - (10 + 10 user tokens) - 0 tool tokens
        assert!(analysis.system_inferred);
        assert_eq!(analysis.categories.system.total_tokens, 1980);
        assert_eq!(
            analysis.categories.system.all_entries[0].label,
            INFERRED_SYSTEM_LABEL
        );
        assert_eq!(analysis.total_tokens, 1980 + 20 + 1);
    }

    #[tokio::test]
    async fn local_system_text_is_never_replaced() {
        let messages = vec![
            system("Be brief."),
            assistant_call("ok", telemetry(5000, 20, 0, 0), 0.01, "openai", "gpt-4o"),
        ];
        let analysis = engine().analyze(&messages, &TokenizerSpec::Approx, 3).await;
        assert!(!analysis.system_inferred);
        assert_eq!(analysis.categories.system.total_tokens, 3);
    }

    #[tokio::test]
    async fn inference_floors_at_zero() {
        let messages = vec![
            user(&"u".repeat(400)),
            assistant_call("ok", telemetry(10, 1, 0, 0), 0.0, "openai", "gpt-4o"),
        ];
        let analysis = engine().analyze(&messages, &TokenizerSpec::Approx, 3).await;
        assert!(!analysis.system_inferred);
        assert_eq!(analysis.categories.system.total_tokens, 0);
    }

    #[test]
    fn most_recent_call_skips_telemetry_free_messages() {
        let mut empty_usage = assistant("later");
        empty_usage.telemetry = Some(TokenTelemetry::default());
        let messages = vec![
            assistant_call("first", telemetry(1, 1, 0, 0), 0.0, "openai", "gpt-4o"),
            assistant_call("second", telemetry(7, 3, 2, 1), 0.5, "openai", "gpt-4o"),
            empty_usage,
            assistant("no telemetry"),
        ];
        let snapshot = most_recent_call(&messages).unwrap();
        assert_eq!(snapshot.input, 7);
        assert_eq!(snapshot.cache_write, 1);
        assert!((snapshot.cost - 0.5).abs() < f64::EPSILON);
    }
}
