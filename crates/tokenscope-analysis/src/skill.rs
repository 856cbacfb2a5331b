// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skill accounting.
//!
//! Available skills are listed inside the skill tool's description as
//! `<available_skills><skill><name>..</name><description>..</description></skill>..`.
//! Loaded skills are completed invocations of that tool. Every invocation
//! re-injects the skill content, so a skill's total is its first output's
//! token count times its call count.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokenscope_config::model::SkillConfig;
use tokenscope_core::{Message, ScopeError, SessionSource, ToolDescriptor};
use tokenscope_tokenizer::{TokenizerManager, TokenizerSpec};
use tracing::{debug, warn};

use crate::collector::tool_parts;

static LISTING_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)<available_skills>.*?</available_skills>"));

static SKILL_PATTERN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"(?s)<skill>\s*<name>(.*?)</name>\s*<description>(.*?)</description>\s*</skill>")
});

fn pattern(
    cell: &'static LazyLock<Result<Regex, regex::Error>>,
) -> Result<&'static Regex, ScopeError> {
    cell.as_ref()
        .map_err(|e| ScopeError::Internal(format!("invalid skill pattern: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableSkill {
    pub name: String,
    pub description: String,
    /// Cost of listing this skill in the tool description.
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedSkill {
    pub name: String,
    pub call_count: usize,
    pub tokens_per_call: u64,
    /// `tokens_per_call * call_count`.
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkillAnalysis {
    pub available: Vec<AvailableSkill>,
    /// Tokens of the whole `<available_skills>` block.
    pub listing_tokens: u64,
    pub loaded: Vec<LoadedSkill>,
    pub loaded_tokens: u64,
    /// The tool catalog lookup failed or timed out; `available` is empty but
    /// `loaded` still reflects the transcript.
    pub catalog_failed: bool,
}

/// A skill name with its invocation count and first output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInvocations {
    pub name: String,
    pub call_count: usize,
    pub first_output: String,
}

/// Completed skill-tool invocations grouped by skill name, in first-seen order.
pub fn skill_invocations(messages: &[Message], config: &SkillConfig) -> Vec<SkillInvocations> {
    let mut skills: Vec<SkillInvocations> = Vec::new();
    for (tool, state) in tool_parts(messages) {
        if !tool.eq_ignore_ascii_case(&config.tool_name) || !state.is_completed() {
            continue;
        }
        let Some(name) = state
            .string_arg(&config.name_argument)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        match skills.iter_mut().find(|s| s.name == name) {
            Some(skill) => skill.call_count += 1,
            None => skills.push(SkillInvocations {
                name: name.to_string(),
                call_count: 1,
                first_output: state.output.clone().unwrap_or_default(),
            }),
        }
    }
    skills
}

/// Parsed `<available_skills>` block: the block text and `(name, description, entry text)`.
pub fn parse_available_skills(
    description: &str,
) -> Result<Option<(String, Vec<(String, String, String)>)>, ScopeError> {
    let Some(block) = pattern(&LISTING_PATTERN)?.find(description) else {
        return Ok(None);
    };
    let skills = pattern(&SKILL_PATTERN)?
        .captures_iter(block.as_str())
        .filter_map(|caps| {
            let entry = caps.get(0)?.as_str().to_string();
            let name = caps.get(1)?.as_str().trim().to_string();
            let description = caps.get(2)?.as_str().trim().to_string();
            (!name.is_empty()).then_some((name, description, entry))
        })
        .collect();
    Ok(Some((block.as_str().to_string(), skills)))
}

pub struct SkillAnalyzer {
    source: Arc<dyn SessionSource>,
    tokenizers: Arc<TokenizerManager>,
    config: SkillConfig,
    catalog_timeout: Duration,
}

impl SkillAnalyzer {
    pub fn new(
        source: Arc<dyn SessionSource>,
        tokenizers: Arc<TokenizerManager>,
        config: SkillConfig,
        catalog_timeout: Duration,
    ) -> Self {
        Self {
            source,
            tokenizers,
            config,
            catalog_timeout,
        }
    }

    pub(crate) fn set_catalog_timeout(&mut self, timeout: Duration) {
        self.catalog_timeout = timeout;
    }

    /// Never fails. A failed catalog lookup sets `catalog_failed` and leaves
    /// only the available-skill listing empty.
    pub async fn analyze(
        &self,
        messages: &[Message],
        provider_id: Option<&str>,
        model_id: Option<&str>,
        spec: &TokenizerSpec,
    ) -> SkillAnalysis {
        let mut analysis = SkillAnalysis::default();

        if let (Some(provider), Some(model)) = (provider_id, model_id) {
            match self.catalog(provider, model).await {
                Ok(tools) => {
                    let description = tools
                        .iter()
                        .find(|t| t.id.eq_ignore_ascii_case(&self.config.tool_name))
                        .map(|t| t.description.as_str());
                    if let Some(description) = description {
                        self.available_skills(description, spec, &mut analysis).await;
                    }
                }
                Err(e) => {
                    warn!(
                        provider_id = provider,
                        model_id = model,
                        error = %e,
                        "tool catalog unavailable, available skills left empty"
                    );
                    analysis.catalog_failed = true;
                }
            }
        } else {
            debug!("no model metadata, skipping skill catalog lookup");
        }

        let invocations = skill_invocations(messages, &self.config);
        let outputs: Vec<&str> = invocations.iter().map(|s| s.first_output.as_str()).collect();
        let per_call = self.tokenizers.count_many(&outputs, spec).await;

        for (skill, tokens) in invocations.into_iter().zip(per_call) {
            let tokens_per_call = tokens as u64;
            let total_tokens = tokens_per_call.saturating_mul(skill.call_count as u64);
            analysis.loaded_tokens = analysis.loaded_tokens.saturating_add(total_tokens);
            analysis.loaded.push(LoadedSkill {
                name: skill.name,
                call_count: skill.call_count,
                tokens_per_call,
                total_tokens,
            });
        }

        debug!(
            available = analysis.available.len(),
            loaded = analysis.loaded.len(),
            loaded_tokens = analysis.loaded_tokens,
            "skill analysis complete"
        );
        analysis
    }

    async fn catalog(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<Vec<ToolDescriptor>, ScopeError> {
        let lookup = self.source.tools(provider, model);
        match tokio::time::timeout(self.catalog_timeout, lookup).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ScopeError::Timeout {
                duration: self.catalog_timeout,
            }),
        }
    }

    async fn available_skills(
        &self,
        description: &str,
        spec: &TokenizerSpec,
        analysis: &mut SkillAnalysis,
    ) {
        let (block, skills) = match parse_available_skills(description) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "skill listing not parsed");
                return;
            }
        };

        analysis.listing_tokens = self.tokenizers.count_tokens(&block, spec).await as u64;
        let entries: Vec<&str> = skills.iter().map(|(_, _, entry)| entry.as_str()).collect();
        let counts = self.tokenizers.count_many(&entries, spec).await;
        analysis.available = skills
            .into_iter()
            .zip(counts)
            .map(|((name, description, _), tokens)| AvailableSkill {
                name,
                description,
                tokens: tokens as u64,
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use tokenscope_core::{ToolDescriptor, ToolStatus};
    use tokenscope_test_utils::{MockSessionSource, SourceCall};
    use tracing_test::traced_test;
    use tokenscope_test_utils::fixtures::{assistant_parts, completed_tool, tool_part};
    use tokenscope_tokenizer::{DefaultBackendLoader, TokenizerFileCache};

    const DESCRIPTION: &str = "Load a skill by name.\n<available_skills>\n  <skill>\n    <name>research</name>\n    <description>Deep web research</description>\n  </skill>\n  <skill><name>pdf</name><description>Read PDFs</description></skill>\n</available_skills>";

    fn tokenizers() -> Arc<TokenizerManager> {
        let loader = DefaultBackendLoader::new(TokenizerFileCache::new("/nonexistent", false));
        Arc::new(TokenizerManager::new(Arc::new(loader), Duration::from_secs(5)))
    }

    fn analyzer(source: Arc<MockSessionSource>) -> SkillAnalyzer {
        SkillAnalyzer::new(
            source,
            tokenizers(),
            SkillConfig::default(),
            Duration::from_secs(5),
        )
    }

    fn load(name: &str, output: &str) -> tokenscope_core::Part {
        completed_tool("skill", json!({"name": name}), output)
    }

    #[test]
    fn parses_listing() {
        let (block, skills) = parse_available_skills(DESCRIPTION).unwrap().unwrap();
        assert!(block.starts_with("<available_skills>"));
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].0, "research");
        assert_eq!(skills[0].1, "Deep web research");
        assert_eq!(skills[1].0, "pdf");
    }

    #[test]
    fn description_without_listing_is_none() {
        assert!(parse_available_skills("Load a skill.").unwrap().is_none());
    }

    #[test]
    fn invocations_group_by_name_and_keep_first_output() {
        let messages = vec![
            assistant_parts(vec![load("research", "first"), load("pdf", "pdf body")]),
            assistant_parts(vec![
                load("research", "second, longer output"),
                tool_part("skill", ToolStatus::Error, json!({"name": "research"}), None),
                completed_tool("skill", json!({}), "nameless"),
                completed_tool("read", json!({"name": "research"}), "not a skill"),
            ]),
        ];
        let skills = skill_invocations(&messages, &SkillConfig::default());
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].name, "research");
        assert_eq!(skills[0].call_count, 2);
        assert_eq!(skills[0].first_output, "first");
        assert_eq!(skills[1].call_count, 1);
    }

    #[tokio::test]
    async fn available_and_loaded_skills() {
        let source = Arc::new(MockSessionSource::new());
        source
            .set_tools(vec![ToolDescriptor {
                id: "skill".into(),
                description: DESCRIPTION.into(),
                parameters: None,
            }])
            .await;
        let analyzer = analyzer(source.clone());
        let messages = vec![assistant_parts(vec![load("pdf", &"p".repeat(40))])];

        let analysis = analyzer
            .analyze(&messages, Some("anthropic"), Some("claude"), &TokenizerSpec::Approx)
            .await;
        assert_eq!(analysis.available.len(), 2);
        assert!(analysis.listing_tokens >= analysis.available.iter().map(|s| s.tokens).sum());
        assert_eq!(analysis.loaded[0].tokens_per_call, 10);
        assert_eq!(analysis.loaded_tokens, 10);
        assert!(!analysis.catalog_failed);
        assert_eq!(source.tools_calls(), 1);
    }

    #[tokio::test]
    async fn no_model_skips_catalog() {
        let source = Arc::new(MockSessionSource::new());
        let analyzer = analyzer(source.clone());
        let analysis = analyzer
            .analyze(&[], None, Some("claude"), &TokenizerSpec::Approx)
            .await;
        assert!(analysis.available.is_empty());
        assert!(!analysis.catalog_failed);
        assert_eq!(source.tools_calls(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn catalog_failure_keeps_loaded_skills() {
        let source = Arc::new(MockSessionSource::new());
        source.fail_tools().await;
        let messages = vec![assistant_parts(vec![
            load("research", &"r".repeat(480)),
            load("research", "again"),
        ])];

        let analysis = analyzer(source)
            .analyze(&messages, Some("openai"), Some("gpt-4o"), &TokenizerSpec::Approx)
            .await;
        assert!(analysis.catalog_failed);
        assert!(analysis.available.is_empty());
        assert_eq!(analysis.loaded.len(), 1);
        assert_eq!(analysis.loaded[0].call_count, 2);
        assert_eq!(analysis.loaded[0].tokens_per_call, 120);
        assert_eq!(analysis.loaded_tokens, 240);
        assert!(logs_contain("tool catalog unavailable"));
    }

    #[tokio::test]
    async fn stalled_catalog_times_out() {
        let source = Arc::new(MockSessionSource::new());
        source
            .set_call_delay(SourceCall::Tools, Duration::from_secs(60))
            .await;
        let analyzer = SkillAnalyzer::new(
            source.clone(),
            tokenizers(),
            SkillConfig::default(),
            Duration::from_millis(20),
        );
        let messages = vec![assistant_parts(vec![load("pdf", &"p".repeat(40))])];

        let analysis = analyzer
            .analyze(&messages, Some("openai"), Some("gpt-4o"), &TokenizerSpec::Approx)
            .await;
        assert!(analysis.catalog_failed);
        assert_eq!(analysis.loaded_tokens, 10);
        assert_eq!(source.tools_calls(), 1);
    }

    proptest! {
        #[test]
        fn total_is_first_call_cost_times_calls(k in 1usize..20, chars in 1usize..400) {
            let mut parts = vec![load("research", &"r".repeat(chars))];
            for _ in 1..k {
                parts.push(load("research", "shorter"));
            }
            let messages = vec![assistant_parts(parts)];
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let analyzer = analyzer(Arc::new(MockSessionSource::new()));
            let analysis =
                rt.block_on(analyzer.analyze(&messages, None, None, &TokenizerSpec::Approx));
            let skill = &analysis.loaded[0];
            prop_assert_eq!(skill.call_count, k);
            prop_assert_eq!(skill.tokens_per_call, chars.div_ceil(4) as u64);
            prop_assert_eq!(skill.total_tokens, skill.tokens_per_call * k as u64);
        }
    }
}
