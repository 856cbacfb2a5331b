// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level session analysis.
//!
//! [`SessionAnalyzer`] fetches the root transcript, resolves the tokenizer,
//! then runs the token analysis, context, skill and subagent sections
//! concurrently. Collaborator-backed sections are bounded by the configured
//! timeout and fall back to default or partial results; only a missing
//! session id or a failed root transcript fetch reaches the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokenscope_config::ScopeConfig;
use tokenscope_core::{Message, ScopeError, SessionExport, SessionId, SessionSource, UsageTotals};
use tokenscope_cost::{CostCalculator, CostEstimate, ModelPricing};
use tokenscope_tokenizer::{
    BackendState, ModelResolver, ResolvedModel, TokenizerManager, TokenizerSpec,
};
use tracing::{debug, info, warn};

use crate::context::{ContextAnalysis, ContextAnalyzer};
use crate::engine::{AnalysisEngine, TokenAnalysis};
use crate::skill::{SkillAnalysis, SkillAnalyzer};
use crate::subagent::{SubagentAnalysis, SubagentAnalyzer};

/// A report section that fell back to a default or partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportSection {
    Tokenizer,
    Context,
    Skills,
    Subagents,
}

/// Usage of the root session plus every descendant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeTotals {
    pub usage: UsageTotals,
    pub total_tokens: u64,
    pub api_cost: f64,
    pub estimated_cost: f64,
    /// Root included.
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub model: ResolvedModel,
    pub analysis: TokenAnalysis,
    pub cost: CostEstimate,
    pub context: ContextAnalysis,
    pub skills: SkillAnalysis,
    pub subagents: SubagentAnalysis,
    pub tree_totals: TreeTotals,
    pub degraded: Vec<ReportSection>,
}

impl SessionReport {
    pub fn is_degraded(&self, section: ReportSection) -> bool {
        self.degraded.contains(&section)
    }
}

/// Runs every analyzer against one session and merges the results.
pub struct SessionAnalyzer {
    source: Arc<dyn SessionSource>,
    config: Arc<ScopeConfig>,
    tokenizers: Arc<TokenizerManager>,
    resolver: Arc<ModelResolver>,
    calculator: CostCalculator,
    engine: AnalysisEngine,
    context: ContextAnalyzer,
    skills: SkillAnalyzer,
    subagents: SubagentAnalyzer,
    collaborator_timeout: Duration,
}

impl SessionAnalyzer {
    /// Build every component from configuration.
    pub fn new(source: Arc<dyn SessionSource>, config: Arc<ScopeConfig>) -> Self {
        let tokenizers = Arc::new(TokenizerManager::from_config(&config.tokenizer));
        let resolver = Arc::new(ModelResolver::from_config(&config.tokenizer));
        let calculator = CostCalculator::from_config(&config);
        Self::with_components(source, config, tokenizers, resolver, calculator)
    }

    /// Build around shared, already constructed components.
    pub fn with_components(
        source: Arc<dyn SessionSource>,
        config: Arc<ScopeConfig>,
        tokenizers: Arc<TokenizerManager>,
        resolver: Arc<ModelResolver>,
        calculator: CostCalculator,
    ) -> Self {
        let collaborator_timeout = Duration::from_secs(config.analysis.collaborator_timeout_secs);
        let engine = AnalysisEngine::new(tokenizers.clone());
        let context = ContextAnalyzer::new(tokenizers.clone(), config.context.clone());
        let skills = SkillAnalyzer::new(
            source.clone(),
            tokenizers.clone(),
            config.skills.clone(),
            collaborator_timeout,
        );
        let subagents = SubagentAnalyzer::new(
            source.clone(),
            calculator.clone(),
            config.subagents.max_sessions,
            collaborator_timeout,
        );

        Self {
            source,
            config,
            tokenizers,
            resolver,
            calculator,
            engine,
            context,
            skills,
            subagents,
            collaborator_timeout,
        }
    }

    /// Override the per-collaborator timeout.
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self.skills.set_catalog_timeout(timeout);
        self.subagents.set_walk_timeout(timeout);
        self
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub async fn analyze(&self, session_id: &SessionId) -> Result<SessionReport, ScopeError> {
        self.analyze_with_limit(session_id, self.config.analysis.entry_limit)
            .await
    }

    pub async fn analyze_with_limit(
        &self,
        session_id: &SessionId,
        entry_limit: usize,
    ) -> Result<SessionReport, ScopeError> {
        if session_id.as_str().trim().is_empty() {
            return Err(ScopeError::MissingSessionId);
        }

        let messages = match self.bounded(self.source.messages(session_id)).await {
            Ok(messages) => messages,
            Err(e @ ScopeError::Session { .. }) => return Err(e),
            Err(e) => {
                return Err(ScopeError::Session {
                    message: format!("could not retrieve messages for session {session_id}"),
                    source: Some(Box::new(e)),
                });
            }
        };

        let model = self.resolver.resolve(&messages);
        let spec = &model.tokenizer;
        let pricing = self.calculator.pricing_for(model.model_id.as_deref());
        debug!(
            session_id = %session_id,
            messages = messages.len(),
            tokenizer = %spec,
            "analyzing session"
        );

        let (analysis, (context, context_ok), (skills, skills_ok), (subagents, subagents_ok)) =
            tokio::join!(
                self.engine.analyze(&messages, spec, entry_limit),
                self.context_section(session_id, &messages, &pricing, spec),
                self.skill_section(&messages, &model),
                self.subagent_section(session_id),
            );

        let cost = self.calculator.calculate(
            model.model_id.as_deref(),
            &analysis.session_totals,
            analysis.assistant_turns,
        );

        let mut degraded = Vec::new();
        if spec.is_exact() && self.tokenizers.backend_state(spec) == BackendState::Unavailable {
            degraded.push(ReportSection::Tokenizer);
        }
        if !context_ok {
            degraded.push(ReportSection::Context);
        }
        if !skills_ok {
            degraded.push(ReportSection::Skills);
        }
        if !subagents_ok {
            degraded.push(ReportSection::Subagents);
        }

        let tree_totals = tree_totals(&analysis, &cost, &subagents);

        info!(
            session_id = %session_id,
            tokenizer = %spec,
            total_tokens = analysis.total_tokens,
            tree_tokens = tree_totals.total_tokens,
            subagents = subagents.subagents.len(),
            degraded = degraded.len(),
            "session analysis complete"
        );

        Ok(SessionReport {
            session_id: session_id.clone(),
            model,
            analysis,
            cost,
            context,
            skills,
            subagents,
            tree_totals,
            degraded,
        })
    }

    async fn context_section(
        &self,
        session_id: &SessionId,
        messages: &[Message],
        pricing: &ModelPricing,
        spec: &TokenizerSpec,
    ) -> (ContextAnalysis, bool) {
        let (export, ok) = match self.bounded(self.source.export(session_id)).await {
            Ok(export) => (export, true),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "session export unavailable, estimating context from transcript"
                );
                let export = SessionExport {
                    messages: messages.to_vec(),
                    ..Default::default()
                };
                (export, false)
            }
        };
        (self.context.analyze(&export, pricing, spec).await, ok)
    }

    async fn skill_section(
        &self,
        messages: &[Message],
        model: &ResolvedModel,
    ) -> (SkillAnalysis, bool) {
        let skills = self
            .skills
            .analyze(
                messages,
                model.provider_id.as_deref(),
                model.model_id.as_deref(),
                &model.tokenizer,
            )
            .await;
        let ok = !skills.catalog_failed;
        (skills, ok)
    }

    /// The walk carries its own deadline so a timeout keeps partial results.
    async fn subagent_section(&self, session_id: &SessionId) -> (SubagentAnalysis, bool) {
        let analysis = self.subagents.analyze_child_sessions(session_id).await;
        let ok = analysis.failed_lookups == 0 && !analysis.timed_out;
        if !ok {
            warn!(
                session_id = %session_id,
                failed_lookups = analysis.failed_lookups,
                timed_out = analysis.timed_out,
                "subagent analysis incomplete, section is partial"
            );
        }
        (analysis, ok)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, ScopeError>>,
    ) -> Result<T, ScopeError> {
        match tokio::time::timeout(self.collaborator_timeout, fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ScopeError::Timeout {
                duration: self.collaborator_timeout,
            }),
        }
    }
}

fn tree_totals(
    analysis: &TokenAnalysis,
    cost: &CostEstimate,
    subagents: &SubagentAnalysis,
) -> TreeTotals {
    let mut usage = analysis.session_totals;
    usage += subagents.totals;
    TreeTotals {
        total_tokens: usage.total_tokens(),
        api_cost: usage.cost,
        estimated_cost: cost.estimated_total + subagents.estimated_cost,
        sessions: 1 + subagents.subagents.len(),
        usage,
    }
}
