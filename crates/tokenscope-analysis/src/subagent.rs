// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage roll-up across a session's descendant (subagent) sessions.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokenscope_core::{Message, Role, SessionId, SessionSource, UsageTotals};
use tokenscope_cost::CostCalculator;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Own usage of one descendant session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubagentSummary {
    pub session_id: SessionId,
    pub title: String,
    pub parent_id: SessionId,
    /// 1 for direct children.
    pub depth: usize,
    pub model_id: Option<String>,
    pub usage: UsageTotals,
    pub total_tokens: u64,
    pub api_cost: f64,
    pub estimated_cost: f64,
    pub assistant_turns: usize,
}

/// Flattened descendants plus subtree totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubagentAnalysis {
    pub subagents: Vec<SubagentSummary>,
    pub totals: UsageTotals,
    pub total_tokens: u64,
    pub api_cost: f64,
    pub estimated_cost: f64,
    pub assistant_turns: usize,
    /// Set when the session cap or the walk deadline stopped the walk early.
    pub truncated: bool,
    /// The walk deadline elapsed; sessions summarized before it are kept.
    pub timed_out: bool,
    /// Child links pointing at an already visited session.
    pub cycles_detected: usize,
    /// Collaborator lookups that failed; their branches were skipped.
    pub failed_lookups: usize,
}

impl SubagentAnalysis {
    fn record(&mut self, summary: SubagentSummary) {
        self.totals += summary.usage;
        self.total_tokens = self.total_tokens.saturating_add(summary.total_tokens);
        self.api_cost += summary.api_cost;
        self.estimated_cost += summary.estimated_cost;
        self.assistant_turns += summary.assistant_turns;
        self.subagents.push(summary);
    }
}

pub struct SubagentAnalyzer {
    source: Arc<dyn SessionSource>,
    calculator: CostCalculator,
    max_sessions: usize,
    walk_timeout: Duration,
}

impl SubagentAnalyzer {
    pub fn new(
        source: Arc<dyn SessionSource>,
        calculator: CostCalculator,
        max_sessions: usize,
        walk_timeout: Duration,
    ) -> Self {
        Self {
            source,
            calculator,
            max_sessions,
            walk_timeout,
        }
    }

    pub(crate) fn set_walk_timeout(&mut self, timeout: Duration) {
        self.walk_timeout = timeout;
    }

    /// Walk every descendant of `root` breadth-first.
    ///
    /// Each session id is visited at most once. A failed `children` lookup
    /// ends that branch; a failed `messages` lookup skips the summary but the
    /// session's own children are still visited. When the walk timeout
    /// elapses the sessions summarized so far are returned with `timed_out`.
    pub async fn analyze_child_sessions(&self, root: &SessionId) -> SubagentAnalysis {
        let mut analysis = SubagentAnalysis::default();
        let mut visited: HashSet<SessionId> = HashSet::from([root.clone()]);
        let mut queue: VecDeque<(SessionId, usize)> = VecDeque::from([(root.clone(), 0)]);
        let deadline = Instant::now() + self.walk_timeout;

        'walk: while let Some((parent, depth)) = queue.pop_front() {
            let children = match timeout_at(deadline, self.source.children(&parent)).await {
                Err(_elapsed) => {
                    self.stop_at_deadline(&mut analysis);
                    break 'walk;
                }
                Ok(Ok(children)) => children,
                Ok(Err(e)) => {
                    warn!(
                        session_id = %parent,
                        error = %e,
                        "child session lookup failed, skipping branch"
                    );
                    analysis.failed_lookups += 1;
                    continue;
                }
            };

            for child in children {
                if visited.contains(&child.id) {
                    warn!(
                        session_id = %child.id,
                        parent_id = %parent,
                        "session already visited, not recursing"
                    );
                    analysis.cycles_detected += 1;
                    continue;
                }
                if visited.len() > self.max_sessions {
                    warn!(max_sessions = self.max_sessions, "subagent session cap reached");
                    analysis.truncated = true;
                    break 'walk;
                }
                visited.insert(child.id.clone());

                match timeout_at(deadline, self.source.messages(&child.id)).await {
                    Err(_elapsed) => {
                        self.stop_at_deadline(&mut analysis);
                        break 'walk;
                    }
                    Ok(Ok(messages)) if !messages.is_empty() => {
                        let summary =
                            self.summarize(&child.id, child.title, &parent, depth + 1, &messages);
                        analysis.record(summary);
                    }
                    Ok(Ok(_)) => debug!(session_id = %child.id, "child session has no messages"),
                    Ok(Err(e)) => {
                        warn!(session_id = %child.id, error = %e, "child message lookup failed");
                        analysis.failed_lookups += 1;
                    }
                }
                queue.push_back((child.id, depth + 1));
            }
        }

        debug!(
            root = %root,
            subagents = analysis.subagents.len(),
            total_tokens = analysis.total_tokens,
            "subagent analysis complete"
        );
        analysis
    }

    fn stop_at_deadline(&self, analysis: &mut SubagentAnalysis) {
        warn!(
            timeout_ms = self.walk_timeout.as_millis() as u64,
            summarized = analysis.subagents.len(),
            "subagent walk timed out, keeping partial result"
        );
        analysis.truncated = true;
        analysis.timed_out = true;
    }

    fn summarize(
        &self,
        id: &SessionId,
        title: String,
        parent: &SessionId,
        depth: usize,
        messages: &[Message],
    ) -> SubagentSummary {
        let usage = UsageTotals::from_assistant_messages(messages);
        let assistant_turns = messages
            .iter()
            .filter(|m| m.has_role(Role::Assistant))
            .count();
        let model_id = messages
            .iter()
            .rev()
            .filter_map(|m| m.model_id.as_deref())
            .find(|m| !m.trim().is_empty())
            .map(str::to_string);
        let estimate = self
            .calculator
            .calculate(model_id.as_deref(), &usage, assistant_turns);

        SubagentSummary {
            session_id: id.clone(),
            title,
            parent_id: parent.clone(),
            depth,
            model_id,
            total_tokens: usage.total_tokens(),
            api_cost: usage.cost,
            estimated_cost: estimate.estimated_total,
            assistant_turns,
            usage,
        }
    }
}
