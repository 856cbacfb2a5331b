// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session token analysis for tokenscope.
//!
//! Collects transcript content into categories, tokenizes it, reconciles the
//! result with provider telemetry and prices it. The context, subagent and
//! skill analyzers add their own views, and [`SessionAnalyzer`] merges all of
//! them into one [`SessionReport`].

pub mod analyzer;
pub mod category;
pub mod collector;
pub mod context;
pub mod engine;
pub mod skill;
pub mod subagent;

pub use analyzer::{ReportSection, SessionAnalyzer, SessionReport, TreeTotals};
pub use category::{Category, CategorySummary, TokenEntry};
pub use collector::{CollectedContent, ContentEntry, classify_system_prompt};
pub use context::{
    CacheEfficiency, ContextAnalysis, ContextAnalyzer, ContextBreakdown, ContextBucket,
    ContextMethod, ToolEstimate,
};
pub use engine::{
    AnalysisEngine, CallSnapshot, CategoryBreakdown, INFERRED_SYSTEM_LABEL, TokenAnalysis,
    most_recent_call,
};
pub use skill::{AvailableSkill, LoadedSkill, SkillAnalysis, SkillAnalyzer};
pub use subagent::{SubagentAnalysis, SubagentAnalyzer, SubagentSummary};
