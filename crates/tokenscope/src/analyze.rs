// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tokenscope analyze`: run a session snapshot through the analyzer.

use std::path::Path;
use std::sync::Arc;

use tokenscope_analysis::{SessionAnalyzer, SessionReport};
use tokenscope_config::ScopeConfig;
use tokenscope_core::{ScopeError, SessionId, StaticSessionSource};
use tracing::debug;

/// Analyze one session of a JSON snapshot file.
///
/// Without `session`, the first session that has no parent is analyzed.
pub async fn run_analyze(
    config: ScopeConfig,
    snapshot: &Path,
    session: Option<String>,
    entry_limit: Option<usize>,
) -> Result<SessionReport, ScopeError> {
    let json = tokio::fs::read_to_string(snapshot)
        .await
        .map_err(|e| ScopeError::Session {
            message: format!("cannot read snapshot {}: {e}", snapshot.display()),
            source: Some(Box::new(e)),
        })?;
    analyze_snapshot(config, &json, session, entry_limit).await
}

pub async fn analyze_snapshot(
    config: ScopeConfig,
    json: &str,
    session: Option<String>,
    entry_limit: Option<usize>,
) -> Result<SessionReport, ScopeError> {
    let source = StaticSessionSource::from_json(json)?;
    let session_id = match session {
        Some(id) => SessionId(id),
        None => source
            .root_session()
            .cloned()
            .ok_or(ScopeError::MissingSessionId)?,
    };
    debug!(session_id = %session_id, sessions = source.sessions.len(), "snapshot loaded");

    let entry_limit = entry_limit.unwrap_or(config.analysis.entry_limit);
    let analyzer = SessionAnalyzer::new(Arc::new(source), Arc::new(config));
    analyzer.analyze_with_limit(&session_id, entry_limit).await
}

pub fn render_report(report: &SessionReport) -> Result<String, ScopeError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| ScopeError::Internal(format!("report serialization failed: {e}")))
}
