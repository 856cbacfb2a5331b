// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The narrow collaborator interface through which the engine reads session data.
//!
//! The engine never reaches into a host client directly; the orchestrator is
//! constructed with an `Arc<dyn SessionSource>` and every analyzer receives it
//! by reference.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScopeError;
use crate::types::{ChildSession, Message, SessionExport, SessionId, ToolDescriptor};

/// Read-only access to the host session store and tool catalog.
#[async_trait]
pub trait SessionSource: Send + Sync + 'static {
    /// Returns the ordered transcript of a session. An unknown or empty
    /// session yields an empty list, not an error.
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, ScopeError>;

    /// Returns the direct children (subagent sessions) of a session.
    async fn children(&self, session_id: &SessionId) -> Result<Vec<ChildSession>, ScopeError>;

    /// Returns the tool catalog offered to the given provider/model pair.
    async fn tools(
        &self,
        provider_id: &str,
        model_id: &str,
    ) -> Result<Vec<ToolDescriptor>, ScopeError>;

    /// Returns the rich export used for exact context attribution.
    ///
    /// Hosts that cannot expose raw system prompts keep the default, which
    /// wraps the plain transcript so the context analyzer takes its estimate path.
    async fn export(&self, session_id: &SessionId) -> Result<SessionExport, ScopeError> {
        Ok(SessionExport {
            messages: self.messages(session_id).await?,
            ..Default::default()
        })
    }
}

/// One session record inside a [`StaticSessionSource`] snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "parentID", alias = "parentId")]
    pub parent_id: Option<SessionId>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system_prompts: Vec<String>,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
}

/// A session store snapshot held in memory, typically loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticSessionSource {
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(skip)]
    index: HashMap<SessionId, usize>,
}

impl StaticSessionSource {
    /// Builds a source from session records and a tool catalog.
    pub fn new(sessions: Vec<SessionRecord>, tools: Vec<ToolDescriptor>) -> Self {
        let mut source = Self {
            sessions,
            tools,
            index: HashMap::new(),
        };
        source.reindex();
        source
    }

    /// Parses a JSON snapshot (`{"sessions": [...], "tools": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, ScopeError> {
        let mut source: Self = serde_json::from_str(json).map_err(|e| ScopeError::Session {
            message: format!("invalid session snapshot: {e}"),
            source: Some(Box::new(e)),
        })?;
        source.reindex();
        Ok(source)
    }

    fn reindex(&mut self) {
        self.index = self
            .sessions
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();
    }

    fn record(&self, session_id: &SessionId) -> Option<&SessionRecord> {
        self.index.get(session_id).map(|&i| &self.sessions[i])
    }

    /// Returns the first session without a parent, if any.
    pub fn root_session(&self) -> Option<&SessionId> {
        self.sessions
            .iter()
            .find(|s| s.parent_id.is_none())
            .map(|s| &s.id)
    }
}

#[async_trait]
impl SessionSource for StaticSessionSource {
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, ScopeError> {
        Ok(self
            .record(session_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }

    async fn children(&self, session_id: &SessionId) -> Result<Vec<ChildSession>, ScopeError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.parent_id.as_ref() == Some(session_id))
            .map(|s| ChildSession {
                id: s.id.clone(),
                title: s.title.clone(),
            })
            .collect())
    }

    async fn tools(
        &self,
        _provider_id: &str,
        _model_id: &str,
    ) -> Result<Vec<ToolDescriptor>, ScopeError> {
        Ok(self.tools.clone())
    }

    async fn export(&self, session_id: &SessionId) -> Result<SessionExport, ScopeError> {
        let Some(record) = self.record(session_id) else {
            return Ok(SessionExport::default());
        };
        Ok(SessionExport {
            messages: record.messages.clone(),
            system_prompts: record.system_prompts.clone(),
            enabled_tools: record.enabled_tools.clone(),
        })
    }
}
