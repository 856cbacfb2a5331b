// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock session store for deterministic testing.
//!
//! `MockSessionSource` implements `SessionSource` over in-memory sessions and
//! can be told to fail or stall individual collaborator calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use tokenscope_core::{
    ChildSession, Message, ScopeError, SessionExport, SessionId, SessionSource, ToolDescriptor,
};

#[derive(Debug, Clone, Default)]
struct MockSession {
    title: String,
    messages: Vec<Message>,
    children: Vec<SessionId>,
    system_prompts: Vec<String>,
    enabled_tools: Vec<String>,
}

/// A `SessionSource` method, for per-method latency injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCall {
    Messages,
    Children,
    Tools,
    Export,
}

#[derive(Debug, Default)]
struct Failures {
    messages: HashSet<SessionId>,
    children: HashSet<SessionId>,
    tools: bool,
    export: bool,
    delay: Option<Duration>,
    call_delays: HashMap<SourceCall, Duration>,
}

/// Per-method invocation counts.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub messages: AtomicUsize,
    pub children: AtomicUsize,
    pub tools: AtomicUsize,
    pub export: AtomicUsize,
}

/// An in-memory `SessionSource` with failure injection.
#[derive(Default)]
pub struct MockSessionSource {
    sessions: Mutex<HashMap<SessionId, MockSession>>,
    tools: Mutex<Vec<ToolDescriptor>>,
    failures: Mutex<Failures>,
    calls: CallCounts,
}

impl MockSessionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a session's transcript.
    pub async fn add_session(&self, id: &str, title: &str, messages: Vec<Message>) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(SessionId::from(id)).or_default();
        session.title = title.to_string();
        session.messages = messages;
    }

    /// Link `child` under `parent`. Either may be added before or after.
    pub async fn add_child(&self, parent: &str, child: &str) {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(SessionId::from(parent))
            .or_default()
            .children
            .push(SessionId::from(child));
        sessions.entry(SessionId::from(child)).or_default();
    }

    /// Raw prompts and enabled tools returned by `export`.
    pub async fn set_export(
        &self,
        id: &str,
        system_prompts: Vec<String>,
        enabled_tools: Vec<String>,
    ) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(SessionId::from(id)).or_default();
        session.system_prompts = system_prompts;
        session.enabled_tools = enabled_tools;
    }

    pub async fn set_tools(&self, tools: Vec<ToolDescriptor>) {
        *self.tools.lock().await = tools;
    }

    pub async fn fail_messages(&self, id: &str) {
        self.failures.lock().await.messages.insert(SessionId::from(id));
    }

    pub async fn fail_children(&self, id: &str) {
        self.failures.lock().await.children.insert(SessionId::from(id));
    }

    pub async fn fail_tools(&self) {
        self.failures.lock().await.tools = true;
    }

    pub async fn fail_export(&self) {
        self.failures.lock().await.export = true;
    }

    /// Delay every collaborator call by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        self.failures.lock().await.delay = Some(delay);
    }

    /// Delay only calls to `call`, overriding any global delay for it.
    pub async fn set_call_delay(&self, call: SourceCall, delay: Duration) {
        self.failures.lock().await.call_delays.insert(call, delay);
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    pub fn message_calls(&self) -> usize {
        self.calls.messages.load(Ordering::SeqCst)
    }

    pub fn children_calls(&self) -> usize {
        self.calls.children.load(Ordering::SeqCst)
    }

    pub fn tools_calls(&self) -> usize {
        self.calls.tools.load(Ordering::SeqCst)
    }

    pub fn export_calls(&self) -> usize {
        self.calls.export.load(Ordering::SeqCst)
    }

    async fn stall(&self, call: SourceCall) {
        let delay = {
            let failures = self.failures.lock().await;
            failures.call_delays.get(&call).copied().or(failures.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn injected(what: &str, id: &str) -> ScopeError {
    ScopeError::session(format!("injected {what} failure for {id}"))
}

#[async_trait]
impl SessionSource for MockSessionSource {
    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, ScopeError> {
        self.calls.messages.fetch_add(1, Ordering::SeqCst);
        self.stall(SourceCall::Messages).await;
        if self.failures.lock().await.messages.contains(session_id) {
            return Err(injected("messages", session_id.as_str()));
        }
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default())
    }

    async fn children(&self, session_id: &SessionId) -> Result<Vec<ChildSession>, ScopeError> {
        self.calls.children.fetch_add(1, Ordering::SeqCst);
        self.stall(SourceCall::Children).await;
        if self.failures.lock().await.children.contains(session_id) {
            return Err(injected("children", session_id.as_str()));
        }
        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        Ok(session
            .children
            .iter()
            .map(|id| ChildSession {
                id: id.clone(),
                title: sessions.get(id).map(|s| s.title.clone()).unwrap_or_default(),
            })
            .collect())
    }

    async fn tools(
        &self,
        provider_id: &str,
        model_id: &str,
    ) -> Result<Vec<ToolDescriptor>, ScopeError> {
        self.calls.tools.fetch_add(1, Ordering::SeqCst);
        self.stall(SourceCall::Tools).await;
        if self.failures.lock().await.tools {
            return Err(injected("tools", &format!("{provider_id}/{model_id}")));
        }
        Ok(self.tools.lock().await.clone())
    }

    async fn export(&self, session_id: &SessionId) -> Result<SessionExport, ScopeError> {
        self.calls.export.fetch_add(1, Ordering::SeqCst);
        self.stall(SourceCall::Export).await;
        if self.failures.lock().await.export {
            return Err(injected("export", session_id.as_str()));
        }
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .map(|s| SessionExport {
                messages: s.messages.clone(),
                system_prompts: s.system_prompts.clone(),
                enabled_tools: s.enabled_tools.clone(),
            })
            .unwrap_or_default())
    }
}
