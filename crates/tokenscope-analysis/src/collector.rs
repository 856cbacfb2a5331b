// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction of labeled text spans from a transcript.
//!
//! Every function here is pure. Messages without a role, tool parts without a
//! name and blank text are skipped rather than reported.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tokenscope_core::{Message, Part, Role};

/// One labeled piece of transcript text awaiting tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub label: String,
    pub content: String,
}

impl ContentEntry {
    fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// All extracted content of one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedContent {
    pub system: Vec<ContentEntry>,
    pub user: Vec<ContentEntry>,
    pub assistant: Vec<ContentEntry>,
    pub tools: Vec<ContentEntry>,
    pub reasoning: Vec<ContentEntry>,
    pub tool_call_counts: BTreeMap<String, usize>,
    pub tool_names: Vec<String>,
}

impl CollectedContent {
    pub fn from_messages(messages: &[Message]) -> Self {
        Self {
            system: system_prompts(messages),
            user: role_texts(messages, Role::User, "User"),
            assistant: role_texts(messages, Role::Assistant, "Assistant"),
            tools: tool_outputs(messages),
            reasoning: reasoning_traces(messages),
            tool_call_counts: tool_call_counts(messages),
            tool_names: tool_names(messages),
        }
    }
}

/// Distinct system prompt texts, labeled by content.
pub fn system_prompts(messages: &[Message]) -> Vec<ContentEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for message in messages.iter().filter(|m| m.has_role(Role::System)) {
        let text = message.text();
        if text.is_empty() || !seen.insert(text.clone()) {
            continue;
        }
        let label = classify_system_prompt(&text, entries.len() + 1);
        entries.push(ContentEntry::new(label, text));
    }
    entries
}

/// Best-effort label for a system prompt. `ordinal` numbers the fallback label.
pub fn classify_system_prompt(text: &str, ordinal: usize) -> String {
    let lower = text.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let label = if has(&["instructions from:"]) {
        "Custom instructions"
    } else if has(&["<env>", "working directory:", "platform:"]) {
        "Environment"
    } else if has(&["<project>", "<files>", "agents.md", "project structure"]) {
        "Project context"
    } else if has(&["permission", "must ask", "not allowed", "approval"]) {
        "Permission rules"
    } else if has(&["markdown", "formatting", "format your", "be concise"]) {
        "Formatting rules"
    } else if has(&["<functions>", "tool use", "use the tool", "available tools"]) {
        "Tool instructions"
    } else {
        return format!("System prompt #{ordinal}");
    };
    label.to_string()
}

fn role_texts(messages: &[Message], role: Role, prefix: &str) -> Vec<ContentEntry> {
    messages
        .iter()
        .filter(|m| m.has_role(role))
        .map(Message::text)
        .filter(|text| !text.is_empty())
        .enumerate()
        .map(|(i, text)| ContentEntry::new(format!("{prefix} #{}", i + 1), text))
        .collect()
}

pub fn user_texts(messages: &[Message]) -> Vec<ContentEntry> {
    role_texts(messages, Role::User, "User")
}

pub fn assistant_texts(messages: &[Message]) -> Vec<ContentEntry> {
    role_texts(messages, Role::Assistant, "Assistant")
}

/// Completed tool outputs merged per tool name, in first-seen order.
pub fn tool_outputs(messages: &[Message]) -> Vec<ContentEntry> {
    let mut entries: Vec<ContentEntry> = Vec::new();
    for (tool, state) in tool_parts(messages) {
        if !state.is_completed() {
            continue;
        }
        let Some(output) = state.output.as_deref().filter(|o| !o.trim().is_empty()) else {
            continue;
        };
        match entries.iter_mut().find(|e| e.label == tool) {
            Some(entry) => {
                entry.content.push('\n');
                entry.content.push_str(output);
            }
            None => entries.push(ContentEntry::new(tool, output)),
        }
    }
    entries
}

/// One entry per non-blank reasoning part.
pub fn reasoning_traces(messages: &[Message]) -> Vec<ContentEntry> {
    messages
        .iter()
        .filter(|m| m.role.is_some())
        .flat_map(|m| m.parts.iter())
        .filter_map(|part| match part {
            Part::Reasoning { text } if !text.trim().is_empty() => Some(text.trim()),
            _ => None,
        })
        .enumerate()
        .map(|(i, text)| ContentEntry::new(format!("Reasoning #{}", i + 1), text))
        .collect()
}

/// Invocation count per tool name, any execution state.
pub fn tool_call_counts(messages: &[Message]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (tool, _) in tool_parts(messages) {
        *counts.entry(tool.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Sorted, distinct names of every tool invoked.
pub fn tool_names(messages: &[Message]) -> Vec<String> {
    tool_parts(messages)
        .map(|(tool, _)| tool.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Tool parts with a non-blank name, in transcript order.
pub(crate) fn tool_parts(
    messages: &[Message],
) -> impl Iterator<Item = (&str, &tokenscope_core::ToolState)> {
    messages
        .iter()
        .filter(|m| m.role.is_some())
        .flat_map(|m| m.parts.iter())
        .filter_map(|part| match part {
            Part::Tool { tool, state } if !tool.trim().is_empty() => Some((tool.as_str(), state)),
            _ => None,
        })
}
