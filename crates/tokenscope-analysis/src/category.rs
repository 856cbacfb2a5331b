// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-category token summaries.

use serde::Serialize;
use strum::Display;

/// Partition of session content used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    System,
    User,
    Assistant,
    Tools,
    Reasoning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenEntry {
    pub label: String,
    pub tokens: u64,
}

impl TokenEntry {
    pub fn new(label: impl Into<String>, tokens: u64) -> Self {
        Self {
            label: label.into(),
            tokens,
        }
    }
}

/// Token totals of one category.
///
/// `all_entries` is sorted by descending token count (stable, so ties keep
/// transcript order) and `total_tokens` is always its sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub label: String,
    pub total_tokens: u64,
    pub top_entries: Vec<TokenEntry>,
    pub all_entries: Vec<TokenEntry>,
}

impl CategorySummary {
    pub fn new(label: impl Into<String>, mut entries: Vec<TokenEntry>, entry_limit: usize) -> Self {
        entries.sort_by(|a, b| b.tokens.cmp(&a.tokens));
        let total_tokens = entries.iter().map(|e| e.tokens).sum();
        let top_entries = entries.iter().take(entry_limit).cloned().collect();
        Self {
            label: label.into(),
            total_tokens,
            top_entries,
            all_entries: entries,
        }
    }

    pub fn empty(label: impl Into<String>) -> Self {
        Self::new(label, Vec::new(), 0)
    }

    pub fn is_empty(&self) -> bool {
        self.all_entries.is_empty()
    }
}
