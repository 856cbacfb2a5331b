// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the tokenscope accounting engine.

use thiserror::Error;

/// The primary error type used across tokenscope crates.
///
/// Most variants never reach the caller of the top-level analysis: they are
/// caught at sub-analysis boundaries and turned into default results. Only
/// [`ScopeError::MissingSessionId`] and [`ScopeError::Session`] raised while
/// fetching the root transcript propagate.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// Configuration errors (invalid catalog, malformed tokenizer spec strings).
    #[error("configuration error: {0}")]
    Config(String),

    /// The analysis was requested without a usable session id.
    #[error("no session id supplied")]
    MissingSessionId,

    /// A session collaborator (messages, children, tool catalog, export) failed.
    #[error("session source error: {message}")]
    Session {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An exact tokenizer backend could not be loaded.
    #[error("tokenizer backend `{backend}` unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// A loaded backend failed to encode a string.
    #[error("tokenizer backend `{backend}` failed to encode: {message}")]
    Encode { backend: String, message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScopeError {
    /// Convenience constructor for collaborator failures without an inner source.
    pub fn session(message: impl Into<String>) -> Self {
        ScopeError::Session {
            message: message.into(),
            source: None,
        }
    }
}
