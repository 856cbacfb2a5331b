// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the tokenscope accounting engine.
//!
//! This crate provides the session data model, the error taxonomy, and the
//! [`SessionSource`] collaborator trait used throughout the workspace. All
//! analyzers depend on these definitions and nothing else from the host.

pub mod error;
pub mod source;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ScopeError;
pub use source::{SessionRecord, SessionSource, StaticSessionSource};
pub use types::{
    ChildSession, Message, Part, Role, SessionExport, SessionId, TokenTelemetry, ToolDescriptor,
    ToolState, ToolStatus, UsageTotals,
};
