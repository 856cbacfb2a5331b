// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for tokenscope integration tests.
//!
//! # Components
//!
//! - [`MockSessionSource`] - in-memory session store with failure injection,
//!   artificial latency (global or per method) and per-method call counters
//! - [`fixtures`] - terse builders for transcript messages and tool parts

pub mod fixtures;
pub mod mock_source;

pub use mock_source::{MockSessionSource, SourceCall};
