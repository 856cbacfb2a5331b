// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token counting for tokenscope.
//!
//! [`TokenizerManager`] counts text with exact backends (`tiktoken-rs` BPE
//! encoders and Hugging Face `tokenizer.json` files) and degrades to a
//! `ceil(chars / 4)` approximation whenever a backend cannot be used.
//! [`ModelResolver`] picks the strategy for a session from its model metadata.

pub mod backend;
pub mod hub;
pub mod manager;
pub mod resolver;
pub mod spec;

pub use backend::{BackendLoader, DefaultBackendLoader, TokenBackend};
pub use hub::TokenizerFileCache;
pub use manager::{BackendState, TokenizerManager};
pub use resolver::{ModelResolver, ResolutionTables, ResolvedModel, canonicalize};
pub use spec::{TokenizerSpec, approximate_tokens};
