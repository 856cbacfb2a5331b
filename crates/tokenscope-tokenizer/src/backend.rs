// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete tokenizer backends and the loader that builds them from a spec.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tiktoken_rs::CoreBPE;
use tokenscope_core::ScopeError;
use tracing::debug;

use crate::hub::TokenizerFileCache;
use crate::spec::TokenizerSpec;

/// A loaded tokenizer able to count tokens in text.
pub trait TokenBackend: Send + Sync {
    /// Spec string of this backend, used in logs.
    fn name(&self) -> &str;

    /// Number of tokens `text` encodes to.
    fn count(&self, text: &str) -> Result<usize, ScopeError>;
}

/// Builds backends for exact tokenizer specs.
///
/// Loading may be slow (file IO, network); callers cache the result.
#[async_trait]
pub trait BackendLoader: Send + Sync + 'static {
    async fn load(&self, spec: &TokenizerSpec) -> Result<Arc<dyn TokenBackend>, ScopeError>;
}

/// BPE backend backed by `tiktoken-rs`.
pub struct TiktokenBackend {
    name: String,
    bpe: CoreBPE,
}

impl TiktokenBackend {
    /// Accepts either an encoding name (`o200k_base`, `cl100k_base`, ...) or
    /// a model name known to `tiktoken-rs`.
    pub fn load(model: &str) -> Result<Self, ScopeError> {
        let bpe = match model {
            "o200k_base" => tiktoken_rs::o200k_base(),
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => tiktoken_rs::get_bpe_from_model(other),
        }
        .map_err(|e| ScopeError::BackendUnavailable {
            backend: format!("tiktoken:{model}"),
            message: e.to_string(),
        })?;

        Ok(Self {
            name: format!("tiktoken:{model}"),
            bpe,
        })
    }
}

impl TokenBackend for TiktokenBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, text: &str) -> Result<usize, ScopeError> {
        Ok(self.bpe.encode_with_special_tokens(text).len())
    }
}

/// Backend wrapping a Hugging Face `tokenizer.json`.
pub struct HuggingFaceBackend {
    name: String,
    tokenizer: tokenizers::Tokenizer,
}

impl HuggingFaceBackend {
    pub fn from_file(hub_id: &str, path: &Path) -> Result<Self, ScopeError> {
        let tokenizer =
            tokenizers::Tokenizer::from_file(path).map_err(|e| ScopeError::BackendUnavailable {
                backend: format!("hf:{hub_id}"),
                message: format!("failed to load {}: {e}", path.display()),
            })?;
        Ok(Self {
            name: format!("hf:{hub_id}"),
            tokenizer,
        })
    }
}

impl TokenBackend for HuggingFaceBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, text: &str) -> Result<usize, ScopeError> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ScopeError::Encode {
                backend: self.name.clone(),
                message: e.to_string(),
            })?;
        Ok(encoding.get_ids().len())
    }
}

/// Loader for the built-in backend families.
pub struct DefaultBackendLoader {
    files: TokenizerFileCache,
}

impl DefaultBackendLoader {
    pub fn new(files: TokenizerFileCache) -> Self {
        Self { files }
    }
}

#[async_trait]
impl BackendLoader for DefaultBackendLoader {
    async fn load(&self, spec: &TokenizerSpec) -> Result<Arc<dyn TokenBackend>, ScopeError> {
        match spec {
            TokenizerSpec::Approx => Err(ScopeError::Internal(
                "approximation has no backend to load".to_string(),
            )),
            TokenizerSpec::Tiktoken { model } => {
                let model = model.clone();
                let backend = tokio::task::spawn_blocking(move || TiktokenBackend::load(&model))
                    .await
                    .map_err(load_task_failed)??;
                debug!(backend = backend.name(), "tiktoken backend ready");
                Ok(Arc::new(backend))
            }
            TokenizerSpec::HuggingFace { hub_id } => {
                let path = self.files.ensure(hub_id).await?;
                let hub_id = hub_id.clone();
                let backend = tokio::task::spawn_blocking(move || {
                    HuggingFaceBackend::from_file(&hub_id, &path)
                })
                .await
                .map_err(load_task_failed)??;
                debug!(backend = backend.name(), "hugging face backend ready");
                Ok(Arc::new(backend))
            }
        }
    }
}

fn load_task_failed(e: tokio::task::JoinError) -> ScopeError {
    ScopeError::Internal(format!("tokenizer load task failed: {e}"))
}
