// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk cache of Hugging Face `tokenizer.json` files.
//!
//! Files live under `<cache_dir>/<owner>--<repo>/tokenizer.json` and are
//! fetched from the hub on first use when downloads are allowed.

use std::path::{Path, PathBuf};

use tokenscope_core::ScopeError;
use tracing::{debug, info};

const HUB_BASE_URL: &str = "https://huggingface.co";

/// Resolves and populates local tokenizer files.
#[derive(Debug, Clone)]
pub struct TokenizerFileCache {
    cache_dir: PathBuf,
    allow_download: bool,
}

impl TokenizerFileCache {
    pub fn new(cache_dir: impl Into<PathBuf>, allow_download: bool) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            allow_download,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local directory for one hub repository.
    pub fn repo_dir(&self, hub_id: &str) -> PathBuf {
        self.cache_dir.join(hub_id.replace('/', "--"))
    }

    pub fn tokenizer_path(&self, hub_id: &str) -> PathBuf {
        self.repo_dir(hub_id).join("tokenizer.json")
    }

    pub fn is_cached(&self, hub_id: &str) -> bool {
        self.tokenizer_path(hub_id).is_file()
    }

    /// Returns the path of a usable `tokenizer.json`, downloading it if needed.
    pub async fn ensure(&self, hub_id: &str) -> Result<PathBuf, ScopeError> {
        let dest = self.tokenizer_path(hub_id);
        if dest.is_file() {
            debug!(hub_id, path = %dest.display(), "tokenizer file cached");
            return Ok(dest);
        }

        if !self.allow_download {
            return Err(ScopeError::BackendUnavailable {
                backend: format!("hf:{hub_id}"),
                message: format!("{} not cached and downloads are disabled", dest.display()),
            });
        }

        let dir = self.repo_dir(hub_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            ScopeError::Internal(format!("failed to create {}: {e}", dir.display()))
        })?;

        let url = format!("{HUB_BASE_URL}/{hub_id}/resolve/main/tokenizer.json");
        info!(hub_id, url = %url, "downloading tokenizer");

        // Written beside the final path, then renamed, so a partial file is never loaded.
        let partial = dir.join("tokenizer.json.part");
        match download_file(hub_id, &url, &partial).await {
            Ok(size) => {
                tokio::fs::rename(&partial, &dest).await.map_err(|e| {
                    ScopeError::Internal(format!("failed to move {}: {e}", partial.display()))
                })?;
                info!(hub_id, bytes = size, "tokenizer downloaded");
                Ok(dest)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }
}

async fn download_file(hub_id: &str, url: &str, dest: &Path) -> Result<usize, ScopeError> {
    let unavailable = |message: String| ScopeError::BackendUnavailable {
        backend: format!("hf:{hub_id}"),
        message,
    };

    let response = reqwest::get(url)
        .await
        .map_err(|e| unavailable(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(unavailable(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| unavailable(format!("failed to read response body from {url}: {e}")))?;

    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| ScopeError::Internal(format!("failed to write {}: {e}", dest.display())))?;

    Ok(bytes.len())
}
