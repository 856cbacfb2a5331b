// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide tokenizer registry.
//!
//! Each exact spec owns one `OnceCell` slot. Concurrent first requests for a
//! spec share a single load; the outcome (backend or "unavailable") is kept
//! for the lifetime of the manager, so a failed backend is never retried.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tokenscope_config::model::TokenizerConfig;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::backend::{BackendLoader, DefaultBackendLoader, TokenBackend};
use crate::hub::TokenizerFileCache;
use crate::spec::{TokenizerSpec, approximate_tokens};

type BackendSlot = Arc<OnceCell<Option<Arc<dyn TokenBackend>>>>;

/// Load state of one backend, as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    NotLoaded,
    Ready,
    Unavailable,
}

/// Counts tokens with cached backends, falling back to the approximation.
pub struct TokenizerManager {
    loader: Arc<dyn BackendLoader>,
    backends: DashMap<TokenizerSpec, BackendSlot>,
    load_timeout: Duration,
}

impl TokenizerManager {
    pub fn new(loader: Arc<dyn BackendLoader>, load_timeout: Duration) -> Self {
        Self {
            loader,
            backends: DashMap::new(),
            load_timeout,
        }
    }

    /// Manager using the built-in backends and the configured file cache.
    pub fn from_config(config: &TokenizerConfig) -> Self {
        let files =
            TokenizerFileCache::new(PathBuf::from(&config.cache_dir), config.allow_download);
        Self::new(
            Arc::new(DefaultBackendLoader::new(files)),
            Duration::from_secs(config.load_timeout_secs),
        )
    }

    /// Count tokens in `content` using `spec`.
    ///
    /// Never fails: empty or whitespace-only content is 0, and any backend
    /// problem degrades to `ceil(chars / 4)`.
    pub async fn count_tokens(&self, content: &str, spec: &TokenizerSpec) -> usize {
        if content.trim().is_empty() {
            return 0;
        }
        if !spec.is_exact() {
            return approximate_tokens(content);
        }

        let Some(backend) = self.backend(spec).await else {
            return approximate_tokens(content);
        };

        match backend.count(content) {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    backend = backend.name(),
                    error = %e,
                    chars = content.chars().count(),
                    "token encoding failed, using approximation"
                );
                approximate_tokens(content)
            }
        }
    }

    /// Count several texts with the same spec; results keep input order.
    pub async fn count_many<S: AsRef<str>>(
        &self,
        contents: &[S],
        spec: &TokenizerSpec,
    ) -> Vec<usize> {
        join_all(
            contents
                .iter()
                .map(|content| self.count_tokens(content.as_ref(), spec)),
        )
        .await
    }

    pub fn backend_state(&self, spec: &TokenizerSpec) -> BackendState {
        match self.backends.get(spec).and_then(|slot| slot.value().get().cloned()) {
            None => BackendState::NotLoaded,
            Some(Some(_)) => BackendState::Ready,
            Some(None) => BackendState::Unavailable,
        }
    }

    async fn backend(&self, spec: &TokenizerSpec) -> Option<Arc<dyn TokenBackend>> {
        // Clone the slot out so no map guard is held across the await.
        let slot: BackendSlot = self.backends.entry(spec.clone()).or_default().clone();

        slot.get_or_init(|| async {
            match tokio::time::timeout(self.load_timeout, self.loader.load(spec)).await {
                Ok(Ok(backend)) => {
                    info!(backend = %spec, "tokenizer backend loaded");
                    Some(backend)
                }
                Ok(Err(e)) => {
                    warn!(
                        backend = %spec,
                        error = %e,
                        "tokenizer backend unavailable, using approximation"
                    );
                    None
                }
                Err(_) => {
                    warn!(
                        backend = %spec,
                        timeout_secs = self.load_timeout.as_secs_f64(),
                        "tokenizer backend load timed out, using approximation"
                    );
                    None
                }
            }
        })
        .await
        .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use proptest::prelude::*;
    use tokenscope_core::ScopeError;
    use tracing_test::traced_test;

    use super::*;

    /// Counts whitespace-separated words.
    struct WordBackend;

    impl TokenBackend for WordBackend {
        fn name(&self) -> &str {
            "test:words"
        }

        fn count(&self, text: &str) -> Result<usize, ScopeError> {
            Ok(text.split_whitespace().count())
        }
    }

    struct BrokenEncoder;

    impl TokenBackend for BrokenEncoder {
        fn name(&self) -> &str {
            "test:broken"
        }

        fn count(&self, _text: &str) -> Result<usize, ScopeError> {
            Err(ScopeError::Encode {
                backend: "test:broken".into(),
                message: "unsupported input".into(),
            })
        }
    }

    enum Behavior {
        Words,
        Broken,
        Fail,
        Hang,
    }

    struct CountingLoader {
        loads: AtomicUsize,
        behavior: Behavior,
    }

    impl CountingLoader {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                behavior,
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendLoader for CountingLoader {
        async fn load(&self, _spec: &TokenizerSpec) -> Result<Arc<dyn TokenBackend>, ScopeError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            match self.behavior {
                Behavior::Words => Ok(Arc::new(WordBackend)),
                Behavior::Broken => Ok(Arc::new(BrokenEncoder)),
                Behavior::Fail => Err(ScopeError::BackendUnavailable {
                    backend: "test".into(),
                    message: "no such tokenizer".into(),
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Arc::new(WordBackend))
                }
            }
        }
    }

    fn manager(loader: Arc<CountingLoader>) -> TokenizerManager {
        TokenizerManager::new(loader, Duration::from_secs(5))
    }

    fn spec() -> TokenizerSpec {
        TokenizerSpec::hugging_face("acme/test")
    }

    #[tokio::test]
    async fn blank_content_is_zero_without_loading() {
        let loader = CountingLoader::new(Behavior::Words);
        let mgr = manager(loader.clone());
        assert_eq!(mgr.count_tokens("", &spec()).await, 0);
        assert_eq!(mgr.count_tokens("  \n\t ", &spec()).await, 0);
        assert_eq!(loader.loads(), 0);
        assert_eq!(mgr.backend_state(&spec()), BackendState::NotLoaded);
    }

    #[tokio::test]
    async fn approx_spec_never_loads() {
        let loader = CountingLoader::new(Behavior::Words);
        let mgr = manager(loader.clone());
        let text = "a".repeat(400);
        assert_eq!(mgr.count_tokens(&text, &TokenizerSpec::Approx).await, 100);
        assert_eq!(loader.loads(), 0);
    }

    #[tokio::test]
    async fn exact_backend_is_used_once_loaded() {
        let loader = CountingLoader::new(Behavior::Words);
        let mgr = manager(loader.clone());
        assert_eq!(mgr.count_tokens("one two three", &spec()).await, 3);
        assert_eq!(mgr.count_tokens("four five", &spec()).await, 2);
        assert_eq!(loader.loads(), 1);
        assert_eq!(mgr.backend_state(&spec()), BackendState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_share_one_load() {
        let loader = CountingLoader::new(Behavior::Words);
        let mgr = Arc::new(manager(loader.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move {
                mgr.count_tokens("alpha beta", &spec()).await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 2);
        }
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_load_falls_back_and_is_not_retried() {
        let loader = CountingLoader::new(Behavior::Fail);
        let mgr = manager(loader.clone());
        let text = "x".repeat(10);

        assert_eq!(mgr.count_tokens(&text, &spec()).await, 3);
        assert_eq!(mgr.count_tokens(&text, &spec()).await, 3);
        assert_eq!(loader.loads(), 1);
        assert_eq!(mgr.backend_state(&spec()), BackendState::Unavailable);
        assert!(logs_contain("tokenizer backend unavailable"));
    }

    #[tokio::test]
    #[traced_test]
    async fn encode_failure_falls_back_per_call() {
        let loader = CountingLoader::new(Behavior::Broken);
        let mgr = manager(loader.clone());

        assert_eq!(mgr.count_tokens("abcdefgh", &spec()).await, 2);
        assert_eq!(mgr.backend_state(&spec()), BackendState::Ready);
        assert!(logs_contain("token encoding failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn slow_load_times_out_to_approximation() {
        let loader = CountingLoader::new(Behavior::Hang);
        let mgr = TokenizerManager::new(loader.clone(), Duration::from_millis(50));

        assert_eq!(mgr.count_tokens("abcd", &spec()).await, 1);
        assert_eq!(mgr.backend_state(&spec()), BackendState::Unavailable);
        assert!(logs_contain("timed out"));
    }

    #[tokio::test]
    async fn count_many_preserves_order() {
        let loader = CountingLoader::new(Behavior::Words);
        let mgr = manager(loader.clone());
        let counts = mgr
            .count_many(&["one", "", "two three four"][..], &spec())
            .await;
        assert_eq!(counts, vec![1, 0, 3]);
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn specs_are_cached_independently() {
        let loader = CountingLoader::new(Behavior::Words);
        let mgr = manager(loader.clone());
        mgr.count_tokens("a b", &TokenizerSpec::hugging_face("acme/one")).await;
        mgr.count_tokens("a b", &TokenizerSpec::hugging_face("acme/two")).await;
        mgr.count_tokens("a b", &TokenizerSpec::hugging_face("acme/one")).await;
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn offline_hugging_face_miss_degrades_to_approximation() {
        let dir = tempfile::tempdir().unwrap();
        let config = TokenizerConfig {
            cache_dir: dir.path().to_string_lossy().into_owned(),
            allow_download: false,
            ..TokenizerConfig::default()
        };
        let mgr = TokenizerManager::from_config(&config);
        let text = "a".repeat(400);
        assert_eq!(mgr.count_tokens(&text, &spec()).await, 100);
    }

    #[tokio::test]
    async fn tiktoken_counts_through_the_manager() {
        let dir = tempfile::tempdir().unwrap();
        let config = TokenizerConfig {
            cache_dir: dir.path().to_string_lossy().into_owned(),
            allow_download: false,
            ..TokenizerConfig::default()
        };
        let mgr = TokenizerManager::from_config(&config);
        let spec = TokenizerSpec::tiktoken("gpt-4o");
        let n = mgr.count_tokens("Hello, world!", &spec).await;
        assert!(n > 0 && n < 10, "unexpected count {n}");
        assert_eq!(mgr.backend_state(&spec), BackendState::Ready);
    }

    proptest! {
        #[test]
        fn approx_counts_are_ceil_quarter_for_non_blank_text(s in "[a-z0-9 ]{0,40}[a-z]") {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let mgr = manager(CountingLoader::new(Behavior::Words));
            let n = rt.block_on(mgr.count_tokens(&s, &TokenizerSpec::Approx));
            prop_assert_eq!(n, s.chars().count().div_ceil(4));
        }
    }
}
