//! Provider multiplexer: scheme → filesystem.
//!
//! The mux holds one [`FsProvider`] per URL scheme. Given a filesystem root
//! URL it builds (or reuses) the matching filesystem, then decorates it with
//! the caller's execution context, per-datasource headers and the configured
//! HTTP client. Each step runs only for filesystems that declare the capability.
//!
//! ```text
//! url ──split──▶ (root, rel) ──provider[scheme]──▶ fs ──decorate──▶ fs.open(rel)
//!                                  │
//!                                  └── cacheable? ProviderCache (once per root)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use datafs_url::{split, SourceUrl};
use reqwest::header::HeaderMap;
use tokio::sync::OnceCell;
use tracing::debug;

use super::traits::Filesystem;
use crate::context::FsContext;
use crate::error::{Error, Result};

/// A scheme-specific filesystem constructor.
#[async_trait]
pub trait FsProvider: Send + Sync {
    /// Schemes served by this provider. `""` serves schemeless URLs.
    fn schemes(&self) -> &[&'static str];

    /// Build a filesystem for `root`.
    ///
    /// `mux` is the multiplexer doing the lookup, for providers (like merge)
    /// that open other sources.
    async fn new_fs(&self, root: &SourceUrl, mux: &FsMux) -> io::Result<Arc<dyn Filesystem>>;

    /// Whether one filesystem per root URL may be built once and reused.
    fn cacheable(&self) -> bool {
        false
    }
}

type FsCell = Arc<OnceCell<Arc<dyn Filesystem>>>;

/// Construct-once cache for cacheable providers.
///
/// Each key gets its own initialization cell, so concurrent first lookups of
/// the same root wait for one construction while different roots proceed
/// independently. A failed construction leaves the cell empty.
#[derive(Default)]
pub struct ProviderCache {
    cells: Mutex<HashMap<String, FsCell>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached filesystem for `key`, building it with `init` once.
    pub async fn get_or_try_init<F, Fut>(&self, key: &str, init: F) -> io::Result<Arc<dyn Filesystem>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = io::Result<Arc<dyn Filesystem>>>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            cells.entry(key.to_string()).or_default().clone()
        };
        cell.get_or_try_init(init).await.cloned()
    }

    /// Number of filesystems built so far.
    pub fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        cells.values().filter(|c| c.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct MuxInner {
    providers: RwLock<HashMap<String, Arc<dyn FsProvider>>>,
    cache: ProviderCache,
    http_client: Option<reqwest::Client>,
}

/// Registry of filesystem providers keyed by scheme.
///
/// Cheap to clone; clones share providers and the construction cache.
#[derive(Clone)]
pub struct FsMux {
    inner: Arc<MuxInner>,
}

impl Default for FsMux {
    fn default() -> Self {
        Self::new()
    }
}

impl FsMux {
    /// Create a mux with no providers.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a mux whose HTTP-capable filesystems use `client`.
    pub fn with_http_client(client: reqwest::Client) -> Self {
        Self::build(Some(client))
    }

    fn build(http_client: Option<reqwest::Client>) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                providers: RwLock::new(HashMap::new()),
                cache: ProviderCache::new(),
                http_client,
            }),
        }
    }

    /// Register a provider for all of its schemes, replacing earlier ones.
    pub fn register(&self, provider: impl FsProvider + 'static) {
        self.register_arc(Arc::new(provider));
    }

    /// Register a provider that's already in an Arc.
    pub fn register_arc(&self, provider: Arc<dyn FsProvider>) {
        let mut providers = self.inner.providers.write().unwrap_or_else(|e| e.into_inner());
        for scheme in provider.schemes() {
            providers.insert((*scheme).to_string(), provider.clone());
        }
    }

    /// Look up the provider for a scheme.
    pub fn provider(&self, scheme: &str) -> Option<Arc<dyn FsProvider>> {
        let providers = self.inner.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.get(scheme).cloned()
    }

    /// All registered schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let providers = self.inner.providers.read().unwrap_or_else(|e| e.into_inner());
        let mut schemes: Vec<_> = providers.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// The construction cache (exposed for diagnostics).
    pub fn cache(&self) -> &ProviderCache {
        &self.inner.cache
    }

    /// Build or reuse the filesystem for a root URL and decorate it.
    pub async fn lookup(
        &self,
        ctx: &FsContext,
        root: &SourceUrl,
        headers: &HeaderMap,
    ) -> Result<Arc<dyn Filesystem>> {
        let provider = self
            .provider(root.scheme())
            .ok_or_else(|| Error::NoProviderForScheme {
                scheme: root.scheme().to_string(),
                url: root.to_string(),
            })?;

        let fs = if provider.cacheable() {
            let key = root.to_string();
            self.inner
                .cache
                .get_or_try_init(&key, || async {
                    debug!(root = %key, "constructing cached filesystem");
                    provider.new_fs(root, self).await
                })
                .await?
        } else {
            provider.new_fs(root, self).await?
        };

        Ok(self.decorate(fs, ctx, headers))
    }

    /// Split `url`, look up its filesystem and return it with the relative
    /// path to open.
    pub async fn lookup_url(
        &self,
        ctx: &FsContext,
        url: &SourceUrl,
        headers: &HeaderMap,
    ) -> Result<(Arc<dyn Filesystem>, String)> {
        let (root, rel) = split(url);
        let fs = self.lookup(ctx, &root, headers).await?;
        Ok((fs, rel))
    }

    fn decorate(
        &self,
        fs: Arc<dyn Filesystem>,
        ctx: &FsContext,
        headers: &HeaderMap,
    ) -> Arc<dyn Filesystem> {
        let with_ctx = fs.as_context_aware().map(|c| c.with_context(ctx));
        let fs = with_ctx.unwrap_or(fs);

        let fs = if headers.is_empty() {
            fs
        } else {
            let with_headers = fs.as_header_aware().map(|h| h.with_headers(headers));
            with_headers.unwrap_or(fs)
        };

        match &self.inner.http_client {
            Some(client) => {
                let with_client = fs.as_http_client_aware().map(|h| h.with_http_client(client));
                with_client.unwrap_or(fs)
            }
            None => fs,
        }
    }
}

impl fmt::Debug for FsMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsMux")
            .field("schemes", &self.schemes())
            .field("cached", &self.inner.cache.len())
            .finish()
    }
}
