//! Source reader: alias + args → content, fetched at most once.
//!
//! ```text
//! read(alias, args)
//!   ├─ cache hit ─────────────────────────────────────────────▶ Content
//!   └─ miss: registry[alias] ─resolve(args[0])─take ?type─split─▶ mux ─▶ open
//!                                                              ├─ dir  → JSON array of names
//!                                                              └─ file → bytes + content type
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use datafs_url::{parse_source_url, resolve, SourceUrl};
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::Config;
use crate::content;
use crate::context::FsContext;
use crate::error::{Error, Result};
use crate::parse::parse;
use crate::registry::{Datasource, Registry};
use crate::vfs::FsMux;

/// Bytes read from a datasource and their content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub content_type: String,
    pub data: Arc<[u8]>,
}

type ContentCell = Arc<OnceCell<Content>>;

/// Reads datasources through a mux, caching by alias and arguments.
pub struct Reader {
    registry: Arc<Registry>,
    mux: FsMux,
    cache: Mutex<HashMap<String, ContentCell>>,
}

impl Reader {
    pub fn new(registry: Arc<Registry>, mux: FsMux) -> Self {
        Self {
            registry,
            mux,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A reader over a fresh registry holding `config`'s datasources and a
    /// mux with the built-in providers.
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        config.apply(&registry)?;
        let mux = FsMux::with_defaults(registry.clone(), config);
        Ok(Self::new(registry, mux))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn mux(&self) -> &FsMux {
        &self.mux
    }

    /// Read `alias`, optionally resolving `args[0]` against its URL.
    ///
    /// Concurrent reads of the same `(alias, args)` share one fetch. Failed
    /// fetches are not cached.
    pub async fn read(&self, ctx: &FsContext, alias: &str, args: &[&str]) -> Result<Content> {
        let key = format!("{alias}{}", args.concat());
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.entry(key.clone()).or_default().clone()
        };

        if let Some(content) = cell.get() {
            debug!(%key, "datasource cache hit");
            return Ok(content.clone());
        }

        let result = cell
            .get_or_try_init(|| async {
                debug!(%key, "datasource cache miss");
                self.fetch(ctx, alias, args).await
            })
            .await
            .cloned();

        if result.is_err() {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            let stale = cache
                .get(&key)
                .is_some_and(|c| Arc::ptr_eq(c, &cell) && !c.initialized());
            if stale {
                cache.remove(&key);
            }
        }
        result
    }

    /// Read and parse `alias` into a value tree.
    pub async fn datasource(&self, ctx: &FsContext, alias: &str, args: &[&str]) -> Result<Value> {
        let content = self.read(ctx, alias, args).await?;
        parse(&content.content_type, &content.data)
    }

    /// Read `alias` as UTF-8 text without parsing.
    pub async fn include(&self, ctx: &FsContext, alias: &str, args: &[&str]) -> Result<String> {
        let content = self.read(ctx, alias, args).await?;
        String::from_utf8(content.data.to_vec()).map_err(|e| Error::Parse {
            content_type: content.content_type,
            reason: e.to_string(),
        })
    }

    /// True when `alias` is registered and can be read.
    pub async fn reachable(&self, ctx: &FsContext, alias: &str) -> bool {
        self.registry.is_registered(alias) && self.read(ctx, alias, &[]).await.is_ok()
    }

    fn source(&self, alias: &str) -> Result<Datasource> {
        if let Some(source) = self.registry.lookup(alias) {
            return Ok(source);
        }

        let undefined = || Error::UndefinedDatasource {
            alias: alias.to_string(),
        };
        let url = parse_source_url(alias).map_err(|_| undefined())?;
        if !url.is_abs() {
            return Err(undefined());
        }

        debug!(%alias, "registering literal URL as datasource");
        self.registry.register(alias, Datasource::new(url));
        self.registry.lookup(alias).ok_or_else(undefined)
    }

    async fn fetch(&self, ctx: &FsContext, alias: &str, args: &[&str]) -> Result<Content> {
        let source = self.source(alias)?;

        let arg = args.first().copied().unwrap_or_default();
        let url = resolve(&source.url, arg).map_err(|e| read_error(alias, &source.url, e.into()))?;
        let (url, hint) = url.take_query_param(&content::type_param());
        let url = with_file_scheme(url);

        self.read_url(ctx, &url, hint.as_deref(), &source.headers)
            .await
            .map_err(|e| read_error(alias, &url, e))
    }

    async fn read_url(
        &self,
        ctx: &FsContext,
        url: &SourceUrl,
        hint: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Content> {
        let (fs, rel) = self.mux.lookup_url(ctx, url, headers).await?;
        let file = fs.open(&rel).await?;

        let result: Result<Content> = async {
            let meta = file.stat().await?;
            if meta.is_dir() {
                let names: Vec<String> = fs
                    .read_dir(&rel)
                    .await?
                    .into_iter()
                    .map(|e| e.name)
                    .collect();
                let data = serde_json::to_vec(&names).map_err(|e| Error::Parse {
                    content_type: content::JSON_ARRAY.to_string(),
                    reason: e.to_string(),
                })?;
                return Ok(Content {
                    content_type: content::JSON_ARRAY.to_string(),
                    data: Arc::from(data),
                });
            }

            let data = file.read_to_end().await?;
            let content_type = content::resolve(hint, meta.content_type.as_deref(), &rel);
            Ok(Content {
                content_type,
                data: Arc::from(data),
            })
        }
        .await;

        if let Err(err) = file.close().await {
            warn!(%url, error = %err, "failed to close datasource");
        }
        result
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self
            .cache
            .lock()
            .map(|c| c.values().filter(|cell| cell.initialized()).count())
            .unwrap_or_default();
        f.debug_struct("Reader")
            .field("aliases", &self.registry.list())
            .field("cached", &cached)
            .finish()
    }
}

fn read_error(alias: &str, url: &SourceUrl, source: Error) -> Error {
    Error::Read {
        alias: alias.to_string(),
        url: url.to_string(),
        source: Box::new(source),
    }
}

/// Schemeless absolute paths (`/etc/app.json`) are local files.
pub(crate) fn with_file_scheme(url: SourceUrl) -> SourceUrl {
    if url.scheme().is_empty() && url.host().is_empty() && url.path().starts_with('/') {
        url.with_scheme("file")
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{Filesystem, MemoryFs, MemoryProvider};
    use serde_json::json;

    async fn reader(files: &[(&str, &str)]) -> Reader {
        let mem = Arc::new(MemoryFs::new());
        for (name, data) in files {
            mem.write(name, data.as_bytes()).await.unwrap();
        }
        let mux = FsMux::new();
        mux.register(MemoryProvider::new(mem));
        Reader::new(Arc::new(Registry::new()), mux)
    }

    fn register(reader: &Reader, alias: &str, url: &str) {
        reader
            .registry()
            .register(alias, Datasource::new(SourceUrl::parse(url).unwrap()));
    }

    #[tokio::test]
    async fn reads_registered_alias() {
        let reader = reader(&[("conf/app.yaml", "name: demo\n")]).await;
        register(&reader, "app", "mem:///conf/app.yaml");

        let content = reader.read(&FsContext::new(), "app", &[]).await.unwrap();
        assert_eq!(content.content_type, content::YAML);
        assert_eq!(&*content.data, b"name: demo\n");

        let value = reader.datasource(&FsContext::new(), "app", &[]).await.unwrap();
        assert_eq!(value, json!({"name": "demo"}));
    }

    #[tokio::test]
    async fn resolves_first_arg_against_alias() {
        let reader = reader(&[("conf/a.json", r#"{"a": 1}"#), ("conf/b.json", r#"{"b": 2}"#)]).await;
        register(&reader, "conf", "mem:///conf/");

        let ctx = FsContext::new();
        let a = reader.datasource(&ctx, "conf", &["a.json"]).await.unwrap();
        let b = reader.datasource(&ctx, "conf", &["b.json"]).await.unwrap();
        assert_eq!(a, json!({"a": 1}));
        assert_eq!(b, json!({"b": 2}));
    }

    #[tokio::test]
    async fn directory_reads_list_names() {
        let reader = reader(&[("dir/x.json", "{}"), ("dir/y.json", "{}")]).await;
        register(&reader, "dir", "mem:///dir/");

        let content = reader.read(&FsContext::new(), "dir", &[]).await.unwrap();
        assert_eq!(content.content_type, content::JSON_ARRAY);
        let value = reader.datasource(&FsContext::new(), "dir", &[]).await.unwrap();
        assert_eq!(value, json!(["x.json", "y.json"]));
    }

    #[tokio::test]
    async fn type_param_overrides_and_is_stripped() {
        let reader = reader(&[("data", "[1, 2]")]).await;
        register(&reader, "d", "mem:///data?type=application/array+json");

        let content = reader.read(&FsContext::new(), "d", &[]).await.unwrap();
        assert_eq!(content.content_type, content::JSON_ARRAY);
    }

    #[tokio::test]
    async fn unknown_extension_defaults_to_text() {
        let reader = reader(&[("notes", "hello")]).await;
        register(&reader, "n", "mem:///notes");

        let ctx = FsContext::new();
        assert_eq!(reader.read(&ctx, "n", &[]).await.unwrap().content_type, content::TEXT);
        assert_eq!(reader.include(&ctx, "n", &[]).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn literal_absolute_url_is_auto_registered() {
        let reader = reader(&[("x.json", r#"{"x": true}"#)]).await;
        let value = reader
            .datasource(&FsContext::new(), "mem:///x.json", &[])
            .await
            .unwrap();
        assert_eq!(value, json!({"x": true}));
        assert!(reader.registry().is_registered("mem:///x.json"));
    }

    #[tokio::test]
    async fn relative_unregistered_alias_is_undefined() {
        let reader = reader(&[]).await;
        let err = reader.read(&FsContext::new(), "nope", &[]).await.unwrap_err();
        assert!(matches!(err, Error::UndefinedDatasource { ref alias } if alias == "nope"));
        assert!(!reader.reachable(&FsContext::new(), "nope").await);
    }

    #[tokio::test]
    async fn errors_carry_alias_and_url() {
        let reader = reader(&[]).await;
        register(&reader, "gone", "mem:///missing.json");

        let err = reader.read(&FsContext::new(), "gone", &[]).await.unwrap_err();
        match &err {
            Error::Read { alias, url, .. } => {
                assert_eq!(alias, "gone");
                assert_eq!(url, "mem:///missing.json");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), Error::NotExist(_)));
    }

    #[tokio::test]
    async fn failed_reads_leave_no_cache_entry() {
        let reader = reader(&[("ok.json", "{}")]).await;
        register(&reader, "gone", "mem:///missing.json");
        register(&reader, "ok", "mem:///ok.json");
        let ctx = FsContext::new();

        for _ in 0..3 {
            assert!(reader.read(&ctx, "gone", &[]).await.is_err());
        }
        assert!(reader.cache.lock().unwrap().is_empty());

        reader.read(&ctx, "ok", &[]).await.unwrap();
        let cache = reader.cache.lock().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("ok"));
    }

    #[test]
    fn schemeless_absolute_paths_become_files() {
        let url = with_file_scheme(SourceUrl::parse("/etc/app.json").unwrap());
        assert_eq!(url.to_string(), "file:///etc/app.json");

        let rel = with_file_scheme(SourceUrl::parse("app.json").unwrap());
        assert_eq!(rel.scheme(), "");
    }
}
