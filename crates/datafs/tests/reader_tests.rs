//! Source reader behaviour end to end: caching, headers, local files.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use datafs::vfs::{HeaderAware, MemFile, MemoryFs, MemoryProvider};
use datafs::{
    Config, Datasource, DirEntry, Error, File, Filesystem, FsContext, FsMux, FsProvider, Reader,
    Registry, SourceUrl,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serves `{"n": <opens so far>}` for every name and counts opens.
/// The first `fail_first` opens fail with NotFound.
#[derive(Clone)]
struct CountingFs {
    opens: Arc<AtomicUsize>,
    fail_first: usize,
    headers: HeaderMap,
}

#[async_trait]
impl Filesystem for CountingFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;
        if n <= self.fail_first {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("flaky: {path}")));
        }
        let token = self
            .headers
            .get("x-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let body = json!({"n": n, "token": token}).to_string();
        let entry = DirEntry::file(path, 0).with_content_type(Some("application/json".into()));
        Ok(Box::new(MemFile::new(entry, body.into_bytes())))
    }

    async fn read_dir(&self, _path: &str) -> io::Result<Vec<DirEntry>> {
        Ok(Vec::new())
    }

    fn as_header_aware(&self) -> Option<&dyn HeaderAware> {
        Some(self)
    }
}

impl HeaderAware for CountingFs {
    fn with_headers(&self, headers: &HeaderMap) -> Arc<dyn Filesystem> {
        Arc::new(Self {
            headers: headers.clone(),
            ..self.clone()
        })
    }
}

struct CountingProvider {
    fs: CountingFs,
}

#[async_trait]
impl FsProvider for CountingProvider {
    fn schemes(&self) -> &[&'static str] {
        &["count"]
    }

    async fn new_fs(&self, _root: &SourceUrl, _mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        Ok(Arc::new(self.fs.clone()))
    }
}

fn counting_reader(fail_first: usize) -> (Reader, Arc<AtomicUsize>) {
    init_tracing();
    let opens = Arc::new(AtomicUsize::new(0));
    let mux = FsMux::new();
    mux.register(CountingProvider {
        fs: CountingFs {
            opens: opens.clone(),
            fail_first,
            headers: HeaderMap::new(),
        },
    });
    let reader = Reader::new(Arc::new(Registry::new()), mux);
    reader.registry().register(
        "src",
        Datasource::new(SourceUrl::parse("count:///data/").unwrap()),
    );
    (reader, opens)
}

#[tokio::test]
async fn same_alias_and_args_fetch_once() {
    let (reader, opens) = counting_reader(0);
    let ctx = FsContext::new();

    let first = reader.read(&ctx, "src", &["a.json"]).await.unwrap();
    let second = reader.read(&ctx, "src", &["a.json"]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    reader.read(&ctx, "src", &["b.json"]).await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_first_reads_share_one_fetch() {
    let (reader, opens) = counting_reader(0);
    let reader = Arc::new(reader);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let reader = reader.clone();
            tokio::spawn(async move {
                reader
                    .datasource(&FsContext::new(), "src", &["hot.json"])
                    .await
                    .unwrap()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap()["n"], 1);
    }
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let (reader, opens) = counting_reader(1);
    let ctx = FsContext::new();

    let err = reader.read(&ctx, "src", &["x.json"]).await.unwrap_err();
    assert!(matches!(err, Error::Read { .. }));
    assert!(matches!(err.root_cause(), Error::NotExist(_)));

    let value = reader.datasource(&ctx, "src", &["x.json"]).await.unwrap();
    assert_eq!(value["n"], 2);
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn registered_headers_reach_the_backend() {
    let (reader, _) = counting_reader(0);
    let registry = reader.registry();
    registry.add_extra_header(
        "secure",
        HeaderName::from_static("x-token"),
        HeaderValue::from_static("s3cret"),
    );
    registry.register(
        "secure",
        Datasource::new(SourceUrl::parse("count:///private.json").unwrap()),
    );

    let value = reader
        .datasource(&FsContext::new(), "secure", &[])
        .await
        .unwrap();
    assert_eq!(value["token"], "s3cret");
}

#[tokio::test]
async fn reachable_reports_readability() {
    let (reader, _) = counting_reader(0);
    let ctx = FsContext::new();
    assert!(reader.reachable(&ctx, "src").await);
    assert!(!reader.reachable(&ctx, "unknown").await);
}

#[tokio::test]
async fn local_files_through_default_mux() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.yaml"), "name: demo\nport: 8080\n").unwrap();
    std::fs::write(dir.path().join("flags.env"), "DEBUG=true\n").unwrap();
    std::fs::create_dir(dir.path().join("conf.d")).unwrap();
    std::fs::write(dir.path().join("conf.d/b.json"), "{}").unwrap();
    std::fs::write(dir.path().join("conf.d/a.json"), "{}").unwrap();

    let config: Config = format!(
        "[datasources.local]\nurl = \"{}/\"\n",
        dir.path().display()
    )
    .parse()
    .unwrap();
    let reader = Reader::from_config(&config).unwrap();
    let ctx = FsContext::new();

    let app = reader.datasource(&ctx, "local", &["app.yaml"]).await.unwrap();
    assert_eq!(app, json!({"name": "demo", "port": 8080}));

    let flags = reader.datasource(&ctx, "local", &["flags.env"]).await.unwrap();
    assert_eq!(flags, json!({"DEBUG": "true"}));

    let listing = reader.datasource(&ctx, "local", &["conf.d"]).await.unwrap();
    assert_eq!(listing, json!(["a.json", "b.json"]));

    let text = reader
        .include(&ctx, "local", &["app.yaml?type=text/plain"])
        .await
        .unwrap();
    assert!(text.starts_with("name: demo"));
}

#[tokio::test]
async fn literal_paths_are_auto_registered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    std::fs::write(&path, r#"{"ok": true}"#).unwrap();
    let literal = path.to_string_lossy().into_owned();

    let reader = Reader::from_config(&Config::default()).unwrap();
    let value = reader
        .datasource(&FsContext::new(), &literal, &[])
        .await
        .unwrap();
    assert_eq!(value, json!({"ok": true}));
    assert!(reader.registry().is_registered(&literal));
}

#[tokio::test]
async fn memory_backend_is_opt_in() {
    let mem = Arc::new(MemoryFs::new());
    mem.write("seed.toml", b"answer = 42\n").await.unwrap();

    let registry = Arc::new(Registry::new());
    let mux = FsMux::with_defaults(registry.clone(), &Config::default());
    assert!(mux.provider("mem").is_none());
    mux.register(MemoryProvider::new(mem));

    let reader = Reader::new(registry, mux);
    let value = reader
        .datasource(&FsContext::new(), "mem:///seed.toml", &[])
        .await
        .unwrap();
    assert_eq!(value, json!({"answer": 42}));
}
