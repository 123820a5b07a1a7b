//! `http:` and `https:` provider.
//!
//! Each open is a single GET. The response body is buffered and served from
//! memory; the response `Content-Type` is reported in the file's metadata.
//! Requests race the caller's [`FsContext`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use datafs_url::{join, SourceUrl};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use super::memory::MemFile;
use super::mux::{FsMux, FsProvider};
use super::traits::{
    base_name, ContextAware, DirEntry, File, Filesystem, HeaderAware, HttpClientAware,
};
use crate::context::FsContext;

/// Environment variable with the request timeout in seconds.
pub const HTTP_TIMEOUT_ENV: &str = "DATAFS_HTTP_TIMEOUT";

/// Read-only filesystem over one HTTP origin.
#[derive(Debug, Clone)]
pub struct HttpFs {
    root: SourceUrl,
    client: reqwest::Client,
    headers: HeaderMap,
    ctx: FsContext,
}

impl HttpFs {
    pub fn new(root: SourceUrl, client: reqwest::Client) -> Self {
        Self {
            root,
            client,
            headers: HeaderMap::new(),
            ctx: FsContext::new(),
        }
    }

    /// The URL a relative path is fetched from.
    pub fn url_for(&self, path: &str) -> SourceUrl {
        join(&self.root, path.trim_start_matches('/'))
    }

    async fn get(&self, url: &str) -> io::Result<(Vec<u8>, Option<String>)> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(io::Error::other)?;

        let status = response.status();
        if let Some(err) = status_error(url, status) {
            return Err(err);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(io::Error::other)?;
        Ok((body.to_vec(), content_type))
    }
}

/// Map an unsuccessful status to the matching error kind.
pub(crate) fn status_error(url: &str, status: StatusCode) -> Option<io::Error> {
    if !(status.is_client_error() || status.is_server_error()) {
        return None;
    }
    let kind = match status {
        StatusCode::NOT_FOUND => io::ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => io::ErrorKind::PermissionDenied,
        _ => io::ErrorKind::InvalidInput,
    };
    Some(io::Error::new(kind, format!("{url}: HTTP {status}")))
}

#[async_trait]
impl Filesystem for HttpFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let url = self.url_for(path).to_string();
        let (body, content_type) = self.ctx.run(self.get(&url)).await?;

        let entry = DirEntry::file(base_name(path), 0).with_content_type(content_type);
        Ok(Box::new(MemFile::new(entry, body)))
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("http: cannot list {}", self.url_for(path)),
        ))
    }

    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }

    fn as_header_aware(&self) -> Option<&dyn HeaderAware> {
        Some(self)
    }

    fn as_http_client_aware(&self) -> Option<&dyn HttpClientAware> {
        Some(self)
    }
}

impl ContextAware for HttpFs {
    fn with_context(&self, ctx: &FsContext) -> Arc<dyn Filesystem> {
        Arc::new(Self {
            ctx: ctx.clone(),
            ..self.clone()
        })
    }
}

impl HeaderAware for HttpFs {
    fn with_headers(&self, headers: &HeaderMap) -> Arc<dyn Filesystem> {
        let mut merged = self.headers.clone();
        merged.extend(headers.clone());
        Arc::new(Self {
            headers: merged,
            ..self.clone()
        })
    }
}

impl HttpClientAware for HttpFs {
    fn with_http_client(&self, client: &reqwest::Client) -> Arc<dyn Filesystem> {
        Arc::new(Self {
            client: client.clone(),
            ..self.clone()
        })
    }
}

/// Serves `http:` and `https:` URLs.
///
/// Cacheable: one filesystem (and connection pool) per origin.
#[derive(Debug, Clone, Default)]
pub struct HttpProvider {
    timeout: Option<Duration>,
}

impl HttpProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Timeout from [`HTTP_TIMEOUT_ENV`], if set to a number of seconds.
    pub fn from_env() -> Self {
        Self::with_timeout(timeout_from_env())
    }
}

pub(crate) fn timeout_from_env() -> Option<Duration> {
    std::env::var(HTTP_TIMEOUT_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl FsProvider for HttpProvider {
    fn schemes(&self) -> &[&'static str] {
        &["http", "https"]
    }

    async fn new_fs(&self, root: &SourceUrl, _mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(io::Error::other)?;
        Ok(Arc::new(HttpFs::new(root.clone(), client)))
    }

    fn cacheable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    /// Serve one canned response per connection on a loopback port.
    /// The body echoes the request's `x-token` header when there is one.
    async fn serve(status: &'static str, content_type: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_lowercase();
                let token = request
                    .lines()
                    .find_map(|l| l.strip_prefix("x-token: "))
                    .map(|t| t.trim().to_string());
                let body = token.unwrap_or_else(|| body.to_string());
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    async fn http_fs(base: &str) -> Arc<dyn Filesystem> {
        let root = SourceUrl::parse(&format!("{base}/")).unwrap();
        HttpProvider::new().new_fs(&root, &FsMux::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_reports_content_type() {
        let base = serve("200 OK", "application/json; charset=utf-8", r#"{"a":1}"#).await;
        let fs = http_fs(&base).await;

        let file = fs.open("data/config").await.unwrap();
        let meta = file.stat().await.unwrap();
        assert_eq!(meta.name, "config");
        assert_eq!(meta.content_type.as_deref(), Some("application/json; charset=utf-8"));
        assert_eq!(file.read_to_end().await.unwrap(), br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_injected_headers_are_sent() {
        let base = serve("200 OK", "text/plain", "no token").await;
        let fs = http_fs(&base).await;

        let mut headers = HeaderMap::new();
        headers.insert("x-token", "abc123".parse().unwrap());
        let fs = fs.as_header_aware().unwrap().with_headers(&headers);
        assert_eq!(fs.read_file("x").await.unwrap(), b"abc123");
    }

    #[tokio::test]
    async fn test_not_found_status() {
        let base = serve("404 Not Found", "text/plain", "missing").await;
        let fs = http_fs(&base).await;

        let err = fs.open("nope.json").await.err().unwrap();
        assert!(matches!(Error::from(err), Error::NotExist(_)));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let base = serve("200 OK", "text/plain", "late").await;
        let token = CancellationToken::new();
        token.cancel();

        let fs = http_fs(&base).await;
        let fs = fs
            .as_context_aware()
            .unwrap()
            .with_context(&FsContext::with_cancel(token));
        let err = fs.open("x").await.err().unwrap();
        assert!(matches!(Error::from(err), Error::Cancelled));
    }

    #[rstest]
    #[case(StatusCode::OK, None)]
    #[case(StatusCode::NOT_MODIFIED, None)]
    #[case(StatusCode::NOT_FOUND, Some(io::ErrorKind::NotFound))]
    #[case(StatusCode::UNAUTHORIZED, Some(io::ErrorKind::PermissionDenied))]
    #[case(StatusCode::FORBIDDEN, Some(io::ErrorKind::PermissionDenied))]
    #[case(StatusCode::BAD_GATEWAY, Some(io::ErrorKind::InvalidInput))]
    fn status_mapping(#[case] status: StatusCode, #[case] kind: Option<io::ErrorKind>) {
        assert_eq!(status_error("http://x/", status).map(|e| e.kind()), kind);
    }

    #[test]
    fn test_url_for_keeps_query() {
        let root = SourceUrl::parse("https://example.com/?v=2").unwrap();
        let fs = HttpFs::new(root, reqwest::Client::new());
        assert_eq!(fs.url_for("a/b.json").to_string(), "https://example.com/a/b.json?v=2");
        assert_eq!(fs.url_for(".").to_string(), "https://example.com/?v=2");
    }
}
