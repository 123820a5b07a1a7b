//! `stdin:` provider.
//!
//! Standard input is read once, on first open, and shared by every
//! filesystem the provider builds. The URL path (`stdin:///in.yaml`) only
//! names the content so its extension can drive content-type sniffing.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use datafs_url::SourceUrl;
use tokio::io::AsyncReadExt;
use tokio::sync::OnceCell;

use super::memory::MemFile;
use super::mux::{FsMux, FsProvider};
use super::traits::{base_name, DirEntry, File, Filesystem};

type Content = Arc<OnceCell<Arc<[u8]>>>;

/// Standard input as a single-file filesystem.
#[derive(Debug, Clone, Default)]
pub struct StdinFs {
    content: Content,
}

impl StdinFs {
    /// Read from the process's standard input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` instead of reading standard input.
    pub fn with_content(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            content: Arc::new(OnceCell::new_with(Some(data.into()))),
        }
    }

    async fn content(&self) -> io::Result<Arc<[u8]>> {
        self.content
            .get_or_try_init(|| async {
                let mut buf = Vec::new();
                tokio::io::stdin().read_to_end(&mut buf).await?;
                Ok::<_, io::Error>(Arc::from(buf))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl Filesystem for StdinFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let data = self.content().await?;
        Ok(Box::new(MemFile::new(DirEntry::file(base_name(path), 0), data)))
    }

    async fn read_dir(&self, _path: &str) -> io::Result<Vec<DirEntry>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stdin: cannot list entries",
        ))
    }
}

/// Serves `stdin:` URLs.
#[derive(Debug, Clone, Default)]
pub struct StdinProvider {
    fs: StdinFs,
}

impl StdinProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            fs: StdinFs::with_content(data),
        }
    }
}

#[async_trait]
impl FsProvider for StdinProvider {
    fn schemes(&self) -> &[&'static str] {
        &["stdin"]
    }

    async fn new_fs(&self, _root: &SourceUrl, _mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        Ok(Arc::new(self.fs.clone()))
    }
}
