//! Core VFS traits and types.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use crate::context::FsContext;

/// Kind of directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    File,
    Directory,
    Symlink,
}

/// A directory entry: the unified file metadata type.
///
/// Returned by `Filesystem::stat`, `Filesystem::read_dir` and `File::stat`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    /// Kind of entry.
    pub kind: DirEntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if available.
    pub modified: Option<SystemTime>,
    /// Unix permissions (e.g., 0o644), if available.
    pub permissions: Option<u32>,
    /// Content type reported by the backend (e.g. an HTTP `Content-Type`).
    pub content_type: Option<String>,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::Directory,
            size: 0,
            modified: None,
            permissions: None,
            content_type: None,
        }
    }

    /// Create a new file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::File,
            size,
            modified: None,
            permissions: None,
            content_type: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.kind == DirEntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == DirEntryKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == DirEntryKind::Symlink
    }
}

/// An open file.
///
/// Methods take `&self` so one handle can be shared between tasks;
/// implementations keep their cursor behind a lock.
#[async_trait]
pub trait File: Send + Sync {
    /// Read up to `buf.len()` bytes at the cursor. `Ok(0)` means EOF.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Metadata for the open file.
    async fn stat(&self) -> io::Result<DirEntry>;

    /// Release the file. Reads after close fail.
    async fn close(&self) -> io::Result<()>;

    /// Read from the cursor to EOF.
    async fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; 8192];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }
}

/// Abstract filesystem interface.
///
/// Paths are `/`-separated and relative to the filesystem root, as produced
/// by [`datafs_url::split`]. `.` names the root itself.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Open a file or directory for reading.
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>>;

    /// List entries in a directory, sorted by name.
    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    /// Get metadata for a file or directory.
    async fn stat(&self, path: &str) -> io::Result<DirEntry> {
        let file = self.open(path).await?;
        let entry = file.stat().await;
        // Explicitly ignored: stat already has what it needs
        let _ = file.close().await;
        entry
    }

    /// Open, read fully and close.
    async fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let file = self.open(path).await?;
        let data = file.read_to_end().await;
        let _ = file.close().await;
        data
    }

    /// Write data to a file, creating it if it doesn't exist.
    ///
    /// Returns `Err` if the filesystem is read-only.
    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let _ = (path, data);
        Err(read_only_error())
    }

    /// Create a directory (and parent directories if needed).
    async fn mkdir(&self, path: &str) -> io::Result<()> {
        let _ = path;
        Err(read_only_error())
    }

    /// Remove a file or empty directory.
    async fn remove(&self, path: &str) -> io::Result<()> {
        let _ = path;
        Err(read_only_error())
    }

    /// Change permission bits.
    async fn chmod(&self, path: &str, mode: u32) -> io::Result<()> {
        let _ = (path, mode);
        Err(read_only_error())
    }

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool {
        true
    }

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Capability query: execution context injection.
    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        None
    }

    /// Capability query: per-datasource header injection.
    fn as_header_aware(&self) -> Option<&dyn HeaderAware> {
        None
    }

    /// Capability query: custom HTTP client injection.
    fn as_http_client_aware(&self) -> Option<&dyn HttpClientAware> {
        None
    }
}

/// A filesystem that can be bound to a caller's execution context.
pub trait ContextAware {
    /// A copy of this filesystem that honours `ctx`.
    fn with_context(&self, ctx: &FsContext) -> Arc<dyn Filesystem>;
}

/// A filesystem that sends per-datasource headers.
pub trait HeaderAware {
    /// A copy of this filesystem that adds `headers` to its requests.
    fn with_headers(&self, headers: &HeaderMap) -> Arc<dyn Filesystem>;
}

/// A filesystem that talks HTTP through an injectable client.
pub trait HttpClientAware {
    /// A copy of this filesystem using `client`.
    fn with_http_client(&self, client: &reqwest::Client) -> Arc<dyn Filesystem>;
}

fn read_only_error() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "filesystem is read-only")
}

pub(crate) fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("not found: {path}"))
}

/// The final segment of a slash path, `.` for the root.
pub(crate) fn base_name(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => ".".to_string(),
    }
}
