//! Local filesystem backend.
//!
//! Provides access to real filesystem paths under a root (a volume root such
//! as `/`, `C:/` or `//host/share/`), with optional read-only mode. Path
//! resolution against the working directory happens one layer up, in
//! [`WdFs`](super::wdfs::WdFs).

use super::memory::MemFile;
use super::traits::{base_name, DirEntry, DirEntryKind, File, Filesystem};
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `open("src/main.rs")` reads
/// `/home/amy/project/src/main.rs`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    read_only: bool,
}

impl LocalFs {
    /// Create a new local filesystem rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a relative slash path onto the root.
    ///
    /// Validates that the path stays within the root by walking its
    /// components (no canonicalization, so symlinks are not followed here).
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let path = path.trim_start_matches('/');

        let mut normalized = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::ParentDir => {
                    if normalized == self.root {
                        return Err(io::Error::new(
                            io::ErrorKind::PermissionDenied,
                            format!("path escapes root: {path}"),
                        ));
                    }
                    normalized.pop();
                }
                Component::Normal(c) => normalized.push(c),
                Component::CurDir => {}
                // a rooted component here would discard the root on push
                Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(normalized)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self) -> io::Result<()> {
        if self.read_only {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "filesystem is read-only",
            ))
        } else {
            Ok(())
        }
    }

    /// Extract permissions from std::fs::Metadata (unix only).
    #[cfg(unix)]
    fn extract_permissions(meta: &std::fs::Metadata) -> Option<u32> {
        use std::os::unix::fs::PermissionsExt;
        Some(meta.permissions().mode())
    }

    #[cfg(not(unix))]
    fn extract_permissions(_meta: &std::fs::Metadata) -> Option<u32> {
        None
    }

    fn entry_from_meta(name: String, meta: &std::fs::Metadata) -> DirEntry {
        let kind = if meta.is_dir() {
            DirEntryKind::Directory
        } else if meta.file_type().is_symlink() {
            DirEntryKind::Symlink
        } else {
            // Special files (sockets, pipes, devices) are read like files.
            DirEntryKind::File
        };
        DirEntry {
            name,
            kind,
            size: meta.len(),
            modified: meta.modified().ok(),
            permissions: Self::extract_permissions(meta),
            content_type: None,
        }
    }
}

/// An open local file.
struct LocalFile {
    name: String,
    file: Mutex<Option<fs::File>>,
}

#[async_trait]
impl File for LocalFile {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.file.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("file already closed: {}", self.name)))?;
        file.read(buf).await
    }

    async fn stat(&self) -> io::Result<DirEntry> {
        let guard = self.file.lock().await;
        let file = guard
            .as_ref()
            .ok_or_else(|| io::Error::other(format!("file already closed: {}", self.name)))?;
        let meta = file.metadata().await?;
        Ok(LocalFs::entry_from_meta(self.name.clone(), &meta))
    }

    async fn close(&self) -> io::Result<()> {
        self.file.lock().await.take();
        Ok(())
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path).await?;
        let name = base_name(path);

        if meta.is_dir() {
            return Ok(Box::new(MemFile::directory(Self::entry_from_meta(name, &meta))));
        }

        let file = fs::File::open(&full_path).await?;
        Ok(Box::new(LocalFile {
            name,
            file: Mutex::new(Some(file)),
        }))
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path).await?;

        while let Some(entry) = dir.next_entry().await? {
            // Use symlink_metadata to detect symlinks without following them
            let metadata = fs::symlink_metadata(entry.path()).await?;
            entries.push(Self::entry_from_meta(
                entry.file_name().to_string_lossy().into_owned(),
                &metadata,
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> io::Result<DirEntry> {
        let full_path = self.resolve(path)?;
        // stat follows symlinks
        let meta = fs::metadata(&full_path).await?;
        Ok(Self::entry_from_meta(base_name(path), &meta))
    }

    async fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let full_path = self.resolve(path)?;
        fs::read(&full_path).await
    }

    async fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&full_path, data).await
    }

    async fn mkdir(&self, path: &str) -> io::Result<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        fs::create_dir_all(&full_path).await
    }

    async fn remove(&self, path: &str) -> io::Result<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path).await?;

        if meta.is_dir() {
            fs::remove_dir(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        }
    }

    async fn chmod(&self, path: &str, mode: u32) -> io::Result<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;

        #[cfg(unix)]
        let perms = {
            use std::os::unix::fs::PermissionsExt;
            std::fs::Permissions::from_mode(mode)
        };
        #[cfg(not(unix))]
        let perms = {
            let mut perms = fs::metadata(&full_path).await?.permissions();
            perms.set_readonly(mode & 0o200 == 0);
            perms
        };

        fs::set_permissions(&full_path, perms).await
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (LocalFs, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (LocalFs::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (fs, _dir) = setup().await;

        fs.write("test.txt", b"hello").await.unwrap();
        let data = fs.read_file("test.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_open_and_stream() {
        let (fs, _dir) = setup().await;
        fs.write("a/b/c.txt", b"nested").await.unwrap();

        let file = fs.open("a/b/c.txt").await.unwrap();
        let meta = file.stat().await.unwrap();
        assert_eq!(meta.name, "c.txt");
        assert_eq!(meta.size, 6);
        assert_eq!(file.read_to_end().await.unwrap(), b"nested");
        file.close().await.unwrap();

        let mut buf = [0u8; 1];
        assert!(file.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_open_directory() {
        let (fs, _dir) = setup().await;
        fs.mkdir("sub").await.unwrap();

        let file = fs.open("sub").await.unwrap();
        assert!(file.stat().await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_read_only() {
        let (_, dir) = setup().await;
        let fs = LocalFs::read_only(dir.path());

        let result = fs.write("test.txt", b"data").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_read_dir() {
        let (fs, _dir) = setup().await;

        fs.write("b.txt", b"b").await.unwrap();
        fs.write("a.txt", b"a").await.unwrap();
        fs.mkdir("subdir").await.unwrap();

        let names: Vec<_> = fs
            .read_dir(".")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "subdir"]);
    }

    #[tokio::test]
    async fn test_remove() {
        let (fs, _dir) = setup().await;

        fs.write("file.txt", b"data").await.unwrap();
        assert!(fs.exists("file.txt").await);

        fs.remove("file.txt").await.unwrap();
        assert!(!fs.exists("file.txt").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_chmod() {
        let (fs, _dir) = setup().await;
        fs.write("script.sh", b"#!/bin/sh").await.unwrap();
        fs.chmod("script.sh", 0o755).await.unwrap();

        let entry = fs.stat("script.sh").await.unwrap();
        assert_eq!(entry.permissions.unwrap() & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_path_escape_blocked() {
        let (fs, _dir) = setup().await;

        let result = fs.read_file("../../../etc/passwd").await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }
}
