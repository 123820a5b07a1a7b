//! In-memory filesystem implementation.
//!
//! Served under the `mem` scheme for embedding and tests. All data is
//! ephemeral. [`MemFile`] is also the open-file type for every backend that
//! materializes its content up front (env, stdin, http).

use super::mux::{FsMux, FsProvider};
use super::traits::{base_name, not_found, DirEntry, File, Filesystem};
use async_trait::async_trait;
use datafs_url::{path, SourceUrl};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::RwLock;

/// An open file over bytes held in memory.
pub struct MemFile {
    entry: DirEntry,
    data: Arc<[u8]>,
    cursor: Mutex<Cursor>,
}

#[derive(Default)]
struct Cursor {
    pos: usize,
    closed: bool,
}

impl MemFile {
    /// A readable file. `entry.size` is set from the data.
    pub fn new(entry: DirEntry, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let entry = DirEntry {
            size: data.len() as u64,
            ..entry
        };
        Self {
            entry,
            data,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// A directory handle; reads return EOF immediately.
    pub fn directory(entry: DirEntry) -> Self {
        Self {
            entry,
            data: Arc::from(Vec::new()),
            cursor: Mutex::new(Cursor::default()),
        }
    }
}

#[async_trait]
impl File for MemFile {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        if cursor.closed {
            return Err(io::Error::other(format!("file already closed: {}", self.entry.name)));
        }
        let remaining = self.data.len().saturating_sub(cursor.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.data[cursor.pos..cursor.pos + n]);
        cursor.pos += n;
        Ok(n)
    }

    async fn stat(&self) -> io::Result<DirEntry> {
        Ok(self.entry.clone())
    }

    async fn close(&self) -> io::Result<()> {
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        cursor.closed = true;
        Ok(())
    }
}

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Arc<[u8]>, modified: SystemTime },
    Directory { modified: SystemTime },
}

/// In-memory filesystem.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryFs {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            String::new(),
            Entry::Directory {
                modified: SystemTime::now(),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Normalize a path: drop leading `/`, resolve `.` and `..`. Root is `""`.
    fn normalize(p: &str) -> String {
        let cleaned = path::clean(&format!("/{p}"));
        cleaned.trim_start_matches('/').to_string()
    }

    fn parent_of(p: &str) -> &str {
        p.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }

    fn entry_for(name: &str, entry: &Entry) -> DirEntry {
        match entry {
            Entry::File { data, modified } => {
                DirEntry::file(name, data.len() as u64).with_modified(Some(*modified))
            }
            Entry::Directory { modified } => {
                DirEntry::directory(name).with_modified(Some(*modified))
            }
        }
    }
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn open(&self, p: &str) -> io::Result<Box<dyn File>> {
        let normalized = Self::normalize(p);
        let entries = self.entries.read().await;

        let entry = entries.get(&normalized).ok_or_else(|| not_found(p))?;
        let meta = Self::entry_for(&base_name(p), entry);
        match entry {
            Entry::File { data, .. } => Ok(Box::new(MemFile::new(meta, data.clone()))),
            Entry::Directory { .. } => Ok(Box::new(MemFile::directory(meta))),
        }
    }

    async fn read_dir(&self, p: &str) -> io::Result<Vec<DirEntry>> {
        let normalized = Self::normalize(p);
        let entries = self.entries.read().await;

        // Verify the path is a directory
        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(Entry::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("not a directory: {p}"),
                ))
            }
            None => return Err(not_found(p)),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(entry_path, _)| {
                !entry_path.is_empty()
                    && *entry_path != &normalized
                    && Self::parent_of(entry_path) == normalized
            })
            .map(|(entry_path, entry)| Self::entry_for(&base_name(entry_path), entry))
            .collect();

        // Sort for consistent ordering
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn write(&self, p: &str, data: &[u8]) -> io::Result<()> {
        let normalized = Self::normalize(p);
        if normalized.is_empty() {
            return Err(io::Error::new(io::ErrorKind::IsADirectory, "is a directory: /"));
        }

        let mut entries = self.entries.write().await;

        // Check we're not overwriting a directory
        if let Some(Entry::Directory { .. }) = entries.get(&normalized) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {p}"),
            ));
        }

        // Ensure parent directories exist
        let mut current = String::new();
        for segment in Self::parent_of(&normalized).split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            entries.entry(current.clone()).or_insert(Entry::Directory {
                modified: SystemTime::now(),
            });
        }

        entries.insert(
            normalized,
            Entry::File {
                data: Arc::from(data),
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn mkdir(&self, p: &str) -> io::Result<()> {
        let normalized = Self::normalize(p);
        let mut entries = self.entries.write().await;

        let mut current = String::new();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            match entries.get(&current) {
                Some(Entry::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotADirectory,
                        format!("not a directory: {current}"),
                    ))
                }
                Some(Entry::Directory { .. }) => {}
                None => {
                    entries.insert(
                        current.clone(),
                        Entry::Directory {
                            modified: SystemTime::now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, p: &str) -> io::Result<()> {
        let normalized = Self::normalize(p);
        let mut entries = self.entries.write().await;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {
                let has_children = entries
                    .keys()
                    .any(|k| !k.is_empty() && k != &normalized && Self::parent_of(k) == normalized);
                if has_children {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("directory not empty: {p}"),
                    ));
                }
            }
            Some(Entry::File { .. }) => {}
            None => return Err(not_found(p)),
        }

        entries.remove(&normalized);
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }
}

/// Serves one shared [`MemoryFs`] under the `mem` scheme.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    fs: Arc<MemoryFs>,
}

impl MemoryProvider {
    pub fn new(fs: Arc<MemoryFs>) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &Arc<MemoryFs> {
        &self.fs
    }
}

#[async_trait]
impl FsProvider for MemoryProvider {
    fn schemes(&self) -> &[&'static str] {
        &["mem"]
    }

    async fn new_fs(&self, _root: &SourceUrl, _mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        Ok(self.fs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryFs::new();
        fs.write("test.txt", b"hello").await.unwrap();
        let data = fs.read_file("test.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_nested_write_creates_parents() {
        let fs = MemoryFs::new();
        fs.write("a/b/c.txt", b"nested").await.unwrap();

        assert!(fs.stat("a").await.unwrap().is_dir());
        assert!(fs.stat("a/b").await.unwrap().is_dir());
        assert_eq!(fs.read_file("/a/b/c.txt").await.unwrap(), b"nested");
    }

    #[tokio::test]
    async fn test_read_dir_sorted() {
        let fs = MemoryFs::new();
        fs.write("b.txt", b"b").await.unwrap();
        fs.write("a.txt", b"a").await.unwrap();
        fs.mkdir("sub").await.unwrap();
        fs.write("sub/inner.txt", b"x").await.unwrap();

        let names: Vec<_> = fs
            .read_dir(".")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }

    #[tokio::test]
    async fn test_chunked_read() {
        let fs = MemoryFs::new();
        fs.write("data", b"0123456789").await.unwrap();
        let file = fs.open("data").await.unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(file.read_to_end().await.unwrap(), b"456789");
        assert_eq!(file.read(&mut buf).await.unwrap(), 0);

        file.close().await.unwrap();
        assert!(file.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_remove() {
        let fs = MemoryFs::new();
        fs.write("dir/file.txt", b"data").await.unwrap();

        let err = fs.remove("dir").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::DirectoryNotEmpty);

        fs.remove("dir/file.txt").await.unwrap();
        fs.remove("dir").await.unwrap();
        assert!(!fs.exists("dir").await);
    }

    #[tokio::test]
    async fn test_not_found() {
        let fs = MemoryFs::new();
        let err = fs.open("missing").await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cannot_write_over_directory() {
        let fs = MemoryFs::new();
        fs.mkdir("d").await.unwrap();
        let err = fs.write("d", b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::IsADirectory);
    }
}
