//! `env:` provider: environment variables as files.
//!
//! `env:NAME` and `env:///NAME` both read `$NAME`. When it is unset or empty
//! and `$NAME_FILE` names a file, that file's contents are read instead.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use datafs_url::SourceUrl;

use super::memory::MemFile;
use super::mux::{FsMux, FsProvider};
use super::traits::{not_found, DirEntry, File, Filesystem};

/// Read-only view of the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvFs {
    /// Fixed variables used instead of the process environment.
    vars: Option<Arc<HashMap<String, String>>>,
}

impl EnvFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A filesystem over a fixed set of variables.
    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self {
            vars: Some(Arc::new(vars)),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        let value = match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    async fn value(&self, name: &str) -> io::Result<Vec<u8>> {
        if let Some(value) = self.var(name) {
            return Ok(value.into_bytes());
        }
        if let Some(file) = self.var(&format!("{name}_FILE")) {
            return tokio::fs::read(&file).await;
        }
        Err(not_found(name))
    }
}

#[async_trait]
impl Filesystem for EnvFs {
    async fn open(&self, path: &str) -> io::Result<Box<dyn File>> {
        let name = path.trim_matches('/');
        if name.is_empty() || name == "." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "env: a variable name is required",
            ));
        }

        let data = self.value(name).await?;
        Ok(Box::new(MemFile::new(DirEntry::file(name, 0), data)))
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("env: cannot list {path}"),
        ))
    }
}

/// Serves `env:` URLs.
#[derive(Debug, Clone, Default)]
pub struct EnvProvider {
    fs: EnvFs,
}

impl EnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars(vars: HashMap<String, String>) -> Self {
        Self {
            fs: EnvFs::with_vars(vars),
        }
    }
}

#[async_trait]
impl FsProvider for EnvProvider {
    fn schemes(&self) -> &[&'static str] {
        &["env"]
    }

    async fn new_fs(&self, _root: &SourceUrl, _mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        Ok(Arc::new(self.fs.clone()))
    }
}
