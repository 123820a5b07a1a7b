//! Virtual filesystem layer for datafs.
//!
//! Every datasource is reached through the [`Filesystem`] trait. Backends
//! are chosen by URL scheme:
//!
//! - **WdFs** (`file`, schemeless): local files, relative to the working directory
//! - **HttpFs** (`http`, `https`): one GET per open
//! - **EnvFs** (`env`): environment variables, with `NAME_FILE` indirection
//! - **StdinFs** (`stdin`): standard input, read once
//! - **MergeFs** (`merge`): several map-shaped sources merged into one JSON document
//! - **MemoryFs** (`mem`, opt-in): in-memory storage for embedding and tests
//!
//! # Design
//!
//! ```text
//! source URL ──split──▶ (root, rel)
//!                          │
//!                          ▼
//!                 FsMux[root.scheme] ──▶ FsProvider::new_fs(root)
//!                          │                (cached per root if cacheable)
//!                          ▼
//!            decorate: context → headers → http client
//!                          │
//!                          ▼
//!                    fs.open(rel)
//! ```
//!
//! External backends (secret stores, object storage, VCS) plug in by
//! implementing [`FsProvider`] and registering with [`FsMux::register`].

mod env;
mod http;
mod local;
mod memory;
mod merge;
mod mux;
mod stdin;
mod traits;
mod wdfs;

use std::sync::Arc;

pub use env::{EnvFs, EnvProvider};
pub use http::{HttpFs, HttpProvider, HTTP_TIMEOUT_ENV};
pub use local::LocalFs;
pub use memory::{MemFile, MemoryFs, MemoryProvider};
pub use merge::{MergeFile, MergeFs, MergeProvider};
pub use mux::{FsMux, FsProvider, ProviderCache};
pub use stdin::{StdinFs, StdinProvider};
pub use traits::{
    ContextAware, DirEntry, DirEntryKind, File, Filesystem, HeaderAware, HttpClientAware,
};
pub use wdfs::{resolve_local_path, PathConvention, PathShape, WdFs, WdFsProvider};

pub(crate) use http::timeout_from_env;

use crate::config::Config;
use crate::registry::Registry;

impl FsMux {
    /// A mux with the built-in providers: `file` and schemeless (working
    /// directory), `http`/`https`, `stdin`, `env` and `merge`.
    pub fn with_defaults(registry: Arc<Registry>, config: &Config) -> Self {
        let mux = FsMux::new();
        mux.register(WdFsProvider::new());
        mux.register(HttpProvider::with_timeout(config.http_timeout()));
        mux.register(StdinProvider::new());
        mux.register(EnvProvider::new());
        mux.register(MergeProvider::new(registry));
        mux
    }
}
