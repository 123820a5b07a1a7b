//! datafs: URL-addressed datasources behind one virtual filesystem.
//!
//! This crate provides:
//!
//! - **VFS**: the [`Filesystem`] trait, the scheme-based [`FsMux`] and the
//!   built-in backends (local files, HTTP, env, stdin, merge, memory)
//! - **Registry**: aliases for source URLs, with per-source request headers
//! - **Reader**: reads an alias (plus optional sub-path) at most once per
//!   session and reports its content type
//! - **Parsing**: JSON, YAML, TOML, env files and text into [`serde_json::Value`]
//! - **Config**: datasources declared in TOML
//!
//! ```no_run
//! # async fn demo() -> datafs::Result<()> {
//! use datafs::{Config, FsContext, Reader};
//!
//! let config: Config = r#"
//! [datasources.app]
//! url = "file:///etc/app/"
//! "#.parse().map_err(|e| datafs::Error::Config(format!("{e}")))?;
//!
//! let reader = Reader::from_config(&config)?;
//! let settings = reader.datasource(&FsContext::new(), "app", &["settings.yaml"]).await?;
//! println!("{settings}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod parse;
pub mod reader;
pub mod registry;
pub mod vfs;

pub use config::{Config, DatasourceConfig};
pub use context::FsContext;
pub use error::{Error, Result};
pub use reader::{Content, Reader};
pub use registry::{Datasource, Registry};
pub use vfs::{DirEntry, File, Filesystem, FsMux, FsProvider};

pub use datafs_url::{parse_source_url, resolve, split, SourceUrl, UrlError};
