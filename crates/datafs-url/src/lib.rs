//! datafs-url: the source URL model for datafs.
//!
//! Every datasource reference in datafs is a [`SourceUrl`], including bare
//! filesystem paths. This crate is pure (no I/O) and provides:
//!
//! - **Parsing**: [`SourceUrl::parse`] for URLs and relative references,
//!   [`parse_source_url`] for user-written datasource references
//! - **Splitting**: [`split`] a URL into a filesystem root and the relative
//!   path to open within it
//! - **Resolution**: [`resolve`] a sub-path against a base URL, with the
//!   git and opaque-identifier special cases
//!
//! ```
//! use datafs_url::{resolve, split, SourceUrl};
//!
//! let base = SourceUrl::parse("https://example.com/configs/").unwrap();
//! let url = resolve(&base, "app.json?type=application/json").unwrap();
//! let (root, rel) = split(&url);
//! assert_eq!(root.host(), "example.com");
//! assert_eq!(rel, "configs/app.json");
//! ```

mod error;
pub mod path;
mod query;
mod resolve;
mod split;
mod url;

pub use error::UrlError;
pub use query::{encode_query, parse_query, query_map};
pub use resolve::{resolve, OPAQUE_SCHEMES};
pub use split::{is_git_scheme, join, split, GIT_SCHEMES};
pub use url::{parse_source_url, SourceUrl, EMBEDDING_SCHEMES};
