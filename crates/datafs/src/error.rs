//! Error kinds for datafs.
//!
//! Filesystem traits speak `io::Result` so that any backend can plug in. The
//! typed errors below travel inside an `io::Error` when they cross that
//! boundary ([`Error::into_io`]) and come back out through
//! `From<io::Error> for Error`.

use std::io;
use std::path::PathBuf;

use datafs_url::UrlError;

/// Result alias used throughout datafs.
pub type Result<T> = std::result::Result<T, Error>;

/// All datafs failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provider is registered for the URL's scheme.
    #[error("no filesystem provider for scheme {scheme:?} (url: {url})")]
    NoProviderForScheme { scheme: String, url: String },

    /// A relative reference could not be parsed or resolved.
    #[error(transparent)]
    InvalidReference(#[from] UrlError),

    /// The alias is not registered and is not an absolute URL.
    #[error("undefined datasource {alias:?}")]
    UndefinedDatasource { alias: String },

    /// A merge reference named fewer than two sources.
    #[error("merge requires at least two sources, got {count} in {reference:?}")]
    InsufficientSources { reference: String, count: usize },

    /// A merge sub-reference could not be resolved or opened.
    #[error("merge sub-source {reference:?} is unavailable: {source}")]
    SubSourceUnavailable {
        reference: String,
        #[source]
        source: Box<Error>,
    },

    /// A merge sub-source did not parse to a map.
    #[error("can only merge maps, but {reference:?} ({content_type}) is not a map")]
    MergeRequiresMaps {
        reference: String,
        content_type: String,
    },

    #[error("file does not exist: {0}")]
    NotExist(#[source] io::Error),

    #[error("permission denied: {0}")]
    PermissionDenied(#[source] io::Error),

    #[error("invalid argument: {0}")]
    Invalid(#[source] io::Error),

    /// A write targeted a path outside the current working directory.
    #[error("refusing to write outside the working directory: {}", path.display())]
    WriteOutsideWorkingDirectory { path: PathBuf },

    /// Content could not be parsed as its content-type.
    #[error("could not parse {content_type} content: {reason}")]
    Parse { content_type: String, reason: String },

    /// Configuration could not be loaded or applied.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A datasource read failed; keeps the alias and resolved URL.
    #[error("couldn't read datasource {alias:?} ({url}): {source}")]
    Read {
        alias: String,
        url: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(io::Error),
}

impl Error {
    /// Wrap this error in an `io::Error` for use behind the filesystem traits.
    pub fn into_io(self) -> io::Error {
        let kind = match &self {
            Error::NotExist(_) | Error::UndefinedDatasource { .. } => io::ErrorKind::NotFound,
            Error::PermissionDenied(_) | Error::WriteOutsideWorkingDirectory { .. } => {
                io::ErrorKind::PermissionDenied
            }
            Error::Io(e) => e.kind(),
            Error::Cancelled => io::ErrorKind::Interrupted,
            Error::InvalidReference(_)
            | Error::InsufficientSources { .. }
            | Error::Invalid(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, self)
    }

    /// Borrow the datafs error carried inside an `io::Error`, if any.
    pub fn from_io_ref(err: &io::Error) -> Option<&Error> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Error>())
    }

    /// Peel `Read` and `SubSourceUnavailable` wrappers down to the cause.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Read { source, .. } | Error::SubSourceUnavailable { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if Error::from_io_ref(&err).is_some() {
            let kind = err.kind();
            if let Some(Ok(typed)) = err.into_inner().map(|inner| inner.downcast::<Error>()) {
                return *typed;
            }
            return Error::Io(io::Error::from(kind));
        }

        match err.kind() {
            io::ErrorKind::NotFound => Error::NotExist(err),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(err),
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => Error::Invalid(err),
            _ => Error::Io(err),
        }
    }
}
