//! Error types for source URL parsing and resolution.

/// Errors produced while parsing or resolving a source URL.
///
/// Every variant carries the offending input so multi-hop failures stay
/// diagnosable after being wrapped by callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    /// A `:` appeared before any scheme character (e.g. `:foo`).
    #[error("missing protocol scheme in {0:?}")]
    MissingScheme(String),

    /// A schemeless reference whose first path segment holds a `:`.
    #[error("first path segment in URL cannot contain colon: {0:?}")]
    ColonInFirstSegment(String),

    /// A malformed `%XX` escape.
    #[error("invalid URL escape {escape:?} in {input:?}")]
    InvalidEscape { input: String, escape: String },

    /// ASCII control characters are never valid in a source URL.
    #[error("invalid control character in URL {0:?}")]
    ControlCharacter(String),

    /// A relative reference could not be resolved against its base.
    #[error("invalid reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },
}

impl UrlError {
    pub(crate) fn invalid_reference(reference: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }
}
