//! Splitting a source URL into a filesystem root and a relative path.
//!
//! The root selects (and keys the construction of) a filesystem; the
//! relative path is what gets passed to that filesystem's `open`.

use crate::url::SourceUrl;

/// Schemes whose paths carry a `repo//path/in/repo` separator.
pub const GIT_SCHEMES: &[&str] = &["git", "git+file", "git+http", "git+https", "git+ssh"];

/// True for the git scheme family.
pub fn is_git_scheme(scheme: &str) -> bool {
    GIT_SCHEMES.contains(&scheme)
}

/// Split `url` into `(root, relative_path)`.
///
/// - git family: the path is cut at the first `//`. The repo part stays in
///   the root; the remainder is the in-repo path (`.` when absent).
/// - everything else: the path, trimmed of leading and trailing `/`, becomes
///   the relative path and the root path is reset to `/`. A URL with only an
///   opaque part moves it into the relative path.
///
/// The relative path is never empty; the repository or filesystem root is `.`.
pub fn split(url: &SourceUrl) -> (SourceUrl, String) {
    let mut root = url.clone();

    if is_git_scheme(&root.scheme) {
        let (repo, sub) = match root.path.split_once("//") {
            Some((repo, sub)) => (repo.to_string(), sub.to_string()),
            None => (root.path.clone(), String::new()),
        };
        root.path = repo;
        let rel = if sub.is_empty() { ".".to_string() } else { sub };
        return (root, rel);
    }

    let mut rel = root.path.trim_matches('/').to_string();
    if rel.is_empty() && !root.opaque.is_empty() {
        rel = std::mem::take(&mut root.opaque);
    }
    if rel.is_empty() {
        rel = ".".to_string();
    }
    root.path = "/".to_string();

    (root, rel)
}

/// Rejoin a root and relative path produced by [`split`].
///
/// Schemeless roots rejoin as relative paths; git roots rejoin with the `//`
/// separator; every other scheme rejoins hierarchically (an opaque
/// `env:HOME` comes back as the equivalent `env:///HOME`).
pub fn join(root: &SourceUrl, rel: &str) -> SourceUrl {
    let mut url = root.clone();
    let rel = if rel == "." { "" } else { rel };

    if is_git_scheme(&root.scheme) {
        if !rel.is_empty() {
            url.path = format!("{}//{}", root.path, rel);
        }
        return url;
    }

    url.path = if root.scheme.is_empty() && root.host.is_empty() {
        if rel.is_empty() { ".".to_string() } else { rel.to_string() }
    } else {
        format!("/{rel}")
    };
    url
}
