//! Slash-separated path helpers.
//!
//! These operate on `/`-separated strings regardless of the host platform,
//! which is what URL paths are.

/// Lexically clean a slash-separated path.
///
/// Collapses repeated separators, drops `.` segments and folds `..` into the
/// preceding segment. A rooted path never climbs above `/`; a relative path
/// keeps its leading `..` run. An empty result is `.` (or `/` when rooted).
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ if rooted => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join path elements with `/` and clean the result. Empty elements are
/// skipped; joining nothing yields the empty string.
pub fn join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let parts: Vec<&str> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return String::new();
    }
    clean(&parts.join("/"))
}

/// Split off the leading run of `..` segments from a cleaned relative path.
///
/// Returns the number of parent hops and the remaining path.
pub(crate) fn split_parent_hops(cleaned: &str) -> (usize, &str) {
    let mut hops = 0;
    let mut rest = cleaned;
    loop {
        if rest == ".." {
            return (hops + 1, "");
        }
        match rest.strip_prefix("../") {
            Some(tail) => {
                hops += 1;
                rest = tail;
            }
            None => return (hops, rest),
        }
    }
}
