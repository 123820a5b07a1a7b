//! Resolving a relative sub-path against a base source URL.
//!
//! Generic URLs follow RFC 3986 reference resolution with two departures:
//! a relative base stays relative, and query parameters are overlaid rather
//! than replaced. git URLs and opaque-addressed URLs get their own rules.

use crate::error::UrlError;
use crate::path::{self, split_parent_hops};
use crate::query::{encode_query, query_map};
use crate::split::is_git_scheme;
use crate::url::SourceUrl;

/// Schemes whose references are opaque identifiers rather than host+path.
pub const OPAQUE_SCHEMES: &[&str] = &["aws+sm"];

/// Resolve `relative` against `base`.
///
/// An empty `relative` returns `base` unchanged.
pub fn resolve(base: &SourceUrl, relative: &str) -> Result<SourceUrl, UrlError> {
    if relative.is_empty() {
        return Ok(base.clone());
    }

    let mut base = base.clone();
    let mut relative = relative.to_string();

    if is_git_scheme(&base.scheme) {
        if base.path.contains("//") && relative.contains("//") {
            return Err(UrlError::invalid_reference(
                relative,
                "both base URL and subpath contain '//', which is not allowed in git URLs",
            ));
        }
        // git subpaths extend the repo path instead of replacing its last segment
        if !base.path.ends_with('/') {
            base.path.push('/');
        }
        // `//x` would otherwise parse as a host
        if relative.starts_with("//") {
            relative.insert(0, '.');
        }
    }

    let rel = SourceUrl::parse(&relative).map_err(|e| UrlError::invalid_reference(&relative, e))?;

    let mut out = if !base.opaque.is_empty() && !rel.is_abs() {
        resolve_opaque(&base, &rel)
    } else if OPAQUE_SCHEMES.contains(&base.scheme.as_str())
        && base.path.is_empty()
        && base.host.is_empty()
        && !rel.is_abs()
        && !relative.starts_with('/')
    {
        SourceUrl {
            opaque: rel.path.clone(),
            raw_query: rel.raw_query.clone(),
            fragment: rel.fragment.clone(),
            ..base.clone()
        }
    } else if base.is_abs() || !base.host.is_empty() || base.path.starts_with('/') {
        resolve_reference(&base, &rel)
    } else {
        resolve_relative(&base, &rel)
    };

    if !base.raw_query.is_empty() {
        let mut merged = query_map(&base.raw_query);
        for (k, values) in query_map(&rel.raw_query) {
            if let Some(first) = values.into_iter().next() {
                merged.insert(k, vec![first]);
            }
        }
        out.raw_query = encode_query(&merged);
    }

    Ok(out)
}

/// Append the relative path onto an opaque identifier.
fn resolve_opaque(base: &SourceUrl, rel: &SourceUrl) -> SourceUrl {
    let opaque = path::join([base.opaque.as_str(), rel.path.as_str()]);
    SourceUrl {
        opaque,
        raw_query: if rel.raw_query.is_empty() {
            base.raw_query.clone()
        } else {
            rel.raw_query.clone()
        },
        fragment: rel.fragment.clone(),
        ..base.clone()
    }
}

/// Resolve against a relative base, preserving its relative status.
///
/// The base is resolved as if it were rooted at `/`, then the leading `../`
/// run that cleaning the base would otherwise lose is put back.
fn resolve_relative(base: &SourceUrl, rel: &SourceUrl) -> SourceUrl {
    if rel.is_abs() || !rel.host.is_empty() || rel.path.starts_with('/') {
        return resolve_reference(base, rel);
    }

    let cleaned = path::clean(&base.path);
    let (hops, rest) = split_parent_hops(&cleaned);

    let mut stand_in_path = match rest {
        "" | "." => "/".to_string(),
        rest => format!("/{rest}"),
    };
    if base.path.ends_with('/') && !stand_in_path.ends_with('/') {
        stand_in_path.push('/');
    }
    let stand_in = base.clone().with_path(stand_in_path);

    let mut out = resolve_reference(&stand_in, rel);
    let tail = out.path.trim_start_matches('/');
    out.path = format!("{}{}", "../".repeat(hops), tail);
    if out.path.is_empty() {
        out.path = ".".to_string();
    }
    out
}

/// RFC 3986 §5.2 reference resolution.
pub(crate) fn resolve_reference(base: &SourceUrl, rel: &SourceUrl) -> SourceUrl {
    let mut url = rel.clone();
    if rel.scheme.is_empty() {
        url.scheme = base.scheme.clone();
    }

    if !rel.scheme.is_empty() || !rel.host.is_empty() || rel.user.is_some() {
        url.path = resolve_path(&rel.path, "");
        return url;
    }

    if !rel.opaque.is_empty() {
        url.user = None;
        url.host.clear();
        url.path.clear();
        return url;
    }

    if rel.path.is_empty() && rel.raw_query.is_empty() {
        url.raw_query = base.raw_query.clone();
        if rel.fragment.is_empty() {
            url.fragment = base.fragment.clone();
        }
    }

    if rel.path.is_empty() && !base.opaque.is_empty() {
        url.opaque = base.opaque.clone();
        url.user = None;
        url.host.clear();
        url.path.clear();
        return url;
    }

    url.host = base.host.clone();
    url.user = base.user.clone();
    url.path = resolve_path(&base.path, &rel.path);
    url
}

/// Merge a reference path onto a base path and remove dot segments.
///
/// The result always starts with `/` unless both inputs are empty.
fn resolve_path(base: &str, reference: &str) -> String {
    let full = if reference.is_empty() {
        base.to_string()
    } else if !reference.starts_with('/') {
        let cut = base.rfind('/').map(|i| i + 1).unwrap_or(0);
        format!("{}{}", &base[..cut], reference)
    } else {
        reference.to_string()
    };

    if full.is_empty() {
        return String::new();
    }

    let mut dst = String::from("/");
    let mut first = true;
    let mut last = "";
    let mut remaining = full.as_str();
    let mut more = true;

    while more {
        let (elem, rest) = match remaining.split_once('/') {
            Some((elem, rest)) => (elem, rest),
            None => {
                more = false;
                (remaining, "")
            }
        };
        remaining = rest;
        last = elem;

        match elem {
            "." => first = false,
            ".." => {
                let written = dst[1..].to_string();
                dst.truncate(1);
                match written.rfind('/') {
                    Some(idx) => dst.push_str(&written[..idx]),
                    None => first = true,
                }
            }
            _ => {
                if !first {
                    dst.push('/');
                }
                dst.push_str(elem);
                first = false;
            }
        }
    }

    if last == "." || last == ".." {
        dst.push('/');
    }

    if dst.len() > 1 && dst.as_bytes()[1] == b'/' {
        dst.remove(0);
    }
    dst
}
