//! The `SourceUrl` data model.
//!
//! A source URL is a structural value: scheme, optional user info, host,
//! path, opaque part, raw query and fragment. Unlike a browser URL it can be
//! relative (no scheme) so that bare relative paths keep their meaning.
//!
//! ```text
//! scheme:opaque?query#fragment
//! scheme://user@host/path?query#fragment
//! relative/path?query
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::UrlError;

/// Schemes whose opaque part embeds whole source URLs. Everything after the
/// scheme is kept as written, `?` included, so each embedded URL keeps its
/// own query.
pub const EMBEDDING_SCHEMES: &[&str] = &["merge"];

/// A parsed source URL.
///
/// The path is stored decoded; `Display` re-escapes it. The opaque part and
/// the raw query are stored exactly as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SourceUrl {
    pub(crate) scheme: String,
    pub(crate) opaque: String,
    pub(crate) user: Option<String>,
    pub(crate) host: String,
    pub(crate) path: String,
    pub(crate) raw_query: String,
    pub(crate) fragment: String,
}

impl SourceUrl {
    /// Parse a URL or URL reference.
    ///
    /// Relative references (`foo/bar.json`, `../x`, `?type=y`) are accepted
    /// and produce a schemeless URL.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        if raw.chars().any(|c| c.is_ascii_control()) {
            return Err(UrlError::ControlCharacter(raw.to_string()));
        }

        let mut url = SourceUrl::default();

        let rest = match raw.split_once('#') {
            Some((rest, fragment)) => {
                url.fragment = unescape(raw, fragment)?;
                rest
            }
            None => raw,
        };

        let (scheme, rest) = split_scheme(rest)?;
        url.scheme = scheme.to_ascii_lowercase();

        if EMBEDDING_SCHEMES.contains(&url.scheme.as_str()) {
            url.opaque = rest.to_string();
            return Ok(url);
        }

        let rest = match rest.split_once('?') {
            Some((rest, query)) => {
                url.raw_query = query.to_string();
                rest
            }
            None => rest,
        };

        if !rest.starts_with('/') {
            if !url.scheme.is_empty() {
                url.opaque = rest.to_string();
                return Ok(url);
            }
            if let Some(colon) = rest.find(':')
                && rest.find('/').is_none_or(|slash| colon < slash)
            {
                return Err(UrlError::ColonInFirstSegment(raw.to_string()));
            }
        }

        let mut rest = rest;
        if (!url.scheme.is_empty() || !rest.starts_with("///")) && rest.starts_with("//") {
            let after = &rest[2..];
            let (authority, remainder) = match after.find('/') {
                Some(i) => after.split_at(i),
                None => (after, ""),
            };
            match authority.rsplit_once('@') {
                Some((user, host)) => {
                    url.user = Some(unescape(raw, user)?);
                    url.host = unescape(raw, host)?;
                }
                None => url.host = unescape(raw, authority)?,
            }
            rest = remainder;
        }

        url.path = unescape(raw, rest)?;
        Ok(url)
    }

    /// Build a URL from a scheme and a path.
    pub fn from_parts(scheme: &str, host: &str, path: &str) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            path: path.to_string(),
            ..Self::default()
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The decoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// A URL is absolute when it has a scheme.
    pub fn is_abs(&self) -> bool {
        !self.scheme.is_empty()
    }

    /// True when the URL is a bare relative reference: no scheme, no host
    /// and a path not anchored at `/`.
    pub fn is_relative_path(&self) -> bool {
        self.scheme.is_empty()
            && self.host.is_empty()
            && self.opaque.is_empty()
            && !self.path.starts_with('/')
    }

    /// The final path segment, or the opaque part when there is no path.
    pub fn file_name(&self) -> &str {
        let source = if self.path.is_empty() { &self.opaque } else { &self.path };
        source.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
    }

    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_ascii_lowercase();
        self
    }

    pub fn with_opaque(mut self, opaque: impl Into<String>) -> Self {
        self.opaque = opaque.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_raw_query(mut self, query: impl Into<String>) -> Self {
        self.raw_query = query.into();
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = fragment.into();
        self
    }

    /// The path in escaped form, as it appears in `Display`.
    pub fn escaped_path(&self) -> String {
        escape_path(&self.path)
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();

        if !self.scheme.is_empty() {
            out.push_str(&self.scheme);
            out.push(':');
        }

        if !self.opaque.is_empty() {
            out.push_str(&self.opaque);
        } else {
            if !self.scheme.is_empty() || !self.host.is_empty() || self.user.is_some() {
                if !self.host.is_empty() || !self.path.is_empty() || self.user.is_some() {
                    out.push_str("//");
                }
                if let Some(user) = &self.user {
                    out.push_str(&escape_component(user));
                    out.push('@');
                }
                out.push_str(&self.host);
            }

            let path = self.escaped_path();
            if !path.is_empty() && !path.starts_with('/') && !self.host.is_empty() {
                out.push('/');
            }
            if out.is_empty() {
                // A colon in the first segment would otherwise read as a scheme.
                let first = path.split('/').next().unwrap_or_default();
                if first.contains(':') {
                    out.push_str("./");
                }
            }
            out.push_str(&path);
        }

        if !self.raw_query.is_empty() {
            out.push('?');
            out.push_str(&self.raw_query);
        }
        if !self.fragment.is_empty() {
            out.push('#');
            out.push_str(&escape_component(&self.fragment));
        }

        f.write_str(&out)
    }
}

impl FromStr for SourceUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a datasource reference as written by a user.
///
/// Beyond [`SourceUrl::parse`]:
///
/// - `-` means standard input (`stdin:`)
/// - Windows volume paths (`C:\x`, `\\host\share\x`) become `file:` URLs
/// - schemeless absolute paths get the `file` scheme
pub fn parse_source_url(value: &str) -> Result<SourceUrl, UrlError> {
    if value == "-" {
        return SourceUrl::parse("stdin:");
    }

    let volume = volume_prefix(value);
    let value = if volume.is_some() {
        value.replace('\\', "/")
    } else {
        value.to_string()
    };

    let mut url = match volume {
        Some(Volume::Unc) => SourceUrl::parse(&format!("file:{value}"))?,
        Some(Volume::Drive) => SourceUrl::parse(&format!("file:///{value}"))?,
        None => SourceUrl::parse(&value)?,
    };

    if url.scheme.is_empty() && url.path.starts_with('/') && url.host.is_empty() {
        url.scheme = "file".to_string();
    }

    Ok(url)
}

enum Volume {
    Drive,
    Unc,
}

/// Detect a Windows volume at the start of a user-supplied path.
///
/// A one-letter "scheme" followed by a separator is a drive letter, never a
/// real URL scheme.
fn volume_prefix(value: &str) -> Option<Volume> {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return match bytes.get(2) {
            None | Some(b'/') | Some(b'\\') => Some(Volume::Drive),
            _ => None,
        };
    }
    if value.starts_with("\\\\") {
        return Some(Volume::Unc);
    }
    None
}

/// Split `scheme:rest`. A scheme is a letter followed by letters, digits,
/// `+`, `-` or `.`; anything else means there is no scheme.
fn split_scheme(raw: &str) -> Result<(&str, &str), UrlError> {
    for (i, c) in raw.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if i > 0 => {}
            ':' if i == 0 => return Err(UrlError::MissingScheme(raw.to_string())),
            ':' => return Ok((&raw[..i], &raw[i + 1..])),
            _ => return Ok(("", raw)),
        }
    }
    Ok(("", raw))
}

/// Validate `%XX` escapes and decode. `+` is left alone.
pub(crate) fn unescape(input: &str, component: &str) -> Result<String, UrlError> {
    let bytes = component.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() >= i + 3
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(UrlError::InvalidEscape {
                    input: input.to_string(),
                    escape: String::from_utf8_lossy(&bytes[i..end]).into_owned(),
                });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    if !component.contains('%') {
        return Ok(component.to_string());
    }
    urlencoding::decode(component)
        .map(|s| s.into_owned())
        .map_err(|e| UrlError::InvalidEscape {
            input: input.to_string(),
            escape: e.to_string(),
        })
}

fn escape_with(s: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if b.is_ascii_alphanumeric() || keep(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn escape_path(path: &str) -> String {
    escape_with(path, |b| b"-._~!$&'()*+,;=:@/|".contains(&b))
}

fn escape_component(s: &str) -> String {
    escape_with(s, |b| b"-._~!$&'()*+,;=:".contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_hierarchical() {
        let u = SourceUrl::parse("https://user@example.com/a/b.json?type=x#frag").unwrap();
        assert_eq!(u.scheme(), "https");
        assert_eq!(u.user(), Some("user"));
        assert_eq!(u.host(), "example.com");
        assert_eq!(u.path(), "/a/b.json");
        assert_eq!(u.raw_query(), "type=x");
        assert_eq!(u.fragment(), "frag");
    }

    #[test]
    fn parse_opaque() {
        let u = SourceUrl::parse("merge:a|b|c").unwrap();
        assert_eq!(u.scheme(), "merge");
        assert_eq!(u.opaque(), "a|b|c");
        assert_eq!(u.path(), "");
    }

    #[test]
    fn merge_references_keep_their_queries() {
        let u = SourceUrl::parse("merge:data.txt?type=application/yaml|/abs/b.json").unwrap();
        assert_eq!(u.opaque(), "data.txt?type=application/yaml|/abs/b.json");
        assert_eq!(u.raw_query(), "");
        assert_eq!(u.path(), "");
    }

    #[test]
    fn parse_relative() {
        let u = SourceUrl::parse("../foo/bar.json?type=application/json").unwrap();
        assert!(!u.is_abs());
        assert!(u.is_relative_path());
        assert_eq!(u.path(), "../foo/bar.json");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(SourceUrl::parse(":foo"), Err(UrlError::MissingScheme(_))));
        assert!(matches!(
            SourceUrl::parse("%zz"),
            Err(UrlError::InvalidEscape { .. })
        ));
        assert!(matches!(
            SourceUrl::parse("a\nb"),
            Err(UrlError::ControlCharacter(_))
        ));
    }

    #[test]
    fn decodes_path() {
        let u = SourceUrl::parse("file:///tmp/with%20space.json").unwrap();
        assert_eq!(u.path(), "/tmp/with space.json");
        assert_eq!(u.to_string(), "file:///tmp/with%20space.json");
    }

    #[rstest]
    #[case::file("file:///tmp/foo.json")]
    #[case::http("https://example.com/foo?x=1")]
    #[case::stdin("stdin:")]
    #[case::opaque("merge:a|b")]
    #[case::merge_with_queries("merge:a?type=text/plain|b?type=application/json")]
    #[case::relative("foo/bar.json")]
    #[case::git("git+https://github.com/org/repo//sub/file.yaml")]
    #[case::host_only("http://example.com")]
    fn display_round_trips(#[case] raw: &str) {
        assert_eq!(SourceUrl::parse(raw).unwrap().to_string(), raw);
    }

    #[rstest]
    #[case::dash("-", "stdin:")]
    #[case::absolute("/tmp/foo.json", "file:///tmp/foo.json")]
    #[case::relative("foo.json", "foo.json")]
    #[case::drive("C:\\tmp\\foo.json", "file:///C:/tmp/foo.json")]
    #[case::unc("\\\\host\\share\\foo.json", "file://host/share/foo.json")]
    #[case::http("https://example.com/x", "https://example.com/x")]
    fn source_url_normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse_source_url(input).unwrap().to_string(), expected);
    }

    #[test]
    fn file_name_of_path_and_opaque() {
        assert_eq!(SourceUrl::parse("file:///a/b.json").unwrap().file_name(), "b.json");
        assert_eq!(SourceUrl::parse("env:HOME").unwrap().file_name(), "HOME");
    }
}
