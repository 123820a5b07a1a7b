//! Query-string helpers.
//!
//! Two decodings coexist here. Form decoding (`+` is a space) is used for
//! general parameters. Type-override values are decoded literally so that
//! `application/array+json` survives unescaped.

use std::collections::BTreeMap;

use crate::url::SourceUrl;

/// Decode a query string into ordered `(key, value)` pairs using form rules.
pub fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (form_decode(k), form_decode(v))
        })
        .collect()
}

/// Encode parameters the way a form encoder does, with keys sorted.
pub fn encode_query(params: &BTreeMap<String, Vec<String>>) -> String {
    let mut out = Vec::new();
    for (k, values) in params {
        for v in values {
            out.push(format!("{}={}", form_encode(k), form_encode(v)));
        }
    }
    out.join("&")
}

/// Collect parameters into a multi-map.
pub fn query_map(raw: &str) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in parse_query(raw) {
        map.entry(k).or_default().push(v);
    }
    map
}

fn form_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    literal_decode(&spaced)
}

fn literal_decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

fn form_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b' ' => out.push('+'),
            b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ if b.is_ascii_alphanumeric() => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

impl SourceUrl {
    /// All parameters, form-decoded, in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        parse_query(&self.raw_query)
    }

    /// First value of a form-decoded parameter.
    pub fn query_get(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Remove every occurrence of parameter `name` from the query.
    ///
    /// Returns the URL without the parameter and the first removed value,
    /// decoded literally (`+` stays `+`). The remaining parameters keep
    /// their original spelling and order.
    pub fn take_query_param(&self, name: &str) -> (SourceUrl, Option<String>) {
        let mut taken = None;
        let mut kept = Vec::new();

        for pair in self.raw_query.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if form_decode(k) == name {
                if taken.is_none() {
                    taken = Some(literal_decode(v));
                }
            } else {
                kept.push(pair);
            }
        }

        let url = self.clone().with_raw_query(kept.join("&"));
        (url, taken)
    }
}
