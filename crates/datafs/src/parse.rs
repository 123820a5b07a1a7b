//! Structured parsing of datasource content.
//!
//! Everything parses into a [`serde_json::Value`] so callers (and the merge
//! filesystem) handle one tree type regardless of the source format.

use serde_json::{Map, Value};

use crate::content;
use crate::error::{Error, Result};

/// Parse `data` according to `content_type`.
///
/// Unknown content types parse as plain text.
pub fn parse(content_type: &str, data: &[u8]) -> Result<Value> {
    let content_type = content::normalize(content_type);
    let fail = |reason: String| Error::Parse {
        content_type: content_type.clone(),
        reason,
    };

    match content_type.as_str() {
        content::JSON => serde_json::from_slice(data).map_err(|e| fail(e.to_string())),
        content::JSON_ARRAY => {
            let value: Value = serde_json::from_slice(data).map_err(|e| fail(e.to_string()))?;
            if value.is_array() {
                Ok(value)
            } else {
                Err(fail("expected a JSON array".to_string()))
            }
        }
        content::YAML => {
            // An empty YAML document is null; treat it as an empty map.
            if data.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Object(Map::new()));
            }
            serde_yaml::from_slice(data).map_err(|e| fail(e.to_string()))
        }
        content::TOML => {
            let text = utf8(data).map_err(fail)?;
            toml::from_str(text).map_err(|e| fail(e.to_string()))
        }
        content::ENV => {
            let text = utf8(data).map_err(fail)?;
            parse_env(text).map(Value::Object).map_err(fail)
        }
        _ => utf8(data).map(|s| Value::String(s.to_string())).map_err(fail),
    }
}

fn utf8(data: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(data).map_err(|e| e.to_string())
}

/// Parse `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// and values may be wrapped in single or double quotes.
fn parse_env(text: &str) -> std::result::Result<Map<String, Value>, String> {
    let mut vars = Map::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {}: expected KEY=VALUE", lineno + 1))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("line {}: empty key", lineno + 1));
        }
        vars.insert(key.to_string(), Value::String(unquote(value.trim()).to_string()));
    }
    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
