//! Content types and how they are determined.
//!
//! Precedence, highest first: an explicit type-override query parameter, the
//! content-type reported by the backend, the file extension, `text/plain`.

use std::env;

/// Environment variable naming the type-override query parameter.
pub const TYPE_PARAM_ENV: &str = "DATAFS_TYPE_PARAM";

/// Default type-override query parameter name.
pub const DEFAULT_TYPE_PARAM: &str = "type";

pub const JSON: &str = "application/json";
pub const JSON_ARRAY: &str = "application/array+json";
pub const YAML: &str = "application/yaml";
pub const TOML: &str = "application/toml";
pub const ENV: &str = "application/x-env";
pub const TEXT: &str = "text/plain";

/// The type-override parameter name, honouring [`TYPE_PARAM_ENV`].
pub fn type_param() -> String {
    env::var(TYPE_PARAM_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_TYPE_PARAM.to_string())
}

/// Guess a content type from a file name's extension.
pub fn from_extension(name: &str) -> Option<&'static str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    let (_, ext) = file.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "json" => Some(JSON),
        "yaml" | "yml" => Some(YAML),
        "toml" => Some(TOML),
        "env" => Some(ENV),
        "txt" | "text" => Some(TEXT),
        _ => None,
    }
}

/// Strip parameters (`; charset=utf-8`) and normalise aliases.
pub fn normalize(content_type: &str) -> String {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "text/json" => JSON.to_string(),
        "text/yaml" | "application/x-yaml" | "text/x-yaml" => YAML.to_string(),
        "text/toml" | "application/x-toml" => TOML.to_string(),
        _ => base,
    }
}

/// Pick the effective content type.
///
/// `hint` is the type-override value, `reported` is whatever the backend's
/// metadata says, `name` is used for extension sniffing.
pub fn resolve(hint: Option<&str>, reported: Option<&str>, name: &str) -> String {
    if let Some(hint) = hint.filter(|h| !h.is_empty()) {
        return normalize(hint);
    }
    if let Some(reported) = reported.filter(|r| !r.is_empty()) {
        let normalized = normalize(reported);
        // generic binary/text types say nothing; prefer the extension
        let generic = normalized == "application/octet-stream" || normalized == TEXT;
        if !generic {
            return normalized;
        }
        return from_extension(name)
            .map(str::to_string)
            .unwrap_or(normalized);
    }
    from_extension(name).unwrap_or(TEXT).to_string()
}
