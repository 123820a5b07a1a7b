//! Datasource configuration.
//!
//! ```toml
//! http_timeout_secs = 30
//!
//! [datasources.app]
//! url = "file:///etc/app/config.yaml"
//!
//! [datasources.api]
//! url = "https://api.example.com/v1/"
//! headers = { Authorization = "Bearer xyz" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use datafs_url::parse_source_url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::registry::{Datasource, Registry};
use crate::vfs::timeout_from_env;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Datasources by alias.
    #[serde(default)]
    pub datasources: BTreeMap<String, DatasourceConfig>,

    /// Timeout for HTTP datasource requests, in seconds.
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

/// One `[datasources.<alias>]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceConfig {
    pub url: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        content
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Apply overrides from the environment (`DATAFS_HTTP_TIMEOUT`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout) = timeout_from_env() {
            self.http_timeout_secs = Some(timeout.as_secs());
        }
        self
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    /// Register every configured datasource.
    pub fn apply(&self, registry: &Registry) -> crate::Result<()> {
        for (alias, ds) in &self.datasources {
            let url = parse_source_url(&ds.url)
                .map_err(|e| Error::Config(format!("datasource {alias:?}: {e}")))?;

            let mut headers = HeaderMap::new();
            for (name, value) in &ds.headers {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::Config(format!("datasource {alias:?} header {name:?}: {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("datasource {alias:?} header {name}: {e}")))?;
                headers.append(name, value);
            }

            registry.register(alias.clone(), Datasource::new(url).with_headers(headers));
        }
        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.datasources.is_empty());
        assert!(config.http_timeout().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
http_timeout_secs = 10

[datasources.app]
url = "/etc/app/config.yaml"

[datasources.api]
url = "https://api.example.com/v1/"
headers = { Authorization = "Bearer xyz", Accept = "application/json" }
"#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.http_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.datasources.len(), 2);
        assert_eq!(config.datasources["api"].headers["Authorization"], "Bearer xyz");

        let registry = Registry::new();
        config.apply(&registry).unwrap();
        assert_eq!(registry.list(), vec!["api", "app"]);

        let app = registry.lookup("app").unwrap();
        assert_eq!(app.url.to_string(), "file:///etc/app/config.yaml");

        let api = registry.lookup("api").unwrap();
        assert_eq!(api.headers["authorization"], "Bearer xyz");
        assert_eq!(api.headers.len(), 2);
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_bad_header_is_a_config_error() {
        let config: Config = r#"
[datasources.api]
url = "https://example.com"
headers = { "bad header" = "x" }
"#
        .parse()
        .unwrap();

        let err = config.apply(&Registry::new()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("api")));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datafs.toml");
        std::fs::write(&path, "[datasources.x]\nurl = \"env:HOME\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.datasources["x"].url, "env:HOME");

        let missing = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing, Config::default());

        std::fs::write(&path, "datasources = 3").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
