//! Datasource registry: alias → source URL plus request headers.
//!
//! Lives for one rendering session. Lookups run concurrently; registration
//! takes the write lock.

use std::collections::HashMap;
use std::sync::RwLock;

use datafs_url::SourceUrl;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// A registered datasource.
#[derive(Debug, Clone, PartialEq)]
pub struct Datasource {
    pub url: SourceUrl,
    /// Headers sent with every request for this source.
    pub headers: HeaderMap,
}

impl Datasource {
    pub fn new(url: SourceUrl) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Aliases known to a session.
#[derive(Debug, Default)]
pub struct Registry {
    sources: RwLock<HashMap<String, Datasource>>,
    extra_headers: RwLock<HashMap<String, HeaderMap>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a datasource.
    ///
    /// A source registered without headers picks up any headers added for
    /// its alias beforehand with [`add_extra_header`](Self::add_extra_header).
    pub fn register(&self, alias: impl Into<String>, mut source: Datasource) {
        let alias = alias.into();
        if source.headers.is_empty() {
            let extra = self.extra_headers.read().unwrap_or_else(|e| e.into_inner());
            if let Some(headers) = extra.get(&alias) {
                source.headers = headers.clone();
            }
        }

        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.insert(alias, source);
    }

    /// Register only if `alias` is free. Returns whether it was registered.
    pub fn define(&self, alias: impl Into<String>, source: Datasource) -> bool {
        let alias = alias.into();
        if self.is_registered(&alias) {
            return false;
        }
        self.register(alias, source);
        true
    }

    pub fn lookup(&self, alias: &str) -> Option<Datasource> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.get(alias).cloned()
    }

    pub fn is_registered(&self, alias: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.contains_key(alias)
    }

    /// All registered aliases, sorted.
    pub fn list(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        let mut aliases: Vec<_> = sources.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Remember a header for `alias`, applied when it is next registered
    /// without headers of its own.
    pub fn add_extra_header(&self, alias: impl Into<String>, name: HeaderName, value: HeaderValue) {
        let mut extra = self.extra_headers.write().unwrap_or_else(|e| e.into_inner());
        extra.entry(alias.into()).or_default().append(name, value);
    }
}
