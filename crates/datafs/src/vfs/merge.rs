//! `merge:` provider: several map-shaped sources as one JSON document.
//!
//! `merge:<ref1>|<ref2>|...` names at least two sub-references. Each is a
//! registered alias or a literal source URL. Opening resolves and opens every
//! sub-source; the first read or stat parses them all and deep-merges the
//! maps, with earlier references winning on conflicting keys.
//!
//! ```text
//!            open                 read/stat               close
//! (none) ──────────▶ Reading ──────────────▶ Merged ──────────────▶ Closed
//!                      │ subs open             │ bytes cached          ▲
//!                      │ read/stat fails                               │
//!                      └──────────────────▶ Failed ──── close ─────────┘
//! ```
//!
//! A failed merge is terminal: sub-files are closed and every later read or
//! stat returns the same error.

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use datafs_url::{parse_source_url, SourceUrl};
use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::mux::{FsMux, FsProvider};
use super::traits::{ContextAware, DirEntry, File, Filesystem};
use crate::content;
use crate::context::FsContext;
use crate::error::{Error, Result};
use crate::parse::parse;
use crate::reader::with_file_scheme;
use crate::registry::Registry;

/// Filesystem whose every name is a `|`-separated merge reference.
#[derive(Clone)]
pub struct MergeFs {
    registry: Arc<Registry>,
    mux: FsMux,
    ctx: FsContext,
}

impl MergeFs {
    pub fn new(registry: Arc<Registry>, mux: FsMux) -> Self {
        Self {
            registry,
            mux,
            ctx: FsContext::new(),
        }
    }

    /// Open a merge reference, returning the concrete file so callers can
    /// use [`MergeFile::read_at`].
    pub async fn open_merge(&self, name: &str) -> Result<MergeFile> {
        let refs: Vec<&str> = name.split('|').collect();
        if refs.len() < 2 {
            return Err(Error::InsufficientSources {
                reference: name.to_string(),
                count: refs.len(),
            });
        }

        let mut subs = Vec::with_capacity(refs.len());
        for reference in refs {
            let sub = self
                .open_sub(reference)
                .await
                .map_err(|e| Error::SubSourceUnavailable {
                    reference: reference.to_string(),
                    source: Box::new(e),
                });
            match sub {
                Ok(sub) => subs.push(sub),
                Err(err) => {
                    close_all(&subs).await;
                    return Err(err);
                }
            }
        }

        Ok(MergeFile {
            name: name.to_string(),
            state: Mutex::new(State::Reading(subs)),
        })
    }

    async fn open_sub(&self, reference: &str) -> Result<SubFile> {
        let (url, headers) = match self.registry.lookup(reference) {
            Some(source) => (source.url, source.headers),
            None => (parse_source_url(reference)?, HeaderMap::new()),
        };
        let (url, hint) = url.take_query_param(&content::type_param());
        let url = with_file_scheme(url);

        let (fs, rel) = self.mux.lookup_url(&self.ctx, &url, &headers).await?;
        let file = fs.open(&rel).await?;
        Ok(SubFile {
            reference: reference.to_string(),
            url,
            file,
            hint,
        })
    }
}

#[async_trait]
impl Filesystem for MergeFs {
    async fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let file = self.open_merge(name).await.map_err(Error::into_io)?;
        Ok(Box::new(file))
    }

    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("merge: cannot list {name}"),
        ))
    }

    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }
}

impl ContextAware for MergeFs {
    fn with_context(&self, ctx: &FsContext) -> Arc<dyn Filesystem> {
        Arc::new(Self {
            ctx: ctx.clone(),
            ..self.clone()
        })
    }
}

/// An opened sub-source.
struct SubFile {
    reference: String,
    url: SourceUrl,
    file: Box<dyn File>,
    /// Type-override parameter taken from the reference.
    hint: Option<String>,
}

enum State {
    Reading(Vec<SubFile>),
    Merged {
        data: Arc<[u8]>,
        modified: Option<SystemTime>,
        pos: usize,
        subs: Vec<SubFile>,
    },
    /// Materialization failed; sub-files are closed.
    Failed {
        kind: io::ErrorKind,
        message: String,
    },
    Closed,
}

/// The merged document for one merge reference.
pub struct MergeFile {
    name: String,
    state: Mutex<State>,
}

impl MergeFile {
    /// Read up to `buf.len()` merged bytes starting at `offset`.
    ///
    /// Does not move the cursor used by [`File::read`].
    pub async fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_merged(&mut state).await?;
        match &*state {
            State::Merged { data, .. } => {
                let offset = usize::try_from(offset).unwrap_or(usize::MAX);
                Ok(copy_from(data, offset, buf))
            }
            _ => Err(closed(&self.name)),
        }
    }

    async fn ensure_merged(&self, state: &mut State) -> io::Result<()> {
        let subs = match state {
            State::Reading(subs) => subs,
            State::Merged { .. } => return Ok(()),
            State::Failed { kind, message } => {
                return Err(io::Error::new(*kind, message.clone()));
            }
            State::Closed => return Err(closed(&self.name)),
        };

        // Sub-file cursors move during materialize, so it never runs twice.
        let result = materialize(subs).await;
        let subs = std::mem::take(subs);
        match result {
            Ok((data, modified)) => {
                debug!(name = %self.name, bytes = data.len(), "merged sources");
                *state = State::Merged {
                    data: Arc::from(data),
                    modified,
                    pos: 0,
                    subs,
                };
                Ok(())
            }
            Err(err) => {
                debug!(name = %self.name, error = %err, "merge failed");
                close_all(&subs).await;
                let err = err.into_io();
                *state = State::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                Err(err)
            }
        }
    }
}

#[async_trait]
impl File for MergeFile {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().await;
        self.ensure_merged(&mut state).await?;
        match &mut *state {
            State::Merged { data, pos, .. } => {
                let n = copy_from(data, *pos, buf);
                *pos += n;
                Ok(n)
            }
            _ => Err(closed(&self.name)),
        }
    }

    async fn stat(&self) -> io::Result<DirEntry> {
        let mut state = self.state.lock().await;
        self.ensure_merged(&mut state).await?;
        match &*state {
            State::Merged { data, modified, .. } => {
                Ok(DirEntry::file(self.name.clone(), data.len() as u64)
                    .with_modified(*modified)
                    .with_content_type(Some(content::JSON.to_string())))
            }
            _ => Err(closed(&self.name)),
        }
    }

    async fn close(&self) -> io::Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Reading(subs) | State::Merged { subs, .. } => close_all(&subs).await,
            State::Failed { .. } | State::Closed => {}
        }
        Ok(())
    }
}

fn copy_from(data: &[u8], offset: usize, buf: &mut [u8]) -> usize {
    let start = offset.min(data.len());
    let n = (data.len() - start).min(buf.len());
    buf[..n].copy_from_slice(&data[start..start + n]);
    n
}

fn closed(name: &str) -> io::Error {
    io::Error::other(format!("file already closed: {name}"))
}

async fn close_all(subs: &[SubFile]) {
    for sub in subs {
        if let Err(err) = sub.file.close().await {
            warn!(reference = %sub.reference, error = %err, "failed to close merge sub-source");
        }
    }
}

/// Parse every sub-source and merge them. Returns the pretty-printed JSON
/// and the newest modification time.
async fn materialize(subs: &[SubFile]) -> Result<(Vec<u8>, Option<SystemTime>)> {
    let mut modified = None;
    let mut merged: Option<Map<String, Value>> = None;

    for sub in subs {
        let meta = sub.file.stat().await?;
        modified = modified.max(meta.modified);

        let content_type = content::resolve(
            sub.hint.as_deref(),
            meta.content_type.as_deref(),
            sub.url.file_name(),
        );
        let data = sub.file.read_to_end().await?;
        let map = match parse(&content_type, &data)? {
            Value::Object(map) => map,
            _ => {
                return Err(Error::MergeRequiresMaps {
                    reference: sub.reference.clone(),
                    content_type,
                });
            }
        };

        merged = Some(match merged {
            Some(left) => merge_maps(left, map),
            None => map,
        });
    }

    let value = Value::Object(merged.unwrap_or_default());
    let data = serde_json::to_vec_pretty(&value).map_err(|e| Error::Parse {
        content_type: content::JSON.to_string(),
        reason: e.to_string(),
    })?;
    Ok((data, modified))
}

/// Deep-merge `right` into `left`; `left` wins on conflicts.
fn merge_maps(mut left: Map<String, Value>, right: Map<String, Value>) -> Map<String, Value> {
    for (key, right_value) in right {
        match left.get_mut(&key) {
            Some(Value::Object(left_map)) => {
                if let Value::Object(right_map) = right_value {
                    let taken = std::mem::take(left_map);
                    *left_map = merge_maps(taken, right_map);
                }
            }
            Some(_) => {}
            None => {
                left.insert(key, right_value);
            }
        }
    }
    left
}

/// Serves `merge:` URLs.
#[derive(Clone)]
pub struct MergeProvider {
    registry: Arc<Registry>,
}

impl MergeProvider {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl FsProvider for MergeProvider {
    fn schemes(&self) -> &[&'static str] {
        &["merge"]
    }

    async fn new_fs(&self, _root: &SourceUrl, mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        Ok(Arc::new(MergeFs::new(self.registry.clone(), mux.clone())))
    }
}
