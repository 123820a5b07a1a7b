//! Working-directory-aware local filesystem.
//!
//! [`WdFs`] serves `file:` and schemeless URLs. Every name it is given is
//! turned into an absolute location with [`resolve_local_path`], which splits
//! off the volume (`/`, `C:`, `//host/share`, a device prefix) so the call
//! can be delegated to a [`LocalFs`] rooted at that volume.
//!
//! Relative names are resolved against the process working directory, read
//! fresh on every call. Mutating operations refuse targets outside that
//! directory's subtree.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use datafs_url::{path, SourceUrl};

use super::local::LocalFs;
use super::mux::{FsMux, FsProvider};
use super::traits::{DirEntry, File, Filesystem};
use crate::error::Error;

/// Path syntax rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathConvention {
    Posix,
    Windows,
}

impl PathConvention {
    /// The convention of the platform we were built for.
    pub fn native() -> Self {
        if cfg!(windows) {
            PathConvention::Windows
        } else {
            PathConvention::Posix
        }
    }

    fn to_slash(self, p: &str) -> String {
        match self {
            PathConvention::Posix => p.to_string(),
            PathConvention::Windows => {
                let slashed = p.replace('\\', "/");
                // `/C:/x` is what a `file:///C:/x` URL path looks like
                match slashed.strip_prefix('/') {
                    Some(rest) if has_drive(rest) && !slashed.starts_with("//") => rest.to_string(),
                    _ => slashed,
                }
            }
        }
    }

    fn same_volume(self, a: &str, b: &str) -> bool {
        match self {
            PathConvention::Posix => a == b,
            PathConvention::Windows => a.eq_ignore_ascii_case(b),
        }
    }
}

/// Shape of a slash-normalized path.
///
/// POSIX paths are only ever [`Rooted`](PathShape::Rooted) or
/// [`Relative`](PathShape::Relative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape {
    /// `/foo`: absolute on the current volume.
    Rooted,
    /// `//host/share/foo`
    UncAbsolute,
    /// `foo/bar`
    Relative,
    /// `C:foo`: relative to the drive's working directory.
    DriveRelative,
    /// `C:/foo`
    DriveAbsolute,
    /// `//./C:/foo`
    LocalDevice,
    /// `//?/C:/foo`
    RootLocalDevice,
    /// `/??/C:/foo`
    NtNamespace,
}

impl PathShape {
    /// Classify `p`, which must already use `/` separators.
    pub fn classify(convention: PathConvention, p: &str) -> Self {
        if convention == PathConvention::Posix {
            return if p.starts_with('/') {
                PathShape::Rooted
            } else {
                PathShape::Relative
            };
        }

        if p.starts_with("/??/") {
            PathShape::NtNamespace
        } else if p.starts_with("//./") {
            PathShape::LocalDevice
        } else if p.starts_with("//?/") {
            PathShape::RootLocalDevice
        } else if p.starts_with("//") {
            PathShape::UncAbsolute
        } else if p.starts_with('/') {
            PathShape::Rooted
        } else if has_drive(p) {
            if p[2..].starts_with('/') {
                PathShape::DriveAbsolute
            } else {
                PathShape::DriveRelative
            }
        } else {
            PathShape::Relative
        }
    }

    pub fn is_absolute(self) -> bool {
        !matches!(
            self,
            PathShape::Rooted | PathShape::Relative | PathShape::DriveRelative
        )
    }
}

fn has_drive(p: &str) -> bool {
    let b = p.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Split an absolute, slash-normalized path into `(volume, remainder)`.
fn split_volume(convention: PathConvention, p: &str) -> (String, String) {
    if convention == PathConvention::Posix {
        return ("/".to_string(), p.trim_start_matches('/').to_string());
    }

    match PathShape::classify(convention, p) {
        PathShape::NtNamespace | PathShape::LocalDevice | PathShape::RootLocalDevice => {
            let (prefix, rest) = p.split_at(4);
            let (device, rest) = rest.split_once('/').unwrap_or((rest, ""));
            (format!("{prefix}{device}"), rest.to_string())
        }
        PathShape::UncAbsolute => {
            let mut parts = p[2..].splitn(3, '/');
            let host = parts.next().unwrap_or_default();
            let share = parts.next().unwrap_or_default();
            let rest = parts.next().unwrap_or_default();
            (format!("//{host}/{share}"), rest.to_string())
        }
        PathShape::DriveAbsolute | PathShape::DriveRelative => {
            (p[..2].to_string(), p[2..].trim_start_matches('/').to_string())
        }
        PathShape::Rooted | PathShape::Relative => (String::new(), p.trim_start_matches('/').to_string()),
    }
}

/// Resolve `p` to `(volume_root, path_within_volume)`.
///
/// - separators are normalized to `/` (Windows)
/// - `/x` (but not `//x`) is anchored on `volume_hint`, or on the volume of
///   `cwd` when the hint is empty
/// - relative paths are joined onto `cwd`
/// - `.` and `..` are cleaned; `..` never climbs above the volume
///
/// The returned path is `.` for the volume root itself.
pub fn resolve_local_path(
    convention: PathConvention,
    cwd: &str,
    volume_hint: &str,
    p: &str,
) -> (String, String) {
    let p = convention.to_slash(p);
    let cwd = convention.to_slash(cwd);
    let volume_hint = convention.to_slash(volume_hint);
    let volume_hint = volume_hint.trim_end_matches('/');

    let absolute = match PathShape::classify(convention, &p) {
        PathShape::Rooted => {
            let volume = if volume_hint.is_empty() && convention == PathConvention::Windows {
                split_volume(convention, &cwd).0
            } else {
                volume_hint.to_string()
            };
            format!("{volume}{p}")
        }
        PathShape::Relative => format!("{}/{p}", cwd.trim_end_matches('/')),
        PathShape::DriveRelative => {
            let (drive, rest) = p.split_at(2);
            let (cwd_volume, _) = split_volume(convention, &cwd);
            if convention.same_volume(drive, &cwd_volume) {
                format!("{}/{rest}", cwd.trim_end_matches('/'))
            } else {
                format!("{drive}/{rest}")
            }
        }
        _ => p,
    };

    let (root, rest) = split_volume(convention, &absolute);
    let cleaned = path::clean(&format!("/{rest}"));
    let resolved = cleaned.trim_start_matches('/');
    let resolved = if resolved.is_empty() { "." } else { resolved };
    (root, resolved.to_string())
}

/// Local filesystem that resolves names against the working directory.
#[derive(Debug, Clone)]
pub struct WdFs {
    /// Prefix that turns a split-off relative path back into a local name.
    anchor: Anchor,
    convention: PathConvention,
    volume_hint: String,
    cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Anchor {
    /// Schemeless URL: names stay relative to the working directory.
    Relative,
    /// `file:///`: names are absolute on the current volume.
    Volume,
    /// `file://host/`: names are UNC paths on `host`.
    Host(String),
}

impl WdFs {
    /// A filesystem for a root produced by splitting a `file:` or
    /// schemeless URL.
    pub fn new(root: &SourceUrl) -> Self {
        let anchor = if !root.host().is_empty() {
            Anchor::Host(root.host().to_string())
        } else if root.scheme().is_empty() {
            Anchor::Relative
        } else {
            Anchor::Volume
        };
        Self {
            anchor,
            convention: PathConvention::native(),
            volume_hint: String::new(),
            cwd: None,
        }
    }

    pub fn with_convention(mut self, convention: PathConvention) -> Self {
        self.convention = convention;
        self
    }

    /// Volume that `/x` names are anchored on (`C:` on Windows).
    pub fn with_volume_hint(mut self, hint: impl Into<String>) -> Self {
        self.volume_hint = hint.into();
        self
    }

    /// Pin the working directory instead of reading the process one.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    fn current_dir(&self) -> io::Result<String> {
        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        Ok(cwd.to_string_lossy().into_owned())
    }

    fn local_name(&self, name: &str) -> String {
        let name = if name == "." { "" } else { name };
        match &self.anchor {
            Anchor::Relative if name.is_empty() => ".".to_string(),
            Anchor::Relative => name.to_string(),
            Anchor::Volume => format!("/{name}"),
            Anchor::Host(host) => format!("//{host}/{name}"),
        }
    }

    /// Resolve `name` to a backend rooted at its volume plus the path inside it.
    fn resolve(&self, name: &str) -> io::Result<(LocalFs, String)> {
        let cwd = self.current_dir()?;
        let (root, resolved) = resolve_local_path(
            self.convention,
            &cwd,
            &self.volume_hint,
            &self.local_name(name),
        );
        Ok((LocalFs::new(volume_dir(&root)), resolved))
    }

    /// Like [`resolve`](Self::resolve), but fails unless the target lies in
    /// the working directory's subtree.
    fn resolve_for_write(&self, name: &str) -> io::Result<(LocalFs, String)> {
        let cwd = self.current_dir()?;
        let (root, resolved) = resolve_local_path(
            self.convention,
            &cwd,
            &self.volume_hint,
            &self.local_name(name),
        );
        let (cwd_root, cwd_resolved) =
            resolve_local_path(self.convention, &cwd, &self.volume_hint, &cwd);

        let inside = self.convention.same_volume(&root, &cwd_root)
            && (cwd_resolved == "."
                || resolved == cwd_resolved
                || resolved
                    .strip_prefix(&cwd_resolved)
                    .is_some_and(|rest| rest.starts_with('/')));
        if !inside {
            let target = PathBuf::from(volume_dir(&root)).join(&resolved);
            return Err(Error::WriteOutsideWorkingDirectory { path: target }.into_io());
        }

        Ok((LocalFs::new(volume_dir(&root)), resolved))
    }
}

/// The directory a volume token names: `C:` → `C:/`, `/` stays `/`.
fn volume_dir(root: &str) -> String {
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{root}/")
    }
}

#[async_trait]
impl Filesystem for WdFs {
    async fn open(&self, name: &str) -> io::Result<Box<dyn File>> {
        let (fs, p) = self.resolve(name)?;
        fs.open(&p).await
    }

    async fn read_dir(&self, name: &str) -> io::Result<Vec<DirEntry>> {
        let (fs, p) = self.resolve(name)?;
        fs.read_dir(&p).await
    }

    async fn stat(&self, name: &str) -> io::Result<DirEntry> {
        let (fs, p) = self.resolve(name)?;
        fs.stat(&p).await
    }

    async fn read_file(&self, name: &str) -> io::Result<Vec<u8>> {
        let (fs, p) = self.resolve(name)?;
        fs.read_file(&p).await
    }

    async fn write(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let (fs, p) = self.resolve_for_write(name)?;
        fs.write(&p, data).await
    }

    async fn mkdir(&self, name: &str) -> io::Result<()> {
        let (fs, p) = self.resolve_for_write(name)?;
        fs.mkdir(&p).await
    }

    async fn remove(&self, name: &str) -> io::Result<()> {
        let (fs, p) = self.resolve_for_write(name)?;
        fs.remove(&p).await
    }

    async fn chmod(&self, name: &str, mode: u32) -> io::Result<()> {
        let (fs, p) = self.resolve_for_write(name)?;
        fs.chmod(&p, mode).await
    }

    fn read_only(&self) -> bool {
        false
    }
}

/// Serves `file:` and schemeless URLs with [`WdFs`].
#[derive(Debug, Clone, Default)]
pub struct WdFsProvider {
    cwd: Option<PathBuf>,
}

impl WdFsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin every filesystem this provider builds to `cwd`.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
        }
    }
}

#[async_trait]
impl FsProvider for WdFsProvider {
    fn schemes(&self) -> &[&'static str] {
        &["file", ""]
    }

    async fn new_fs(&self, root: &SourceUrl, _mux: &FsMux) -> io::Result<Arc<dyn Filesystem>> {
        let fs = WdFs::new(root);
        let fs = match &self.cwd {
            Some(cwd) => fs.with_cwd(cwd.clone()),
            None => fs,
        };
        Ok(Arc::new(fs))
    }
}
