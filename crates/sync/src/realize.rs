//! Link and copy primitives for a single destination.
//!
//! Both paths stage next to the destination and only remove what is there
//! once the new realization exists, so a failed attempt leaves the
//! destination as it was.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use skillhub_core::{
    copy_dir_staged, hash_dir, inspect_path, remove_path_any, CopyStats, HubError, IoContext,
    PathKind, Result,
};
use skillhub_state::TargetMode;

/// How a target is realized, as observed or created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Realization {
    /// A symlink or junction reading through to `target`.
    Linked { target: PathBuf, mode: TargetMode },
    /// An independent snapshot of the central copy.
    Copied,
}

impl Realization {
    pub fn mode(&self) -> TargetMode {
        match self {
            Realization::Linked { mode, .. } => *mode,
            Realization::Copied => TargetMode::Copy,
        }
    }
}

/// What sits at a target path, judged against the central copy it should
/// reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Found {
    Missing,
    /// A link whose target no longer exists.
    Dangling,
    Ours(Realization),
    /// Content the engine did not write: a link elsewhere, a plain file, or
    /// a directory matching neither the recorded copy nor the central copy.
    Foreign,
}

#[cfg(windows)]
fn link_mode(path: &Path) -> TargetMode {
    if junction::exists(path).unwrap_or(false) {
        TargetMode::Junction
    } else {
        TargetMode::Symlink
    }
}

#[cfg(not(windows))]
fn link_mode(_path: &Path) -> TargetMode {
    TargetMode::Symlink
}

/// Classify `path`. A directory counts as our copy only when its digest
/// equals `copy_hash` (recorded when the copy was written) or the digest of
/// `source`.
pub(crate) fn classify(
    path: &Path,
    source: Option<&Path>,
    copy_hash: Option<&str>,
) -> Result<Found> {
    Ok(match inspect_path(path)? {
        PathKind::Missing => Found::Missing,
        PathKind::Link(target) => match source {
            Some(source) if points_at(&target, path, source) => Found::Ours(Realization::Linked {
                mode: link_mode(path),
                target,
            }),
            _ if fs::metadata(path).is_err() => Found::Dangling,
            _ => Found::Foreign,
        },
        PathKind::Dir => {
            let digest = hash_dir(path)?;
            let recorded = copy_hash.is_some_and(|h| h == digest);
            let central = match source {
                Some(source) if !recorded && source.is_dir() => hash_dir(source)? == digest,
                _ => false,
            };
            if recorded || central {
                Found::Ours(Realization::Copied)
            } else {
                Found::Foreign
            }
        }
        PathKind::File => Found::Foreign,
    })
}

/// Why a link could not be put in place.
#[derive(Debug)]
pub enum LinkError {
    /// The platform or filesystem refused to create the link. Callers fall
    /// back to copying.
    Unsupported(io::Error),
    /// Anything else, surfaced as is.
    Failed(HubError),
}

fn ensure_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).io_ctx("create tool directory", parent)?;
    }
    Ok(())
}

fn sibling(dest: &Path, tag: &str) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{tag}-{}", uuid::Uuid::new_v4().simple()))
}

#[cfg(unix)]
fn create_link(source: &Path, at: &Path) -> io::Result<TargetMode> {
    std::os::unix::fs::symlink(source, at)?;
    Ok(TargetMode::Symlink)
}

#[cfg(windows)]
fn create_link(source: &Path, at: &Path) -> io::Result<TargetMode> {
    match std::os::windows::fs::symlink_dir(source, at) {
        Ok(()) => Ok(TargetMode::Symlink),
        Err(symlink_err) => {
            tracing::debug!(error = %symlink_err, "symlink_dir refused, trying junction");
            junction::create(source, at)?;
            Ok(TargetMode::Junction)
        }
    }
}

#[cfg(not(any(unix, windows)))]
fn create_link(_source: &Path, _at: &Path) -> io::Result<TargetMode> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory links are not supported on this platform",
    ))
}

/// Put a link to `source` at `dest`, replacing whatever is there.
pub fn link_into_place(source: &Path, dest: &Path) -> std::result::Result<Realization, LinkError> {
    ensure_parent(dest).map_err(LinkError::Failed)?;
    let staging = sibling(dest, "link");
    let mode = create_link(source, &staging).map_err(LinkError::Unsupported)?;
    if let Err(e) = remove_path_any(dest) {
        let _ = remove_path_any(&staging);
        return Err(LinkError::Failed(e));
    }
    if let Err(e) = fs::rename(&staging, dest) {
        let _ = remove_path_any(&staging);
        return Err(LinkError::Failed(HubError::io("rename link", dest, e)));
    }
    Ok(Realization::Linked {
        target: source.to_path_buf(),
        mode,
    })
}

/// Copy `source` over `dest`, replacing whatever is there.
pub fn copy_into_place(source: &Path, dest: &Path) -> Result<CopyStats> {
    ensure_parent(dest)?;
    copy_dir_staged(source, dest)
}

/// Whether the link at `link_path` (whose raw target is `link_target`)
/// resolves to `source`.
pub fn points_at(link_target: &Path, link_path: &Path, source: &Path) -> bool {
    let resolved = match (link_target.is_relative(), link_path.parent()) {
        (true, Some(parent)) => parent.join(link_target),
        _ => link_target.to_path_buf(),
    };
    if resolved == source {
        return true;
    }
    match (fs::canonicalize(&resolved), fs::canonicalize(source)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
