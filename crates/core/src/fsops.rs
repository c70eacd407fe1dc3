//! Filesystem helpers for skill directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use walkdir::WalkDir;

use crate::error::{HubError, IoContext, Result};

/// Entries never copied into the central repository or a tool directory.
const SKIP_ON_COPY: &[&str] = &[".git"];

/// Environment flag that logs file and byte counts for recursive copies.
pub const PROFILE_IO_ENV: &str = "SKILLHUB_PROFILE_IO";

/// What currently occupies a path, without following a final symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    Missing,
    /// Symlink or junction with its raw target.
    Link(PathBuf),
    Dir,
    File,
}

/// Inspect `path` via `symlink_metadata`.
pub fn inspect_path(path: &Path) -> Result<PathKind> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            let target = fs::read_link(path).io_ctx("read link", path)?;
            Ok(PathKind::Link(target))
        }
        Ok(meta) if meta.is_dir() => Ok(PathKind::Dir),
        Ok(_) => Ok(PathKind::File),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PathKind::Missing),
        Err(e) => Err(HubError::io("stat", path, e)),
    }
}

/// Counts reported by [`copy_dir_recursive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

fn profile_enabled() -> bool {
    std::env::var(PROFILE_IO_ENV)
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Copy a directory tree, skipping VCS metadata.
///
/// Only directories and regular files are copied. Symlinks inside the tree
/// are skipped, so a skill can never pull in content from outside its own
/// directory or loop back into itself.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<CopyStats> {
    let started = Instant::now();
    let mut stats = CopyStats::default();
    copy_tree(src, dst, &mut stats)?;
    if profile_enabled() {
        tracing::info!(
            target: "skillhub::io",
            src = %src.display(),
            dst = %dst.display(),
            files = stats.files,
            bytes = stats.bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "copy_dir_recursive"
        );
    }
    Ok(stats)
}

fn copy_tree(src: &Path, dst: &Path, stats: &mut CopyStats) -> Result<()> {
    if !src.is_dir() {
        return Err(HubError::not_found("directory", src.display().to_string()));
    }
    fs::create_dir_all(dst).io_ctx("create dir", dst)?;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !SKIP_ON_COPY.contains(&e.file_name().to_string_lossy().as_ref()));
    for entry in walker {
        let entry = entry.map_err(|e| {
            HubError::io(
                "walk",
                src,
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop")),
            )
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| HubError::Other(e.into()))?;
        let out = dst.join(rel);
        let ft = entry.file_type();

        if ft.is_dir() {
            fs::create_dir_all(&out).io_ctx("create dir", &out)?;
        } else if ft.is_file() {
            copy_file(entry.path(), &out, stats)?;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping symlink or special file");
        }
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path, stats: &mut CopyStats) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).io_ctx("create dir", parent)?;
    }
    let n = fs::copy(from, to).io_ctx("copy", from)?;
    stats.files += 1;
    stats.bytes += n;
    Ok(())
}

fn staging_path(dst: &Path) -> Result<PathBuf> {
    let parent = dst
        .parent()
        .ok_or_else(|| HubError::InvalidInput(format!("no parent for {}", dst.display())))?;
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parent.join(format!(".{name}.staging-{}", uuid::Uuid::new_v4().simple())))
}

/// Copy `src` to a hidden sibling of `dst`, then swap it into place.
///
/// Readers of `dst` see either the previous content or the complete new
/// content. The staging directory is removed if the copy fails.
pub fn copy_dir_staged(src: &Path, dst: &Path) -> Result<CopyStats> {
    let staging = staging_path(dst)?;
    let stats = match copy_dir_recursive(src, &staging) {
        Ok(stats) => stats,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
    };
    if let Err(e) = remove_path_any(dst) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }
    if let Err(e) = fs::rename(&staging, dst) {
        let _ = fs::remove_dir_all(&staging);
        return Err(HubError::io("rename", dst, e));
    }
    Ok(stats)
}

/// Remove whatever is at `path`: link, file, or directory tree.
///
/// Links are unlinked, never followed. A missing path is not an error.
pub fn remove_path_any(path: &Path) -> Result<()> {
    match inspect_path(path)? {
        PathKind::Missing => Ok(()),
        PathKind::Link(_) => remove_link(path),
        PathKind::Dir => fs::remove_dir_all(path).io_ctx("remove dir", path),
        PathKind::File => fs::remove_file(path).io_ctx("remove file", path),
    }
}

fn remove_link(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Directory symlinks and junctions on Windows need remove_dir.
        Err(first) => fs::remove_dir(path).map_err(|_| HubError::io("remove link", path, first)),
    }
}
