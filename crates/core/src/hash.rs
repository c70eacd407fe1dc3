//! Stable directory digests.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{HubError, IoContext, Result};

/// Directory names skipped entirely while hashing.
pub const IGNORED_DIRS: &[&str] = &[".git"];

/// File names that never contribute to a digest.
pub const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db", ".gitignore"];

fn is_ignored(name: &str, is_dir: bool) -> bool {
    if is_dir {
        IGNORED_DIRS.contains(&name)
    } else {
        IGNORED_FILES.contains(&name)
    }
}

/// Compute a lowercase hex SHA-256 over a directory tree.
///
/// Files are visited in sorted relative-path order with `/` separators, and
/// each contributes its path and bytes, so mtimes and ignored metadata never
/// change the result. Symlinks inside the tree are skipped, matching what
/// [`copy_dir_recursive`](crate::copy_dir_recursive) keeps.
pub fn hash_dir(root: &Path) -> Result<String> {
    if !root.is_dir() {
        return Err(HubError::not_found("directory", root.display().to_string()));
    }

    let mut entries: Vec<(String, walkdir::DirEntry)> = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !is_ignored(&name, e.file_type().is_dir())
        });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            HubError::io(
                "walk",
                &path,
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| HubError::Other(e.into()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push((rel, entry));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (rel, entry) in &entries {
        let path = entry.path();
        let data = fs::read(path).io_ctx("read", path)?;
        hasher.update((rel.len() as u64).to_le_bytes());
        hasher.update(rel.as_bytes());
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(&data);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
