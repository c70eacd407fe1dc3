//! Path safety checks for every join that lands in a tool or central directory.
//!
//! The check is lexical: the candidate is split on both `/` and `\` so a
//! Windows-style payload is rejected on Unix too, and the joined result must
//! still start with the base.

use std::path::{Component, Path, PathBuf};

use crate::error::{HubError, Result};

fn has_drive_prefix(rel: &str) -> bool {
    let b = rel.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

fn reject(path: &str, reason: &'static str) -> HubError {
    HubError::PathUnsafe {
        path: path.to_string(),
        reason,
    }
}

fn check(rel: &str) -> Result<Vec<&str>> {
    if rel.trim().is_empty() {
        return Err(reject(rel, "empty path"));
    }
    if rel.contains('\0') {
        return Err(reject(rel, "contains NUL byte"));
    }
    if rel.starts_with('/') || rel.starts_with('\\') {
        return Err(reject(rel, "absolute path"));
    }
    if has_drive_prefix(rel) {
        return Err(reject(rel, "drive-letter prefix"));
    }
    let mut parts = Vec::new();
    for seg in rel.split(['/', '\\']) {
        match seg {
            "" | "." => continue,
            ".." => return Err(reject(rel, "parent-directory segment")),
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return Err(reject(rel, "resolves to the base itself"));
    }
    Ok(parts)
}

/// Returns true when `rel` cannot escape whatever base it is joined to.
pub fn is_safe_relative(rel: &str) -> bool {
    check(rel).is_ok()
}

/// Join `rel` under `base`, rejecting traversal, absolute paths, and drive prefixes.
pub fn safe_join(base: &Path, rel: &str) -> Result<PathBuf> {
    let parts = check(rel)?;
    let mut out = base.to_path_buf();
    for p in parts {
        out.push(p);
    }
    // Platform component parsing must not yield anything but normal segments.
    let escapes = out
        .strip_prefix(base)
        .map(|tail| {
            tail.components()
                .any(|c| !matches!(c, Component::Normal(_)))
        })
        .unwrap_or(true);
    if escapes {
        return Err(reject(rel, "resolves outside base"));
    }
    Ok(out)
}

/// Join a single path segment under `base`; the result is a direct child.
///
/// Target paths for tool directories go through this so a skill name like
/// `a/b` never creates nested directories.
pub fn safe_child(base: &Path, name: &str) -> Result<PathBuf> {
    let parts = check(name)?;
    if parts.len() != 1 {
        return Err(reject(name, "not a single path segment"));
    }
    safe_join(base, parts[0])
}
