//! The single directory that owns canonical skill content.

use std::fs;
use std::path::{Path, PathBuf};

use skillhub_core::{
    copy_dir_recursive, now_ms, paths::safe_child, remove_path_any, HubError, IoContext, Result,
};

use crate::env;
use crate::persistence::{SkillRecord, SkillStore};
use crate::settings;

/// Resolved central repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralRepo {
    root: PathBuf,
}

impl CentralRepo {
    /// Use an explicit root.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the root: `SKILLHUB_CENTRAL_REPO`, then the stored setting,
    /// then `<data dir>/skills`.
    pub fn resolve(store: &SkillStore) -> Result<Self> {
        if let Some(path) = env::env_central_repo() {
            return Ok(Self::at(path));
        }
        if let Some(path) = settings::central_repo_path(store)? {
            return Ok(Self::at(path));
        }
        Ok(Self::at(env::data_dir()?.join("skills")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and any missing parents. Idempotent.
    pub fn ensure_exists(&self) -> Result<&Path> {
        fs::create_dir_all(&self.root).io_ctx("create central repository", &self.root)?;
        Ok(&self.root)
    }

    /// Whether `path` lies inside the repository, lexically or after
    /// resolving symlinks.
    pub fn contains(&self, path: &Path) -> bool {
        if path.starts_with(&self.root) {
            return true;
        }
        match (fs::canonicalize(path), fs::canonicalize(&self.root)) {
            (Ok(p), Ok(r)) => p.starts_with(r),
            _ => false,
        }
    }

    /// Pick a fresh directory for a skill named `name`.
    ///
    /// The slug is derived from the name; a numeric suffix is appended when
    /// the directory already exists, so the result never collides on disk.
    pub fn allocate_dir(&self, name: &str) -> Result<PathBuf> {
        let base = slugify(name);
        let first = safe_child(&self.root, &base)?;
        if !first.exists() {
            return Ok(first);
        }
        for n in 2..10_000u32 {
            let candidate = safe_child(&self.root, &format!("{base}-{n}"))?;
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(HubError::already_exists("central directory", base))
    }

    /// Move every managed skill into `new_root` and repoint the records.
    ///
    /// Each skill keeps its directory name. Every move is checked before the
    /// first one happens: a missing central copy or an occupied destination
    /// fails the call with nothing moved.
    pub fn migrate(&self, store: &SkillStore, new_root: &Path) -> Result<CentralRepo> {
        if !new_root.is_absolute() {
            return Err(HubError::InvalidInput(format!(
                "central repository path must be absolute: {}",
                new_root.display()
            )));
        }
        let next = CentralRepo::at(new_root);
        next.ensure_exists()?;
        if same_dir(&self.root, new_root) {
            return Ok(next);
        }

        let mut moves: Vec<(SkillRecord, PathBuf)> = Vec::new();
        for skill in store.list_skills()? {
            if !skill.central_path.is_dir() {
                return Err(HubError::SourceMissing(
                    skill.central_path.display().to_string(),
                ));
            }
            let dir_name = skill
                .central_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    HubError::InvalidInput(format!(
                        "invalid central path: {}",
                        skill.central_path.display()
                    ))
                })?;
            let dest = safe_child(new_root, &dir_name)?;
            if dest.exists() || moves.iter().any(|(_, d)| *d == dest) {
                return Err(HubError::Conflict { path: dest });
            }
            moves.push((skill, dest));
        }

        for (skill, dest) in moves {
            move_dir(&skill.central_path, &dest)?;
            tracing::info!(
                skill = %skill.name,
                from = %skill.central_path.display(),
                to = %dest.display(),
                "central copy moved"
            );
            store.upsert_skill(&SkillRecord {
                central_path: dest,
                updated_at: now_ms(),
                ..skill
            })?;
        }
        Ok(next)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Rename, or copy then remove when the rename crosses filesystems.
fn move_dir(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, from = %from.display(), "rename failed, copying instead");
            if let Err(e) = copy_dir_recursive(from, to) {
                let _ = remove_path_any(to);
                return Err(e);
            }
            remove_path_any(from)
        }
    }
}

/// Lock key shared by everything that writes a skill's central directory
/// or copies out of it. Names that slug alike share a key, since they would
/// race for the same directory.
pub fn central_lock_key(name: &str) -> String {
    format!("central:{}", slugify(name))
}

/// Lowercase ASCII slug with `-` separators; never empty.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
            out.push(ch.to_ascii_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "skill".to_string()
    } else {
        trimmed.to_string()
    }
}
