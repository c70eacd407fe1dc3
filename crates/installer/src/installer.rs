//! Bringing external content under central-repository management.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use skillhub_core::{
    copy_dir_staged, hash_dir, now_ms, remove_path_any, safe_child, safe_join, HubError,
    KeyedLocks, LockGuard, LockPolicy, Result,
};
use skillhub_git::{CacheLease, FetchState, GitCache};
use skillhub_state::{
    central_lock_key, settings, CentralRepo, SkillRecord, SkillStore, SourceType, TargetMode,
};
use skillhub_sync::SyncEngine;
use tracing::{debug, info, warn};

use crate::candidates::{detect_layout, list_candidates, GitCandidate, RepoLayout};
use crate::source::GitSource;
use crate::types::{BatchItem, BatchOutcome, DeleteReport, GitInstall, ItemError, UpdateResult};

/// Where a skill being imported came from.
struct Origin<'a> {
    source_type: SourceType,
    source_ref: String,
    subpath: Option<&'a str>,
    branch: Option<&'a str>,
    revision: Option<String>,
}

/// Copies skills into the central repository and keeps their records.
///
/// Lock order: the `central` read or write guard first, then per-skill keys.
pub struct Installer {
    store: Arc<SkillStore>,
    central: RwLock<CentralRepo>,
    git: Arc<GitCache>,
    skill_locks: Arc<KeyedLocks>,
}

fn validated_name(name: &str, root: &Path) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HubError::InvalidInput("skill name is empty".into()));
    }
    // The name becomes a directory inside every tool's skills directory.
    safe_child(root, name)?;
    Ok(name.to_string())
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn stale_warning(lease: &CacheLease) -> Option<String> {
    (lease.state == FetchState::Stale).then(|| {
        format!(
            "using cached copy of {}: {}",
            lease.url,
            lease.warning.as_deref().unwrap_or("refresh failed")
        )
    })
}

impl Installer {
    pub fn new(store: Arc<SkillStore>, central: CentralRepo, git: Arc<GitCache>) -> Self {
        Self {
            store,
            central: RwLock::new(central),
            git,
            skill_locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn central(&self) -> CentralRepo {
        self.central.read().clone()
    }

    /// Per-skill locks guarding central directories. Hand these to the sync
    /// engine so copy refreshes never read a half-written skill.
    pub fn skill_locks(&self) -> Arc<KeyedLocks> {
        self.skill_locks.clone()
    }

    fn lock_skill(&self, name: &str) -> Result<LockGuard> {
        self.skill_locks
            .acquire(&central_lock_key(name), LockPolicy::Wait)
    }

    pub fn git_cache(&self) -> &GitCache {
        &self.git
    }

    /// Copy `dir` into the central repository and record it.
    ///
    /// With `overwrite`, an existing skill of the same name keeps its id and
    /// directory and has its content replaced.
    fn import_dir(
        &self,
        dir: &Path,
        name: &str,
        origin: Origin<'_>,
        overwrite: bool,
    ) -> Result<SkillRecord> {
        let central = self.central.read();
        let root = central.ensure_exists()?.to_path_buf();
        let name = validated_name(name, &root)?;
        let _guard = self.lock_skill(&name)?;
        let now = now_ms();

        let existing = self.store.get_skill_by_name(&name)?;
        let (id, central_path, created_at) = match existing {
            Some(_) if !overwrite => return Err(HubError::already_exists("skill", name)),
            Some(found) => (found.id, found.central_path, found.created_at),
            None => (
                uuid::Uuid::new_v4().to_string(),
                central.allocate_dir(&name)?,
                now,
            ),
        };
        if !central.contains(&central_path) {
            return Err(HubError::PathUnsafe {
                path: central_path.display().to_string(),
                reason: "outside the central repository",
            });
        }

        let fresh = !central_path.exists();
        let stats = copy_dir_staged(dir, &central_path)?;
        let record = SkillRecord {
            id,
            name,
            source_type: origin.source_type,
            source_ref: Some(origin.source_ref),
            source_subpath: origin.subpath.map(str::to_string),
            source_branch: origin.branch.map(str::to_string),
            source_revision: origin.revision,
            content_hash: hash_dir(&central_path).ok(),
            central_path,
            created_at,
            updated_at: now,
        };
        if let Err(e) = self.store.upsert_skill(&record) {
            if fresh {
                let _ = remove_path_any(&record.central_path);
            }
            return Err(e.into());
        }
        info!(
            skill = %record.name,
            id = %record.id,
            files = stats.files,
            path = %record.central_path.display(),
            "skill imported"
        );
        Ok(record)
    }

    /// Import a local directory. The source is copied and left untouched.
    pub fn install_local_skill(
        &self,
        source: &Path,
        name: Option<&str>,
        overwrite: bool,
    ) -> Result<SkillRecord> {
        if !source.is_dir() {
            return Err(HubError::not_found(
                "source directory",
                source.display().to_string(),
            ));
        }
        let source = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let name = match name {
            Some(n) => n.to_string(),
            None => basename(&source)
                .ok_or_else(|| HubError::InvalidInput("cannot derive a name".into()))?,
        };
        self.import_dir(
            &source,
            &name,
            Origin {
                source_type: SourceType::Local,
                source_ref: source.display().to_string(),
                subpath: None,
                branch: None,
                revision: None,
            },
            overwrite,
        )
    }

    fn resolve_in(lease: &CacheLease, subpath: Option<&str>) -> Result<PathBuf> {
        match subpath {
            Some(sub) => safe_join(&lease.path, sub),
            None => Ok(lease.path.clone()),
        }
    }

    fn import_from_lease(
        &self,
        lease: &CacheLease,
        source: &GitSource,
        name: Option<&str>,
        overwrite: bool,
    ) -> Result<SkillRecord> {
        let dir = Self::resolve_in(lease, source.subpath.as_deref())?;
        if !dir.is_dir() {
            return Err(HubError::not_found(
                "repository subpath",
                source.subpath.clone().unwrap_or_default(),
            ));
        }
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| source.default_name());
        self.import_dir(
            &dir,
            &name,
            Origin {
                source_type: SourceType::Git,
                source_ref: lease.url.clone(),
                subpath: source.subpath.as_deref(),
                branch: source.branch.as_deref(),
                revision: lease.head.clone(),
            },
            overwrite,
        )
    }

    /// Install from git via the fetch cache.
    ///
    /// Without a subpath the checkout is classified: a root skill installs
    /// directly, one candidate installs that candidate, several are returned
    /// for the caller to pick from, and none installs the root with a warning.
    pub fn install_git_skill(
        &self,
        source: &GitSource,
        name: Option<&str>,
        overwrite: bool,
    ) -> Result<GitInstall> {
        let lease = self
            .git
            .checkout(&source.repo_url, source.branch.as_deref())?;
        let mut warning = stale_warning(&lease);

        let resolved = match &source.subpath {
            Some(_) => source.clone(),
            None => match detect_layout(&lease.path, &source.repo_name()) {
                RepoLayout::RootSkill(_) => source.clone(),
                RepoLayout::Candidates(list) if list.len() > 1 => {
                    debug!(url = %lease.url, count = list.len(), "repository holds several skills");
                    return Ok(GitInstall::MultipleCandidates {
                        repo_url: lease.url.clone(),
                        branch: source.branch.clone(),
                        candidates: list,
                    });
                }
                RepoLayout::Candidates(list) => match list.into_iter().next() {
                    Some(only) => source.at(&only.subpath)?,
                    None => {
                        warn!(url = %lease.url, "no SKILL.md found; installing repository root");
                        if warning.is_none() {
                            warning =
                                Some("no SKILL.md found; installed the repository root".into());
                        }
                        source.clone()
                    }
                },
            },
        };

        let skill = self.import_from_lease(&lease, &resolved, name, overwrite)?;
        Ok(GitInstall::Installed { skill, warning })
    }

    /// Install several subpaths of one repository. Each item succeeds or
    /// fails on its own; only a failed checkout fails the whole call.
    pub fn install_git_batch(
        &self,
        source: &GitSource,
        subpaths: &[String],
        overwrite: bool,
    ) -> Result<Vec<BatchItem>> {
        let lease = self
            .git
            .checkout(&source.repo_url, source.branch.as_deref())?;
        if let Some(w) = stale_warning(&lease) {
            warn!("{w}");
        }

        let items = subpaths
            .iter()
            .map(|subpath| {
                let result = source
                    .at(subpath)
                    .and_then(|item| self.import_from_lease(&lease, &item, None, overwrite));
                let outcome = match result {
                    Ok(skill) => BatchOutcome::Installed { skill },
                    Err(e) => {
                        warn!(subpath = %subpath, error = %e, "batch item failed");
                        BatchOutcome::Failed {
                            error: ItemError::from(&e),
                        }
                    }
                };
                BatchItem {
                    subpath: subpath.clone(),
                    outcome,
                }
            })
            .collect();
        Ok(items)
    }

    /// Candidate skills in a repository, without installing anything.
    pub fn list_git_candidates(&self, source: &GitSource) -> Result<Vec<GitCandidate>> {
        let lease = self
            .git
            .checkout(&source.repo_url, source.branch.as_deref())?;
        let root = Self::resolve_in(&lease, source.subpath.as_deref())?;
        Ok(list_candidates(&root, &source.repo_name()))
    }

    fn skill(&self, skill_id: &str) -> Result<SkillRecord> {
        self.store
            .get_skill(skill_id)?
            .ok_or_else(|| HubError::not_found("skill", skill_id))
    }

    /// Re-copy a skill from where it was installed from.
    ///
    /// A vanished source is reported as `SourceMissing` and the managed copy
    /// is kept. Tool directories are not touched; copy targets are listed so
    /// the caller can refresh them.
    pub fn update_skill_from_source(&self, skill_id: &str) -> Result<UpdateResult> {
        let central = self.central.read();
        let _guard = self.lock_skill(&self.skill(skill_id)?.name)?;
        // Re-read under the lock; a concurrent update may have moved on.
        let skill = self.skill(skill_id)?;
        let source_ref = skill.source_ref.clone().ok_or_else(|| {
            HubError::InvalidInput(format!("skill '{}' has no recorded source", skill.name))
        })?;

        let (lease, warning) = match skill.source_type {
            SourceType::Local => (None, None),
            SourceType::Git => {
                let lease = self
                    .git
                    .checkout(&source_ref, skill.source_branch.as_deref())?;
                let warning = stale_warning(&lease);
                (Some(lease), warning)
            }
        };
        let dir = match &lease {
            None => PathBuf::from(&source_ref),
            Some(lease) => Self::resolve_in(lease, skill.source_subpath.as_deref())?,
        };
        if !dir.is_dir() {
            let missing = match &skill.source_subpath {
                Some(sub) if lease.is_some() => format!("{source_ref} ({sub})"),
                _ => source_ref.clone(),
            };
            return Err(HubError::SourceMissing(missing));
        }
        if !central.contains(&skill.central_path) {
            return Err(HubError::PathUnsafe {
                path: skill.central_path.display().to_string(),
                reason: "outside the central repository",
            });
        }

        copy_dir_staged(&dir, &skill.central_path)?;
        let content_hash = hash_dir(&skill.central_path).ok();
        let changed = content_hash != skill.content_hash;
        let revision = lease
            .as_ref()
            .and_then(|l| l.head.clone())
            .or(skill.source_revision.clone());
        let updated = SkillRecord {
            content_hash,
            source_revision: revision.clone(),
            updated_at: now_ms(),
            ..skill
        };
        self.store.upsert_skill(&updated)?;
        drop(lease);

        let copy_targets = self
            .store
            .list_targets(skill_id)?
            .into_iter()
            .filter(|t| t.mode == TargetMode::Copy)
            .map(|t| t.tool)
            .collect();
        info!(skill = %updated.name, changed, "skill updated from source");
        Ok(UpdateResult {
            skill: updated,
            changed,
            revision,
            copy_targets,
            warning,
        })
    }

    /// Remove every target, then the central copy, then the record.
    ///
    /// Target failures do not stop the deletion; they are reported.
    pub fn delete_skill(&self, engine: &SyncEngine, skill_id: &str) -> Result<DeleteReport> {
        let central = self.central.read();
        let guard = self.lock_skill(&self.skill(skill_id)?.name)?;
        let skill = self.skill(skill_id)?;
        let targets = engine.unsync_all(skill_id)?;
        if central.contains(&skill.central_path) {
            remove_path_any(&skill.central_path)?;
        } else {
            warn!(
                path = %skill.central_path.display(),
                "central copy lies outside the repository; leaving it"
            );
        }
        self.store.delete_skill(skill_id)?;
        drop(guard);
        self.skill_locks.prune();
        info!(skill = %skill.name, failed_targets = targets.failed.len(), "skill deleted");
        Ok(DeleteReport {
            skill_id: skill.id,
            name: skill.name,
            targets,
        })
    }

    /// Move the central repository to `new_root`, carrying every managed
    /// skill with it, and remember the new location.
    ///
    /// Installs, updates, and copy refreshes wait until the move is done.
    pub fn relocate_central(&self, new_root: &Path) -> Result<CentralRepo> {
        let mut central = self.central.write();
        let keys: BTreeSet<String> = self
            .store
            .list_skills()?
            .iter()
            .map(|s| central_lock_key(&s.name))
            .collect();
        let _guards = keys
            .iter()
            .map(|k| self.skill_locks.acquire(k, LockPolicy::Wait))
            .collect::<Result<Vec<_>>>()?;

        let next = central.migrate(&self.store, new_root)?;
        settings::set_central_repo_path(&self.store, next.root())?;
        info!(
            from = %central.root().display(),
            to = %next.root().display(),
            skills = keys.len(),
            "central repository relocated"
        );
        *central = next.clone();
        Ok(next)
    }
}
