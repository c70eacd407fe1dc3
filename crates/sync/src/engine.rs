//! Per (skill, tool) reconciliation between the store and tool directories.
//!
//! The store is authoritative: a destination counts as ours only when a
//! target row records it. Anything else already sitting at a destination is
//! a conflict until the caller explicitly asks to overwrite it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use skillhub_core::{
    hash_dir, inspect_path, now_ms, remove_path_any, safe_child, HubError, KeyedLocks, LockPolicy,
    PathKind, Result,
};
use skillhub_discovery::{SyncPolicy, ToolAdapter, ToolRegistry};
use skillhub_state::{central_lock_key, SkillRecord, SkillStore, TargetMode, TargetRecord};
use tracing::{debug, info, warn};

use crate::realize::{self, Found, LinkError, Realization};
use crate::report::{SyncAction, SyncOutcome, TargetFailure, TargetsReport, UnsyncOutcome};

/// Knobs for a single `sync` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Replace an unmanaged entry already sitting at the destination.
    pub overwrite: bool,
    /// Wait for, or fail fast on, a concurrent sync of the same pair.
    pub lock: LockPolicy,
    /// Re-inspect the destination even when the recorded target matches, and
    /// repair it if it drifted.
    pub verify_on_disk: bool,
}

impl SyncOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drift {
    InSync,
    // Missing, or a link or copy of ours in the wrong shape.
    Repairable,
    // Something the engine did not put there.
    Foreign,
}

struct Step {
    action: SyncAction,
    mode: TargetMode,
    fell_back: bool,
}

type LinkFn = fn(&Path, &Path) -> std::result::Result<Realization, LinkError>;

/// Projects central skills into tool directories.
pub struct SyncEngine {
    store: Arc<SkillStore>,
    registry: Arc<ToolRegistry>,
    locks: KeyedLocks,
    // Shared with the installer; held while copying out of a central dir.
    skill_locks: Arc<KeyedLocks>,
    link: LinkFn,
    // Tools whose directory refused a link; copy from then on.
    link_unavailable: Mutex<HashSet<String>>,
}

fn lock_key(skill_id: &str, tool: &str) -> String {
    format!("{skill_id}/{tool}")
}

impl SyncEngine {
    pub fn new(store: Arc<SkillStore>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            store,
            registry,
            locks: KeyedLocks::new(),
            skill_locks: Arc::new(KeyedLocks::new()),
            link: realize::link_into_place,
            link_unavailable: Mutex::new(HashSet::new()),
        }
    }

    /// Serialize copy refreshes with writers of the central repository.
    pub fn with_skill_locks(mut self, locks: Arc<KeyedLocks>) -> Self {
        self.skill_locks = locks;
        self
    }

    #[cfg(test)]
    fn with_link_fn(mut self, link: LinkFn) -> Self {
        self.link = link;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SkillStore {
        &self.store
    }

    fn skill(&self, skill_id: &str) -> Result<SkillRecord> {
        self.store
            .get_skill(skill_id)?
            .ok_or_else(|| HubError::not_found("skill", skill_id))
    }

    fn recorded(&self, skill_id: &str, tool: &str) -> Result<TargetRecord> {
        self.store
            .get_target(skill_id, tool)?
            .ok_or_else(|| HubError::not_found("target", lock_key(skill_id, tool)))
    }

    /// Where `skill` lands inside `adapter`'s skills directory.
    pub fn destination(&self, skill: &SkillRecord, adapter: &ToolAdapter) -> Result<PathBuf> {
        safe_child(&self.registry.skills_dir(adapter), &skill.name)
    }

    fn central_source(skill: &SkillRecord) -> Result<&Path> {
        if skill.central_path.is_dir() {
            Ok(&skill.central_path)
        } else {
            Err(HubError::SourceMissing(
                skill.central_path.display().to_string(),
            ))
        }
    }

    /// Returns `None` when the tool's directory refuses links. The refusal is
    /// remembered and logged once per tool.
    fn try_link(&self, tool: &str, source: &Path, dest: &Path) -> Result<Option<TargetMode>> {
        if self.link_unavailable.lock().contains(tool) {
            return Ok(None);
        }
        match (self.link)(source, dest) {
            Ok(made) => Ok(Some(made.mode())),
            Err(LinkError::Unsupported(err)) => {
                if self.link_unavailable.lock().insert(tool.to_string()) {
                    warn!(tool, error = %err, "links unavailable, falling back to copy");
                }
                Ok(None)
            }
            Err(LinkError::Failed(err)) => Err(err),
        }
    }

    fn realize(
        &self,
        tool: &str,
        source: &Path,
        dest: &Path,
        want_link: bool,
    ) -> Result<(TargetMode, bool)> {
        if want_link {
            if let Some(mode) = self.try_link(tool, source, dest)? {
                return Ok((mode, false));
            }
        }
        realize::copy_into_place(source, dest)?;
        Ok((TargetMode::Copy, want_link))
    }

    fn drift(record: &TargetRecord, source: &Path) -> Result<Drift> {
        let found = realize::classify(
            &record.target_path,
            Some(source),
            record.content_hash.as_deref(),
        )?;
        Ok(match found {
            Found::Missing | Found::Dangling => Drift::Repairable,
            Found::Ours(made) if made.mode().is_link() == record.mode.is_link() => Drift::InSync,
            Found::Ours(_) => Drift::Repairable,
            Found::Foreign => Drift::Foreign,
        })
    }

    fn reconcile_recorded(
        &self,
        record: &TargetRecord,
        source: &Path,
        want_link: bool,
        opts: &SyncOptions,
    ) -> Result<Step> {
        let dest = &record.target_path;
        if record.mode.is_link() == want_link {
            let drift = if opts.verify_on_disk {
                Self::drift(record, source)?
            } else {
                Drift::InSync
            };
            if drift == Drift::Foreign && !opts.overwrite {
                return Err(HubError::Conflict { path: dest.clone() });
            }
            if drift != Drift::InSync {
                debug!(path = %dest.display(), "recorded target drifted, repairing");
                let (mode, fell_back) = self.realize(&record.tool, source, dest, want_link)?;
                return Ok(Step {
                    action: SyncAction::Repaired,
                    mode,
                    fell_back,
                });
            }
            return Ok(Step {
                action: SyncAction::Unchanged,
                mode: record.mode,
                fell_back: false,
            });
        }

        if want_link {
            // Recorded copy, policy now prefers a link. Keep the copy if the
            // directory still refuses links.
            return Ok(match self.try_link(&record.tool, source, dest)? {
                Some(mode) => Step {
                    action: SyncAction::Migrated,
                    mode,
                    fell_back: false,
                },
                None => Step {
                    action: SyncAction::Unchanged,
                    mode: TargetMode::Copy,
                    fell_back: true,
                },
            });
        }

        realize::copy_into_place(source, dest)?;
        Ok(Step {
            action: SyncAction::Migrated,
            mode: TargetMode::Copy,
            fell_back: false,
        })
    }

    fn claim(
        &self,
        tool: &str,
        source: &Path,
        dest: &Path,
        want_link: bool,
        opts: &SyncOptions,
    ) -> Result<Step> {
        let existing = inspect_path(dest)?;
        if let PathKind::Link(target) = &existing {
            if realize::points_at(target, dest, source) {
                if want_link {
                    return Ok(Step {
                        action: SyncAction::Adopted,
                        mode: TargetMode::Symlink,
                        fell_back: false,
                    });
                }
                realize::copy_into_place(source, dest)?;
                return Ok(Step {
                    action: SyncAction::Migrated,
                    mode: TargetMode::Copy,
                    fell_back: false,
                });
            }
        }

        let action = match existing {
            PathKind::Missing => SyncAction::Created,
            _ if opts.overwrite => SyncAction::Replaced,
            _ => {
                return Err(HubError::Conflict {
                    path: dest.to_path_buf(),
                })
            }
        };
        let (mode, fell_back) = self.realize(tool, source, dest, want_link)?;
        Ok(Step {
            action,
            mode,
            fell_back,
        })
    }

    /// Bring one skill's target in `tool` in line with the tool's policy.
    pub fn sync(&self, skill_id: &str, tool: &str, opts: &SyncOptions) -> Result<SyncOutcome> {
        let skill = self.skill(skill_id)?;
        let adapter = self.registry.get(tool)?;
        let _guard = self.locks.acquire(&lock_key(skill_id, tool), opts.lock)?;

        let source = Self::central_source(&skill)?;
        let dest = self.destination(&skill, adapter)?;
        let want_link = adapter.policy == SyncPolicy::PreferLink;

        let previous = self.store.get_target(skill_id, tool)?;
        let step = match &previous {
            Some(record) if record.target_path == dest => {
                self.reconcile_recorded(record, source, want_link, opts)?
            }
            Some(record) => {
                // Recorded under an older name or home; retire it first.
                let (_, warning) = remove_if_ours(record, Some(source))?;
                if let Some(warning) = warning {
                    warn!(skill = %skill.name, tool, "{warning}");
                }
                self.claim(tool, source, &dest, want_link, opts)?
            }
            None => self.claim(tool, source, &dest, want_link, opts)?,
        };

        let content_hash = match previous {
            _ if step.mode.is_link() => None,
            // Nothing was written, so whatever is on disk now is not ours to
            // fingerprint.
            Some(record) if step.action == SyncAction::Unchanged && record.target_path == dest => {
                record.content_hash
            }
            _ => copy_digest(&dest)?,
        };
        let synced_at = now_ms();
        self.store.upsert_target(&TargetRecord {
            skill_id: skill.id.clone(),
            tool: tool.to_string(),
            mode: step.mode,
            target_path: dest.clone(),
            synced_at,
            content_hash,
        })?;

        if step.action.mutated() {
            info!(
                skill = %skill.name,
                tool,
                mode = %step.mode,
                path = %dest.display(),
                "{}",
                step.action.description()
            );
        } else {
            debug!(skill = %skill.name, tool, "{}", step.action.description());
        }

        Ok(SyncOutcome {
            skill_id: skill.id,
            tool: tool.to_string(),
            action: step.action,
            mode: step.mode,
            target_path: dest,
            fell_back: step.fell_back,
            synced_at,
        })
    }

    /// Remove a target's realization and its record.
    ///
    /// What sits at the recorded path is deleted only while it still looks
    /// like ours; otherwise it is left alone and a warning is returned.
    pub fn unsync(&self, skill_id: &str, tool: &str) -> Result<UnsyncOutcome> {
        let _guard = self
            .locks
            .acquire(&lock_key(skill_id, tool), LockPolicy::Wait)?;
        let record = self.recorded(skill_id, tool)?;
        let central = self.store.get_skill(skill_id)?.map(|s| s.central_path);

        let (removed_from_disk, warning) = remove_if_ours(&record, central.as_deref())?;
        if let Some(warning) = &warning {
            warn!(skill_id, tool, "{warning}");
        }
        self.store.delete_target(skill_id, tool)?;
        info!(skill_id, tool, removed_from_disk, "target removed");

        Ok(UnsyncOutcome {
            skill_id: skill_id.to_string(),
            tool: tool.to_string(),
            target_path: record.target_path,
            removed_from_disk,
            warning,
        })
    }

    /// Re-copy the central content over a copy-mode target. Linked targets
    /// read through already and are left untouched.
    pub fn refresh_copy_target(&self, skill_id: &str, tool: &str) -> Result<SyncOutcome> {
        let _central = self.skill_locks.acquire(
            &central_lock_key(&self.skill(skill_id)?.name),
            LockPolicy::Wait,
        )?;
        let skill = self.skill(skill_id)?;
        let _guard = self
            .locks
            .acquire(&lock_key(skill_id, tool), LockPolicy::Wait)?;
        let record = self.recorded(skill_id, tool)?;

        if record.mode.is_link() {
            return Ok(SyncOutcome {
                skill_id: skill.id,
                tool: record.tool,
                action: SyncAction::Unchanged,
                mode: record.mode,
                target_path: record.target_path,
                fell_back: false,
                synced_at: record.synced_at,
            });
        }

        let source = Self::central_source(&skill)?;
        let stats = realize::copy_into_place(source, &record.target_path)?;
        let synced_at = now_ms();
        self.store.upsert_target(&TargetRecord {
            synced_at,
            content_hash: copy_digest(&record.target_path)?,
            ..record.clone()
        })?;
        info!(
            skill = %skill.name,
            tool,
            files = stats.files,
            path = %record.target_path.display(),
            "copy target refreshed"
        );

        Ok(SyncOutcome {
            skill_id: skill.id,
            tool: record.tool,
            action: SyncAction::Refreshed,
            mode: TargetMode::Copy,
            target_path: record.target_path,
            fell_back: false,
            synced_at,
        })
    }

    /// Refresh every copy-mode target of a skill, collecting per-tool failures.
    pub fn refresh_copy_targets(&self, skill_id: &str) -> Result<TargetsReport> {
        let mut report = TargetsReport::default();
        for record in self.store.list_targets(skill_id)? {
            if record.mode.is_link() {
                continue;
            }
            match self.refresh_copy_target(skill_id, &record.tool) {
                Ok(_) => report.succeeded.push(record.tool),
                Err(e) => report.failed.push(failure(record.tool, &e)),
            }
        }
        Ok(report)
    }

    /// Remove every target of a skill, collecting per-tool failures.
    pub fn unsync_all(&self, skill_id: &str) -> Result<TargetsReport> {
        let mut report = TargetsReport::default();
        for record in self.store.list_targets(skill_id)? {
            match self.unsync(skill_id, &record.tool) {
                Ok(outcome) => {
                    if let Some(w) = outcome.warning {
                        report.warnings.push(w);
                    }
                    report.succeeded.push(record.tool);
                }
                Err(e) => report.failed.push(failure(record.tool, &e)),
            }
        }
        self.locks.prune();
        Ok(report)
    }
}

// Digest of a copy as written. A recorded copy the user already deleted has
// nothing to fingerprint.
fn copy_digest(dest: &Path) -> Result<Option<String>> {
    match inspect_path(dest)? {
        PathKind::Dir => Ok(Some(hash_dir(dest)?)),
        _ => Ok(None),
    }
}

fn failure(tool: String, err: &HubError) -> TargetFailure {
    TargetFailure {
        tool,
        code: err.kind().code(),
        message: err.to_string(),
    }
}

/// Delete the realization at a recorded path if it is still ours.
///
/// A link must reach the central copy; a directory must hash to the digest
/// recorded when it was copied, or to the central copy's. Returns whether
/// something was removed and, when the entry was left in place, why.
fn remove_if_ours(record: &TargetRecord, central: Option<&Path>) -> Result<(bool, Option<String>)> {
    let path = &record.target_path;
    let ours = match realize::classify(path, central, record.content_hash.as_deref())? {
        Found::Missing => return Ok((false, None)),
        Found::Dangling => record.mode.is_link(),
        Found::Ours(_) => true,
        Found::Foreign => false,
    };
    if !ours {
        return Ok((
            false,
            Some(format!(
                "{} no longer matches the recorded {} target; left in place",
                path.display(),
                record.mode
            )),
        ));
    }
    remove_path_any(path)?;
    Ok((true, None))
}
