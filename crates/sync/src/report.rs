//! Outcome types reported by the sync engine.

use serde::Serialize;
use skillhub_state::TargetMode;
use std::path::PathBuf;

/// What a single `sync` call did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Destination was absent and has been created.
    Created,
    /// Recorded target already matched; only `synced_at` moved.
    Unchanged,
    /// Recorded target was realized in the other mode and has been recreated.
    Migrated,
    /// An unmanaged entry was replaced because overwrite was requested.
    Replaced,
    /// An existing link already pointed at the central copy and was recorded as is.
    Adopted,
    /// On-disk drift from the recorded target was repaired.
    Repaired,
    /// A copy target was re-copied from the central repository.
    Refreshed,
}

impl SyncAction {
    /// Returns a human-readable description of the action.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Unchanged => "already in sync",
            Self::Migrated => "migrated to the tool's sync mode",
            Self::Replaced => "replaced existing entry",
            Self::Adopted => "adopted existing link",
            Self::Repaired => "repaired drifted target",
            Self::Refreshed => "refreshed copy",
        }
    }

    /// Whether the filesystem was touched.
    pub fn mutated(&self) -> bool {
        !matches!(self, Self::Unchanged | Self::Adopted)
    }
}

/// Result of syncing one skill into one tool.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub skill_id: String,
    pub tool: String,
    pub action: SyncAction,
    /// Mode actually achieved.
    pub mode: TargetMode,
    pub target_path: PathBuf,
    /// True when linking was wanted but copying was used instead.
    pub fell_back: bool,
    pub synced_at: i64,
}

/// Result of removing a target.
#[derive(Debug, Clone, Serialize)]
pub struct UnsyncOutcome {
    pub skill_id: String,
    pub tool: String,
    pub target_path: PathBuf,
    /// Whether anything was deleted from disk.
    pub removed_from_disk: bool,
    /// Set when the on-disk entry no longer looked like ours and was left alone.
    pub warning: Option<String>,
}

/// Per-tool failure collected by multi-target operations.
#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub tool: String,
    pub code: &'static str,
    pub message: String,
}

/// Summary of an operation spanning every target of one skill.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetsReport {
    pub succeeded: Vec<String>,
    pub warnings: Vec<String>,
    pub failed: Vec<TargetFailure>,
}

impl TargetsReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }

    /// Generates a one-line summary for display.
    pub fn format_summary(&self, verb: &str) -> String {
        format!(
            "{} {} target(s), {} warning(s), {} failure(s)",
            verb,
            self.succeeded.len(),
            self.warnings.len(),
            self.failed.len()
        )
    }
}
