//! Results returned by installer operations.

use serde::Serialize;
use skillhub_core::HubError;
use skillhub_state::SkillRecord;
use skillhub_sync::TargetsReport;

use crate::candidates::GitCandidate;

/// Result of a git install.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GitInstall {
    Installed {
        skill: SkillRecord,
        /// Set when a stale cached checkout was used.
        warning: Option<String>,
    },
    /// The repository holds several skills; the caller picks subpaths and
    /// installs them with a batch.
    MultipleCandidates {
        repo_url: String,
        branch: Option<String>,
        candidates: Vec<GitCandidate>,
    },
}

/// Failure of one item in a batch, kept as data so the batch can go on.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub code: &'static str,
    pub message: String,
}

impl From<&HubError> for ItemError {
    fn from(err: &HubError) -> Self {
        Self {
            code: err.kind().code(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one subpath in a batch install.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub subpath: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Installed { skill: SkillRecord },
    Failed { error: ItemError },
}

impl BatchItem {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Installed { .. })
    }
}

/// Result of re-importing a skill from its recorded source.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub skill: SkillRecord,
    /// Whether the central content hash moved.
    pub changed: bool,
    /// Git `HEAD` the content came from.
    pub revision: Option<String>,
    /// Tools holding copy targets that need a refresh to see the change.
    pub copy_targets: Vec<String>,
    pub warning: Option<String>,
}

/// Result of deleting a managed skill.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub skill_id: String,
    pub name: String,
    pub targets: TargetsReport,
}
