//! Taking over skills that already sit in tool directories.
//!
//! A scan finds unmanaged skill directories and groups them by name. Applying
//! the plan imports one representative per selected group and then syncs
//! every tool that held an identical copy, so the original directories are
//! replaced by managed targets instead of staying behind as duplicates.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use skillhub_core::{now_ms, HubError, Result};
use skillhub_discovery::{
    build_plan, scan_all_tools, DiscoveredSkill, GroupStatus, OnboardingPlan, ScanOptions,
    SkillGroup, ToolRegistry,
};
use skillhub_state::{DiscoveredRecord, SkillRecord, SkillStore};
use skillhub_sync::{SyncEngine, SyncOptions, SyncOutcome, TargetFailure};
use tracing::{info, warn};

use crate::installer::Installer;
use crate::types::ItemError;

/// Scan every installed tool, persist the findings, and build a plan.
///
/// The central repository, the data directory, and recorded target paths
/// are excluded so the hub never rediscovers its own content.
pub fn scan_onboarding(
    registry: &ToolRegistry,
    store: &SkillStore,
    exclude_roots: Vec<PathBuf>,
) -> Result<OnboardingPlan> {
    let opts = ScanOptions {
        exclude_roots,
        managed_paths: store.all_target_paths()?.into_iter().collect(),
    };
    let plan = build_plan(scan_all_tools(registry, &opts));

    let found_at = now_ms();
    let rows: Vec<DiscoveredRecord> = plan
        .groups
        .iter()
        .flat_map(|g| g.variants.iter())
        .map(|v| DiscoveredRecord {
            name: v.name.clone(),
            tool: v.tool.clone(),
            path: v.path.clone(),
            content_hash: v.content_hash.clone(),
            is_link: v.is_link,
            link_target: v.link_target.clone(),
            found_at,
        })
        .collect();
    store.replace_discovered(&rows)?;
    info!(
        tools = plan.tools_scanned,
        skills = plan.skills_found,
        groups = plan.groups.len(),
        conflicts = plan.conflicts().count(),
        "onboarding scan complete"
    );
    Ok(plan)
}

/// A group the caller wants imported, optionally naming the tool whose
/// variant becomes canonical. Conflicting groups require the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub group: String,
    pub tool: Option<String>,
}

impl Selection {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: name.into(),
            tool: None,
        }
    }

    pub fn variant(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            group: name.into(),
            tool: Some(tool.into()),
        }
    }

    /// Parse `name` or `name=tool`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('=') {
            Some((name, tool)) if !tool.trim().is_empty() => {
                Self::variant(name.trim(), tool.trim())
            }
            Some((name, _)) => Self::group(name.trim()),
            None => Self::group(raw.trim()),
        }
    }
}

/// What happened to one selected group.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    Imported {
        skill: SkillRecord,
        synced: Vec<SyncOutcome>,
        /// Variants whose content differs from the chosen one; left unmanaged.
        left_unmanaged: Vec<String>,
        failures: Vec<TargetFailure>,
    },
    /// A conflicting group was selected without naming a variant; nothing
    /// was touched.
    NeedsSelection { tools: Vec<String> },
    Failed { error: ItemError },
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: GroupOutcome,
}

/// Result of applying an onboarding plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub groups: Vec<GroupReport>,
}

impl ImportResult {
    pub fn imported(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Imported { .. }))
            .count()
    }
}

fn pick_representative<'a>(
    group: &'a SkillGroup,
    selection: &Selection,
) -> std::result::Result<&'a DiscoveredSkill, GroupOutcome> {
    match (&selection.tool, group.status) {
        (Some(tool), _) => group.variant(tool).ok_or_else(|| GroupOutcome::Failed {
            error: ItemError::from(&HubError::not_found(
                "variant",
                format!("{}={tool}", group.name),
            )),
        }),
        (None, GroupStatus::Conflict) => Err(GroupOutcome::NeedsSelection {
            tools: group.variants.iter().map(|v| v.tool.clone()).collect(),
        }),
        (None, _) => group.variants.first().ok_or_else(|| GroupOutcome::Failed {
            error: ItemError::from(&HubError::not_found("variant", group.name.clone())),
        }),
    }
}

fn same_content(group: &SkillGroup, rep: &DiscoveredSkill, other: &DiscoveredSkill) -> bool {
    match group.status {
        GroupStatus::Single | GroupStatus::Consistent => true,
        GroupStatus::Conflict => other.content_hash.is_some() && other.content_hash == rep.content_hash,
    }
}

fn apply_group(
    installer: &Installer,
    engine: &SyncEngine,
    group: &SkillGroup,
    rep: &DiscoveredSkill,
) -> GroupOutcome {
    let skill = match installer.install_local_skill(&rep.path, Some(&group.name), false) {
        Ok(skill) => skill,
        Err(e) => {
            warn!(group = %group.name, error = %e, "import failed");
            return GroupOutcome::Failed {
                error: ItemError::from(&e),
            };
        }
    };

    // The representative's tool goes first; a link elsewhere that points
    // at its old directory then resolves to the central copy and is adopted.
    let mut order: Vec<&DiscoveredSkill> = vec![rep];
    order.extend(group.variants.iter().filter(|v| v.tool != rep.tool));

    let mut synced = Vec::new();
    let mut failures = Vec::new();
    let mut left_unmanaged = Vec::new();
    let mut seen = HashSet::new();
    for variant in order {
        if !seen.insert(variant.tool.as_str()) {
            continue;
        }
        if !same_content(group, rep, variant) {
            left_unmanaged.push(variant.tool.clone());
            continue;
        }
        match engine.sync(&skill.id, &variant.tool, &SyncOptions::overwrite()) {
            Ok(outcome) => synced.push(outcome),
            Err(e) => {
                warn!(group = %group.name, tool = %variant.tool, error = %e, "sync failed");
                failures.push(TargetFailure {
                    tool: variant.tool.clone(),
                    code: e.kind().code(),
                    message: e.to_string(),
                });
            }
        }
    }
    info!(
        group = %group.name,
        synced = synced.len(),
        left_unmanaged = left_unmanaged.len(),
        "group imported"
    );
    GroupOutcome::Imported {
        skill,
        synced,
        left_unmanaged,
        failures,
    }
}

/// Import the selected groups of `plan`.
///
/// Groups not selected are left alone, as is a conflicting group selected
/// without a variant. One group failing does not stop the others.
pub fn apply_plan(
    installer: &Installer,
    engine: &SyncEngine,
    plan: &OnboardingPlan,
    selections: &[Selection],
) -> Result<ImportResult> {
    let mut result = ImportResult::default();
    for selection in selections {
        let Some(group) = plan.group(&selection.group) else {
            result.groups.push(GroupReport {
                name: selection.group.clone(),
                outcome: GroupOutcome::Failed {
                    error: ItemError::from(&HubError::not_found(
                        "onboarding group",
                        selection.group.clone(),
                    )),
                },
            });
            continue;
        };
        let outcome = match pick_representative(group, selection) {
            Ok(rep) => apply_group(installer, engine, group, rep),
            Err(outcome) => outcome,
        };
        result.groups.push(GroupReport {
            name: group.name.clone(),
            outcome,
        });
    }
    Ok(result)
}
