use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use skillhub_core::{hash_dir, IoContext, Result};

use crate::tools::{ToolAdapter, ToolRegistry};
use crate::types::{DiscoveredSkill, GroupStatus, OnboardingPlan, SkillGroup};

/// Filters applied while scanning tool directories.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Entries located in (or linking into) these roots are the hub's own
    /// content, e.g. the central repository or the data directory.
    pub exclude_roots: Vec<PathBuf>,
    /// Paths already recorded as targets.
    pub managed_paths: HashSet<PathBuf>,
}

impl ScanOptions {
    fn excludes(&self, skill: &DiscoveredSkill) -> bool {
        if self.managed_paths.contains(&skill.path) {
            return true;
        }
        self.exclude_roots.iter().any(|root| {
            skill.path.starts_with(root)
                || skill
                    .link_target
                    .as_ref()
                    .is_some_and(|t| t.starts_with(root))
        })
    }
}

/// Result of scanning every installed tool.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Tools whose detect marker was present.
    pub tools_scanned: usize,
    /// Unmanaged skills, in tool order.
    pub skills: Vec<DiscoveredSkill>,
}

/// List the immediate skill directories under `dir` for one tool.
///
/// Plain files and the tool's excluded names are skipped; symlinks that
/// resolve to directories are reported with their raw link target.
pub fn scan_tool_dir(adapter: &ToolAdapter, dir: &Path) -> Result<Vec<DiscoveredSkill>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    for entry in fs::read_dir(dir).io_ctx("read dir", dir)? {
        let entry = entry.io_ctx("read dir entry", dir)?;
        let path = entry.path();
        let file_type = entry.file_type().io_ctx("stat", &path)?;
        let is_link = file_type.is_symlink();
        let is_dir = file_type.is_dir() || (is_link && path.is_dir());
        if !is_dir {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if adapter.excluded_names.contains(&name.as_str()) {
            continue;
        }
        let link_target = if is_link {
            fs::read_link(&path).ok()
        } else {
            None
        };
        out.push(DiscoveredSkill {
            name,
            tool: adapter.id.to_string(),
            path,
            is_link,
            link_target,
            content_hash: None,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// Scan every tool that appears installed.
///
/// A tool directory that cannot be read is logged and skipped so one broken
/// tool does not hide the others.
pub fn scan_all_tools(registry: &ToolRegistry, opts: &ScanOptions) -> ScanResult {
    let mut result = ScanResult::default();
    for adapter in registry.adapters() {
        if !registry.detect(adapter) {
            continue;
        }
        result.tools_scanned += 1;
        let dir = registry.skills_dir(adapter);
        match scan_tool_dir(adapter, &dir) {
            Ok(found) => {
                let before = found.len();
                let kept: Vec<_> = found.into_iter().filter(|s| !opts.excludes(s)).collect();
                tracing::debug!(
                    tool = adapter.id,
                    found = before,
                    kept = kept.len(),
                    "scanned tool directory"
                );
                result.skills.extend(kept);
            }
            Err(e) => {
                tracing::warn!(tool = adapter.id, path = %dir.display(), error = %e, "skipping unreadable tool directory");
            }
        }
    }
    result
}

/// Group discovered skills by name and classify each group.
///
/// Only groups with more than one member are hashed; hashing runs in
/// parallel. A variant whose hash fails is reported without one and does
/// not count toward the distinct-content tally.
pub fn build_plan(scan: ScanResult) -> OnboardingPlan {
    let skills_found = scan.skills.len();
    let mut grouped: BTreeMap<String, Vec<DiscoveredSkill>> = BTreeMap::new();
    for skill in scan.skills {
        grouped.entry(skill.name.clone()).or_default().push(skill);
    }

    let mut groups: Vec<SkillGroup> = grouped
        .into_iter()
        .map(|(name, variants)| SkillGroup {
            name,
            status: GroupStatus::Single,
            variants,
        })
        .collect();

    groups
        .par_iter_mut()
        .filter(|g| g.variants.len() > 1)
        .for_each(|group| {
            for v in group.variants.iter_mut() {
                v.content_hash = match hash_dir(&v.path) {
                    Ok(h) => Some(h),
                    Err(e) => {
                        tracing::warn!(path = %v.path.display(), error = %e, "failed to hash skill");
                        None
                    }
                };
            }
            let distinct: HashSet<&str> = group
                .variants
                .iter()
                .filter_map(|v| v.content_hash.as_deref())
                .collect();
            group.status = if distinct.len() > 1 {
                GroupStatus::Conflict
            } else {
                GroupStatus::Consistent
            };
        });

    OnboardingPlan {
        tools_scanned: scan.tools_scanned,
        skills_found,
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::default_adapters;
    use skillhub_test_utils::write_skill;
    use tempfile::tempdir;

    fn codex() -> &'static ToolAdapter {
        default_adapters().iter().find(|a| a.id == "codex").unwrap()
    }

    #[test]
    fn scan_skips_files_and_excluded_names() {
        let tmp = tempdir().unwrap();
        write_skill(tmp.path(), "alpha", "# a").unwrap();
        write_skill(tmp.path(), ".system", "# internal").unwrap();
        fs::write(tmp.path().join("README.md"), "not a skill").unwrap();

        let found = scan_tool_dir(codex(), tmp.path()).unwrap();
        let names: Vec<_> = found.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha"]);
        assert_eq!(found[0].tool, "codex");
        assert!(!found[0].is_link);
    }

    #[test]
    fn scan_of_missing_dir_is_empty() {
        let tmp = tempdir().unwrap();
        assert!(scan_tool_dir(codex(), &tmp.path().join("nope"))
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_skill_reports_target() {
        let tmp = tempdir().unwrap();
        let real = write_skill(&tmp.path().join("elsewhere"), "beta", "# b").unwrap();
        let dir = tmp.path().join("tool");
        fs::create_dir_all(&dir).unwrap();
        std::os::unix::fs::symlink(&real, dir.join("beta")).unwrap();

        let found = scan_tool_dir(codex(), &dir).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_link);
        assert_eq!(found[0].link_target.as_deref(), Some(real.as_path()));
    }

    #[test]
    fn exclude_roots_and_managed_paths_filter_entries() {
        let opts = ScanOptions {
            exclude_roots: vec![PathBuf::from("/hub")],
            managed_paths: [PathBuf::from("/t/managed")].into_iter().collect(),
        };
        let mk = |path: &str, target: Option<&str>| DiscoveredSkill {
            name: "x".into(),
            tool: "codex".into(),
            path: PathBuf::from(path),
            is_link: target.is_some(),
            link_target: target.map(PathBuf::from),
            content_hash: None,
        };
        assert!(opts.excludes(&mk("/t/managed", None)));
        assert!(opts.excludes(&mk("/hub/skills/x", None)));
        assert!(opts.excludes(&mk("/t/x", Some("/hub/skills/x"))));
        assert!(!opts.excludes(&mk("/t/x", None)));
    }

    #[test]
    fn single_groups_are_not_hashed() {
        let tmp = tempdir().unwrap();
        let path = write_skill(tmp.path(), "solo", "# s").unwrap();
        let plan = build_plan(ScanResult {
            tools_scanned: 1,
            skills: vec![DiscoveredSkill {
                name: "solo".into(),
                tool: "codex".into(),
                path,
                is_link: false,
                link_target: None,
                content_hash: None,
            }],
        });
        let group = plan.group("solo").unwrap();
        assert_eq!(group.status, GroupStatus::Single);
        assert!(group.variants[0].content_hash.is_none());
    }
}
