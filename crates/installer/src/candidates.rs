//! Which directories of a checkout are installable skills.
//!
//! A checkout whose root holds `SKILL.md` is a single skill. Otherwise the
//! candidates are depth-1 directories holding `SKILL.md`, plus the same one
//! level inside a top-level `skills/` container.

use std::fs;
use std::path::Path;

use serde::Serialize;
use skillhub_discovery::parse_frontmatter;

/// Entry file that marks a directory as a skill.
pub const SKILL_FILE: &str = "SKILL.md";
/// Conventional container directory for multi-skill repositories.
pub const SKILLS_CONTAINER: &str = "skills";

/// One installable directory inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitCandidate {
    /// Path relative to the repository root, `/`-separated; empty for the
    /// root itself.
    pub subpath: String,
    /// Frontmatter `name`, else the directory name.
    pub name: String,
    pub description: Option<String>,
}

/// How a checkout is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoLayout {
    /// The repository root is itself a skill.
    RootSkill(GitCandidate),
    /// Zero or more skills below the root.
    Candidates(Vec<GitCandidate>),
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn describe(dir: &Path, subpath: String, fallback: &str) -> GitCandidate {
    let front = fs::read_to_string(dir.join(SKILL_FILE))
        .map(|c| parse_frontmatter(&c))
        .unwrap_or_default();
    GitCandidate {
        subpath,
        name: front
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string()),
        description: front.description,
    }
}

fn children_with_skill(dir: &Path, prefix: &str, out: &mut Vec<GitCandidate>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if is_hidden(&name) || !path.is_dir() || !path.join(SKILL_FILE).is_file() {
            continue;
        }
        out.push(describe(&path, format!("{prefix}{name}"), &name));
    }
}

/// Classify a checkout rooted at `root`.
pub fn detect_layout(root: &Path, repo_name: &str) -> RepoLayout {
    if root.join(SKILL_FILE).is_file() {
        return RepoLayout::RootSkill(describe(root, String::new(), repo_name));
    }
    let mut found = Vec::new();
    children_with_skill(root, "", &mut found);
    let container = root.join(SKILLS_CONTAINER);
    if container.is_dir() {
        children_with_skill(&container, &format!("{SKILLS_CONTAINER}/"), &mut found);
    }
    found.sort_by(|a, b| a.subpath.cmp(&b.subpath));
    RepoLayout::Candidates(found)
}

/// Flat candidate list; a root skill is reported as the only candidate.
pub fn list_candidates(root: &Path, repo_name: &str) -> Vec<GitCandidate> {
    match detect_layout(root, repo_name) {
        RepoLayout::RootSkill(c) => vec![c],
        RepoLayout::Candidates(list) => list,
    }
}
