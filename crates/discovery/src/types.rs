use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A skill directory found in a tool's skills directory that the hub does
/// not manage yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredSkill {
    /// Directory name; the grouping key across tools.
    pub name: String,
    /// Tool key the directory was found under.
    pub tool: String,
    pub path: PathBuf,
    pub is_link: bool,
    pub link_target: Option<PathBuf>,
    /// Filled in by [`crate::build_plan`] for groups with more than one member.
    pub content_hash: Option<String>,
}

/// Outcome of comparing same-named skills across tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Found in a single tool.
    Single,
    /// Found in several tools with identical content.
    Consistent,
    /// Found in several tools with differing content; needs a selection.
    Conflict,
}

/// All variants of one skill name.
#[derive(Debug, Clone, Serialize)]
pub struct SkillGroup {
    pub name: String,
    pub status: GroupStatus,
    pub variants: Vec<DiscoveredSkill>,
}

impl SkillGroup {
    pub fn has_conflict(&self) -> bool {
        self.status == GroupStatus::Conflict
    }

    /// Variant found under `tool`, if any.
    pub fn variant(&self, tool: &str) -> Option<&DiscoveredSkill> {
        self.variants.iter().find(|v| v.tool == tool)
    }
}

/// Take-over plan produced by an onboarding scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OnboardingPlan {
    pub tools_scanned: usize,
    pub skills_found: usize,
    pub groups: Vec<SkillGroup>,
}

impl OnboardingPlan {
    pub fn group(&self, name: &str) -> Option<&SkillGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &SkillGroup> {
        self.groups.iter().filter(|g| g.has_conflict())
    }
}

/// The `name`/`description` fields of a SKILL.md frontmatter block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillFrontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Split content into frontmatter YAML and body.
///
/// Returns `(None, content)` when there is no well-formed `---` block.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed
        .strip_prefix("---\n")
        .or_else(|| trimmed.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

/// Parse SKILL.md frontmatter; malformed YAML yields the default.
pub fn parse_frontmatter(content: &str) -> SkillFrontmatter {
    match split_frontmatter(content) {
        (Some(yaml), _) => serde_yaml::from_str(yaml).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "ignoring malformed frontmatter");
            SkillFrontmatter::default()
        }),
        (None, _) => SkillFrontmatter::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmatter_fields_are_read() {
        let fm = parse_frontmatter("---\nname: pdf\ndescription: Work with PDFs\n---\n# Body\n");
        assert_eq!(fm.name.as_deref(), Some("pdf"));
        assert_eq!(fm.description.as_deref(), Some("Work with PDFs"));
    }

    #[test]
    fn missing_or_broken_frontmatter_is_default() {
        assert_eq!(parse_frontmatter("# Just a heading"), SkillFrontmatter::default());
        assert_eq!(
            parse_frontmatter("---\nname: [unclosed\n---\n"),
            SkillFrontmatter::default()
        );
        let (yaml, body) = split_frontmatter("---\nname: x\nno closing fence");
        assert!(yaml.is_none());
        assert!(body.starts_with("---"));
    }

    #[test]
    fn split_returns_body_after_fence() {
        let (yaml, body) = split_frontmatter("---\r\nname: a\r\n---\r\nhello");
        assert_eq!(yaml, Some("name: a\r\n"));
        assert_eq!(body, "hello");
    }
}
