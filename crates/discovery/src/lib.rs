//! Tool adapter registry and onboarding scanner.
//!
//! This crate provides:
//! - The static table of supported tools and where each keeps its skills.
//! - Scanning of tool directories for skills the hub does not manage yet.
//! - Grouping of discovered skills by name with content-hash conflict detection.
//!
//! # Examples
//!
//! ```
//! use skillhub_discovery::{build_plan, scan_all_tools, ScanOptions, ToolRegistry};
//! use tempfile::tempdir;
//!
//! let home = tempdir().unwrap();
//! let skill = home.path().join(".claude/skills/alpha");
//! std::fs::create_dir_all(&skill).unwrap();
//! std::fs::write(skill.join("SKILL.md"), "# Alpha").unwrap();
//!
//! let registry = ToolRegistry::new(home.path());
//! let plan = build_plan(scan_all_tools(&registry, &ScanOptions::default()));
//! assert_eq!(plan.skills_found, 1);
//! assert_eq!(plan.groups[0].name, "alpha");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Onboarding scan and plan building.
pub mod scanner;
/// Tool adapter table and registry.
#[allow(missing_docs)]
pub mod tools;
/// Discovered skill, group, and frontmatter types.
#[allow(missing_docs)]
pub mod types;

pub use scanner::{build_plan, scan_all_tools, scan_tool_dir, ScanOptions, ScanResult};
pub use tools::{default_adapters, SyncPolicy, ToolAdapter, ToolRegistry, ToolStatus};
pub use types::{
    parse_frontmatter, split_frontmatter, DiscoveredSkill, GroupStatus, OnboardingPlan,
    SkillFrontmatter, SkillGroup,
};
