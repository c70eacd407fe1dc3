//! Installer for skillhub.
//!
//! Brings skills under central-repository management from local folders or
//! git repositories (always through the fetch cache, so the central
//! repository never holds a `.git` directory), re-imports them from their
//! recorded source, and applies onboarding plans that take over skills
//! already present in tool directories.

#![deny(unsafe_code)]

pub mod candidates;
pub mod installer;
pub mod onboarding;
pub mod source;
pub mod types;

pub use candidates::{detect_layout, list_candidates, GitCandidate, RepoLayout, SKILL_FILE};
pub use installer::Installer;
pub use onboarding::{
    apply_plan, scan_onboarding, GroupOutcome, GroupReport, ImportResult, Selection,
};
pub use source::GitSource;
pub use types::{BatchItem, BatchOutcome, DeleteReport, GitInstall, ItemError, UpdateResult};
