//! Sync engine for skillhub.
//!
//! Projects skills from the central repository into each tool's skills
//! directory, as a link where the tool and filesystem allow it and as a copy
//! otherwise. Every target is recorded in the store, and the record decides
//! whether a destination is ours to touch.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use skillhub_discovery::ToolRegistry;
//! use skillhub_state::SkillStore;
//! use skillhub_sync::{SyncEngine, SyncOptions};
//!
//! # fn main() -> skillhub_core::Result<()> {
//! let store = Arc::new(SkillStore::open_in_memory()?);
//! let registry = Arc::new(ToolRegistry::new("/home/me"));
//! let engine = SyncEngine::new(store, registry);
//! let outcome = engine.sync("skill-id", "claude_code", &SyncOptions::default())?;
//! println!("{} -> {}", outcome.action.description(), outcome.target_path.display());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod realize;
pub mod report;

pub use engine::{SyncEngine, SyncOptions};
pub use realize::Realization;
pub use report::{SyncAction, SyncOutcome, TargetFailure, TargetsReport, UnsyncOutcome};
