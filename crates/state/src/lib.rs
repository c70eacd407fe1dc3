//! Persistent state for skillhub.
//!
//! This crate provides:
//! - Environment and path resolution (`env`).
//! - The SQLite store for skills, targets, settings, and discovered skills.
//! - Typed settings accessors with range validation.
//! - The Central Repository Manager.

pub mod central_repo;
pub mod env;
pub mod persistence;
pub mod settings;

pub use central_repo::{central_lock_key, slugify, CentralRepo};
pub use env::{cache_dir, config_file, data_dir, database_path, home_dir};
pub use persistence::{
    DiscoveredRecord, SkillRecord, SkillStore, SourceType, TargetMode, TargetRecord,
};
