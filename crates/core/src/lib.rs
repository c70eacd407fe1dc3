//! Shared primitives for the skillhub workspace.
//!
//! Every crate that touches the central repository or a tool's skills
//! directory goes through the helpers here:
//! - [`paths`] rejects relative paths that could escape their base.
//! - [`hash`] computes stable directory digests for conflict detection.
//! - [`fsops`] copies, stages, and removes skill directories.
//! - [`locks`] serializes work per skill or per cache key.
//!
//! # Examples
//!
//! ```
//! use skillhub_core::paths::safe_join;
//! use std::path::Path;
//!
//! let base = Path::new("/tmp/tools/cursor/skills");
//! assert!(safe_join(base, "my-skill").is_ok());
//! assert!(safe_join(base, "../escape").is_err());
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod fsops;
pub mod hash;
pub mod locks;
pub mod paths;

pub use error::{ErrorKind, HubError, IoContext, Result};
pub use fsops::{
    copy_dir_recursive, copy_dir_staged, inspect_path, remove_path_any, CopyStats, PathKind,
};
pub use hash::hash_dir;
pub use locks::{KeyedLocks, LockGuard, LockPolicy};
pub use paths::{is_safe_relative, safe_child, safe_join};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, saturating to zero on clock skew.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
