//! Git fetch cache for skillhub.
//!
//! - [`url`] normalizes repository references and derives cache keys.
//! - [`client`] defines the [`GitClient`] capability with a system-binary
//!   implementation and an optional libgit2 one.
//! - [`cache`] clones into and refreshes a TTL cache with per-key locking.
//! - [`cleanup`] holds the age-based eviction and temp-directory sweeps.

#![deny(unsafe_code)]

pub mod cache;
pub mod cleanup;
pub mod client;
pub mod url;

pub use cache::{CacheLease, FetchState, GitCache, CACHE_DIR_NAME};
pub use cleanup::{SweepReport, DEFAULT_TEMP_MAX_AGE};
#[cfg(feature = "libgit2")]
pub use client::LibGit2Client;
pub use client::{select_client, GitClient, GitConfig, GitError, SystemGit};
pub use url::{cache_key, normalize_repo_url, parse_tree_url, TreeUrl};
