use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DATA_DIR: &str = "SKILLHUB_DATA_DIR";
pub const ENV_CACHE_DIR: &str = "SKILLHUB_CACHE_DIR";
pub const ENV_CENTRAL_REPO: &str = "SKILLHUB_CENTRAL_REPO";
pub const ENV_GIT_BIN: &str = "SKILLHUB_GIT_BIN";
pub const ENV_GIT_TIMEOUT_SECS: &str = "SKILLHUB_GIT_TIMEOUT_SECS";
pub const ENV_GIT_FETCH_TIMEOUT_SECS: &str = "SKILLHUB_GIT_FETCH_TIMEOUT_SECS";
pub const ENV_ALLOW_LIBGIT2_FALLBACK: &str = "SKILLHUB_ALLOW_LIBGIT2_FALLBACK";
pub const ENV_FORCE_COPY_TOOLS: &str = "SKILLHUB_FORCE_COPY_TOOLS";

const DEFAULT_GIT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_GIT_FETCH_TIMEOUT_SECS: u64 = 45;

/// Returns the user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    #[cfg(unix)]
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("home directory not found"))
}

/// Directory holding the database and, by default, the central repository.
///
/// `SKILLHUB_DATA_DIR` wins; otherwise `~/.skillhub`.
pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = env_path(ENV_DATA_DIR) {
        return Ok(dir);
    }
    Ok(home_dir()?.join(".skillhub"))
}

/// Platform cache directory, overridable with `SKILLHUB_CACHE_DIR`.
pub fn cache_dir() -> Result<PathBuf> {
    if let Some(dir) = env_path(ENV_CACHE_DIR) {
        return Ok(dir);
    }
    match dirs::cache_dir() {
        Some(dir) => Ok(dir),
        None => Ok(home_dir()?.join(".cache")),
    }
}

/// Path of the SQLite database.
pub fn database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("skillhub.db"))
}

/// Path of the optional TOML config file.
pub fn config_file() -> Result<PathBuf> {
    Ok(home_dir()?.join(".skillhub/config.toml"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

/// Central repository override from `SKILLHUB_CENTRAL_REPO`.
pub fn env_central_repo() -> Option<PathBuf> {
    env_path(ENV_CENTRAL_REPO)
}

/// Explicit git binary from `SKILLHUB_GIT_BIN`.
pub fn env_git_bin() -> Option<PathBuf> {
    env_path(ENV_GIT_BIN)
}

/// Ceiling for clone operations.
pub fn git_clone_timeout() -> Duration {
    env_secs(ENV_GIT_TIMEOUT_SECS, DEFAULT_GIT_TIMEOUT_SECS)
}

/// Ceiling for fetch/refresh operations.
pub fn git_fetch_timeout() -> Duration {
    env_secs(ENV_GIT_FETCH_TIMEOUT_SECS, DEFAULT_GIT_FETCH_TIMEOUT_SECS)
}

/// Checks if `SKILLHUB_ALLOW_LIBGIT2_FALLBACK` is set to true.
pub fn env_allow_libgit2_fallback() -> bool {
    env_flag(ENV_ALLOW_LIBGIT2_FALLBACK)
}

/// Tool keys forced to copy mode via `SKILLHUB_FORCE_COPY_TOOLS` (comma separated).
pub fn env_force_copy_tools() -> Vec<String> {
    std::env::var(ENV_FORCE_COPY_TOOLS)
        .map(|s| split_list(&s))
        .unwrap_or_default()
}

/// Split a comma list into trimmed, non-empty, lowercase keys.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
