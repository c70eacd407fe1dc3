//! Typed access to the settings keys the hub recognizes.

use std::path::PathBuf;
use std::time::Duration;

use skillhub_core::{HubError, Result};

use crate::env::split_list;
use crate::persistence::SkillStore;

pub const KEY_CENTRAL_REPO_PATH: &str = "central_repo_path";
pub const KEY_GIT_CACHE_CLEANUP_DAYS: &str = "git_cache_cleanup_days";
pub const KEY_GIT_CACHE_TTL_SECS: &str = "git_cache_ttl_secs";
pub const KEY_FORCE_COPY_TOOLS: &str = "force_copy_tools";

pub const DEFAULT_GIT_CACHE_CLEANUP_DAYS: u64 = 30;
pub const MAX_GIT_CACHE_CLEANUP_DAYS: u64 = 3650;
pub const DEFAULT_GIT_CACHE_TTL_SECS: u64 = 60;
pub const MAX_GIT_CACHE_TTL_SECS: u64 = 3600;

/// Every key accepted by `get`/`set`.
pub const KNOWN_KEYS: &[&str] = &[
    KEY_CENTRAL_REPO_PATH,
    KEY_GIT_CACHE_CLEANUP_DAYS,
    KEY_GIT_CACHE_TTL_SECS,
    KEY_FORCE_COPY_TOOLS,
];

fn bounded(store: &SkillStore, key: &str, default: u64, max: u64) -> u64 {
    match store.get_setting(key) {
        Ok(Some(raw)) => match raw.trim().parse::<u64>() {
            Ok(v) if v <= max => v,
            _ => {
                tracing::warn!(key, value = %raw, "ignoring out-of-range setting");
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read setting");
            default
        }
    }
}

fn set_bounded(store: &SkillStore, key: &str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(HubError::InvalidInput(format!(
            "{key} must be between 0 and {max}, got {value}"
        )));
    }
    store.set_setting(key, &value.to_string())?;
    Ok(())
}

/// Age after which cached clones are evicted.
pub fn git_cache_cleanup_days(store: &SkillStore) -> u64 {
    bounded(
        store,
        KEY_GIT_CACHE_CLEANUP_DAYS,
        DEFAULT_GIT_CACHE_CLEANUP_DAYS,
        MAX_GIT_CACHE_CLEANUP_DAYS,
    )
}

pub fn set_git_cache_cleanup_days(store: &SkillStore, days: u64) -> Result<()> {
    set_bounded(
        store,
        KEY_GIT_CACHE_CLEANUP_DAYS,
        days,
        MAX_GIT_CACHE_CLEANUP_DAYS,
    )
}

/// Freshness window for cached clones.
pub fn git_cache_ttl(store: &SkillStore) -> Duration {
    Duration::from_secs(bounded(
        store,
        KEY_GIT_CACHE_TTL_SECS,
        DEFAULT_GIT_CACHE_TTL_SECS,
        MAX_GIT_CACHE_TTL_SECS,
    ))
}

pub fn set_git_cache_ttl_secs(store: &SkillStore, secs: u64) -> Result<()> {
    set_bounded(store, KEY_GIT_CACHE_TTL_SECS, secs, MAX_GIT_CACHE_TTL_SECS)
}

/// Stored central repository override, if any.
pub fn central_repo_path(store: &SkillStore) -> Result<Option<PathBuf>> {
    Ok(store
        .get_setting(KEY_CENTRAL_REPO_PATH)?
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from))
}

pub fn set_central_repo_path(store: &SkillStore, path: &std::path::Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(HubError::InvalidInput(format!(
            "central repository path must be absolute: {}",
            path.display()
        )));
    }
    store.set_setting(KEY_CENTRAL_REPO_PATH, &path.to_string_lossy())?;
    Ok(())
}

/// Tool keys the user forced to copy mode, in addition to built-in policy.
pub fn force_copy_tools(store: &SkillStore) -> Vec<String> {
    store
        .get_setting(KEY_FORCE_COPY_TOOLS)
        .ok()
        .flatten()
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
}

pub fn set_force_copy_tools(store: &SkillStore, tools: &[String]) -> Result<()> {
    let joined = tools
        .iter()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    store.set_setting(KEY_FORCE_COPY_TOOLS, &joined)?;
    Ok(())
}

/// Read a setting as displayed to users, applying defaults.
pub fn get_display(store: &SkillStore, key: &str) -> Result<String> {
    match key {
        KEY_CENTRAL_REPO_PATH => Ok(central_repo_path(store)?
            .map(|p| p.display().to_string())
            .unwrap_or_default()),
        KEY_GIT_CACHE_CLEANUP_DAYS => Ok(git_cache_cleanup_days(store).to_string()),
        KEY_GIT_CACHE_TTL_SECS => Ok(git_cache_ttl(store).as_secs().to_string()),
        KEY_FORCE_COPY_TOOLS => Ok(force_copy_tools(store).join(",")),
        other => Err(unknown_key(other)),
    }
}

/// Validate and store a setting given as text.
pub fn set_from_str(store: &SkillStore, key: &str, value: &str) -> Result<()> {
    let parse_u64 = |v: &str| {
        v.trim()
            .parse::<u64>()
            .map_err(|_| HubError::InvalidInput(format!("{key} expects a number, got '{v}'")))
    };
    match key {
        KEY_CENTRAL_REPO_PATH => set_central_repo_path(store, std::path::Path::new(value.trim())),
        KEY_GIT_CACHE_CLEANUP_DAYS => set_git_cache_cleanup_days(store, parse_u64(value)?),
        KEY_GIT_CACHE_TTL_SECS => set_git_cache_ttl_secs(store, parse_u64(value)?),
        KEY_FORCE_COPY_TOOLS => set_force_copy_tools(store, &split_list(value)),
        other => Err(unknown_key(other)),
    }
}

fn unknown_key(key: &str) -> HubError {
    HubError::InvalidInput(format!(
        "unknown setting '{key}' (known: {})",
        KNOWN_KEYS.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillhub_core::ErrorKind;

    #[test]
    fn defaults_apply_when_unset() {
        let store = SkillStore::open_in_memory().unwrap();
        assert_eq!(git_cache_cleanup_days(&store), 30);
        assert_eq!(git_cache_ttl(&store), Duration::from_secs(60));
        assert!(force_copy_tools(&store).is_empty());
        assert!(central_repo_path(&store).unwrap().is_none());
    }

    #[test]
    fn out_of_range_values_are_rejected_and_ignored() {
        let store = SkillStore::open_in_memory().unwrap();
        let err = set_git_cache_ttl_secs(&store, 3601).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        set_git_cache_ttl_secs(&store, 0).unwrap();
        assert_eq!(git_cache_ttl(&store), Duration::ZERO);

        store.set_setting(KEY_GIT_CACHE_CLEANUP_DAYS, "99999").unwrap();
        assert_eq!(git_cache_cleanup_days(&store), 30);
        store.set_setting(KEY_GIT_CACHE_CLEANUP_DAYS, "soon").unwrap();
        assert_eq!(git_cache_cleanup_days(&store), 30);
    }

    #[test]
    fn text_interface_validates_keys_and_values() {
        let store = SkillStore::open_in_memory().unwrap();
        set_from_str(&store, KEY_GIT_CACHE_CLEANUP_DAYS, "7").unwrap();
        assert_eq!(get_display(&store, KEY_GIT_CACHE_CLEANUP_DAYS).unwrap(), "7");
        set_from_str(&store, KEY_FORCE_COPY_TOOLS, "Codex, goose").unwrap();
        assert_eq!(force_copy_tools(&store), vec!["codex", "goose"]);
        assert!(set_from_str(&store, "nope", "1").is_err());
        assert!(set_from_str(&store, KEY_GIT_CACHE_TTL_SECS, "x").is_err());
        assert!(set_from_str(&store, KEY_CENTRAL_REPO_PATH, "relative/dir").is_err());
    }
}
