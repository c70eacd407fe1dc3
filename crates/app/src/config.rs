//! Configuration file support for skillhub.
//!
//! Loads settings from `~/.skillhub/config.toml` with the following precedence:
//! CLI arguments > environment variables > config file > stored settings.
//!
//! ## Configuration File Format
//!
//! ```toml
//! # ~/.skillhub/config.toml
//!
//! [storage]
//! # Where managed skills live (defaults to ~/.skillhub/skills)
//! central_repo = "/data/skills"
//!
//! [git]
//! timeout_secs = 60
//! fetch_timeout_secs = 45
//! git_bin = "/usr/local/bin/git"
//! allow_libgit2_fallback = false
//!
//! [sync]
//! # Tools that always receive copies instead of links
//! force_copy = ["windsurf"]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use skillhub_state::env::{
    ENV_ALLOW_LIBGIT2_FALLBACK, ENV_CENTRAL_REPO, ENV_FORCE_COPY_TOOLS, ENV_GIT_BIN,
    ENV_GIT_FETCH_TIMEOUT_SECS, ENV_GIT_TIMEOUT_SECS,
};
use std::path::Path;

/// Top-level configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub git: GitSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Central repository root.
    pub central_repo: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GitSection {
    /// Clone ceiling in seconds.
    pub timeout_secs: Option<u64>,
    /// Fetch/refresh ceiling in seconds.
    pub fetch_timeout_secs: Option<u64>,
    pub git_bin: Option<String>,
    pub allow_libgit2_fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncSection {
    #[serde(default)]
    pub force_copy: Vec<String>,
}

/// Loads the configuration file at `path` if it exists.
///
/// Returns `Ok(None)` if the file doesn't exist and `Err` if it exists but
/// fails to parse.
pub fn load_config_from(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("parse {}", path.display()))?;
    tracing::debug!(
        target: "skillhub::config",
        path = %path.display(),
        "loaded configuration file"
    );
    Ok(Some(config))
}

/// Loads `~/.skillhub/config.toml` if it exists.
pub fn load_config() -> Result<Option<Config>> {
    load_config_from(&skillhub_state::config_file()?)
}

/// Applies the config file to environment variables.
///
/// Only sets variables that are not already set, preserving the precedence
/// CLI > ENV > config file. Call early during startup, before the context
/// is built. A malformed file is reported and otherwise ignored.
pub fn apply_config_to_env() {
    match load_config() {
        Ok(Some(config)) => apply(&config),
        Ok(None) => {}
        Err(e) => tracing::warn!(target: "skillhub::config", error = %format!("{e:#}"), "ignoring config file"),
    }
}

fn set_if_absent(key: &str, value: &str) {
    if std::env::var_os(key).is_none() {
        std::env::set_var(key, value);
        tracing::trace!(target: "skillhub::config", key, "set environment variable from config file");
    }
}

fn apply(config: &Config) {
    if let Some(ref repo) = config.storage.central_repo {
        set_if_absent(ENV_CENTRAL_REPO, repo);
    }
    if let Some(secs) = config.git.timeout_secs {
        set_if_absent(ENV_GIT_TIMEOUT_SECS, &secs.to_string());
    }
    if let Some(secs) = config.git.fetch_timeout_secs {
        set_if_absent(ENV_GIT_FETCH_TIMEOUT_SECS, &secs.to_string());
    }
    if let Some(ref bin) = config.git.git_bin {
        set_if_absent(ENV_GIT_BIN, bin);
    }
    if let Some(allow) = config.git.allow_libgit2_fallback {
        set_if_absent(
            ENV_ALLOW_LIBGIT2_FALLBACK,
            if allow { "true" } else { "false" },
        );
    }
    if !config.sync.force_copy.is_empty() {
        set_if_absent(ENV_FORCE_COPY_TOOLS, &config.sync.force_copy.join(","));
    }
}
