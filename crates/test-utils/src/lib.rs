//! Shared test utilities for skillhub crates.
//!
//! This crate provides common fixtures used across the workspace: an
//! isolated home with data and cache directories, skill writers, and an
//! environment guard for tests that touch process-global state.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{LazyLock, Mutex, MutexGuard};

/// Serialize tests that mutate process-global state (env vars, cwd, etc).
///
/// Acquire this guard at the start of any test that modifies environment
/// variables to prevent race conditions between parallel tests.
pub fn env_guard() -> MutexGuard<'static, ()> {
    static TEST_SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
    TEST_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for environment variables - restores original value on drop.
pub struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(v) = &self.previous {
            std::env::set_var(self.key, v);
        } else {
            std::env::remove_var(self.key);
        }
    }
}

/// Set an environment variable and return a guard that restores the original on drop.
///
/// # Example
/// ```
/// let _guard = skillhub_test_utils::set_env_var("MY_VAR", Some("value"));
/// // MY_VAR is set to "value" until _guard drops
/// ```
pub fn set_env_var(key: &'static str, value: Option<&str>) -> EnvVarGuard {
    let previous = std::env::var(key).ok();
    if let Some(val) = value {
        std::env::set_var(key, val);
    } else {
        std::env::remove_var(key);
    }
    EnvVarGuard { key, previous }
}

/// Write `<parent>/<name>/SKILL.md` and return the skill directory.
pub fn write_skill(parent: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
    let dir = parent.join(name);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("SKILL.md"), content)?;
    Ok(dir)
}

/// Like [`write_skill`] but with YAML frontmatter.
pub fn write_skill_with_frontmatter(
    parent: &Path,
    name: &str,
    description: &str,
    body: &str,
) -> std::io::Result<PathBuf> {
    let content = format!("---\nname: {name}\ndescription: {description}\n---\n{body}");
    write_skill(parent, name, &content)
}

/// True when a `git` binary runs. Tests needing real git return early otherwise.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Isolated filesystem layout for hub tests.
///
/// The tempdir is cleaned up when this struct is dropped.
pub struct HubFixture {
    pub tempdir: tempfile::TempDir,
    /// Fake `$HOME`; tool directories resolve under it.
    pub home: PathBuf,
    /// Value for `SKILLHUB_DATA_DIR`.
    pub data_dir: PathBuf,
    /// Value for `SKILLHUB_CACHE_DIR`.
    pub cache_dir: PathBuf,
    /// Scratch area for local skill sources.
    pub sources: PathBuf,
}

impl HubFixture {
    /// Create the fixture directories. Does NOT touch the environment;
    /// use [`HubFixture::env_guards`] for that.
    pub fn new() -> std::io::Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let home = tempdir.path().join("home");
        let data_dir = tempdir.path().join("data");
        let cache_dir = tempdir.path().join("cache");
        let sources = tempdir.path().join("sources");
        for dir in [&home, &data_dir, &cache_dir, &sources] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            tempdir,
            home,
            data_dir,
            cache_dir,
            sources,
        })
    }

    /// Central repository path used when no override is configured.
    pub fn central_root(&self) -> PathBuf {
        self.data_dir.join("skills")
    }

    /// Point `HOME`, `SKILLHUB_DATA_DIR`, and `SKILLHUB_CACHE_DIR` at the fixture.
    pub fn env_guards(&self) -> Vec<EnvVarGuard> {
        vec![
            set_env_var("HOME", Some(&self.home.to_string_lossy())),
            set_env_var("SKILLHUB_DATA_DIR", Some(&self.data_dir.to_string_lossy())),
            set_env_var("SKILLHUB_CACHE_DIR", Some(&self.cache_dir.to_string_lossy())),
            set_env_var("SKILLHUB_CENTRAL_REPO", None),
            set_env_var("SKILLHUB_FORCE_COPY_TOOLS", None),
        ]
    }

    /// Create `<home>/<rel>` and return it, e.g. `.claude/skills`.
    pub fn tool_dir(&self, rel: &str) -> std::io::Result<PathBuf> {
        let dir = self.home.join(rel);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write a local skill source under `sources/`.
    pub fn source_skill(&self, name: &str, content: &str) -> std::io::Result<PathBuf> {
        write_skill(&self.sources, name, content)
    }
}
