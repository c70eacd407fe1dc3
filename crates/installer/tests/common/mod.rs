//! Shared harness for installer integration tests.

#![allow(dead_code)] // each test binary uses a different subset

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skillhub_core::{copy_dir_recursive, remove_path_any, HubError, Result};
use skillhub_discovery::ToolRegistry;
use skillhub_git::{normalize_repo_url, GitCache, GitClient};
use skillhub_installer::Installer;
use skillhub_state::{CentralRepo, SkillStore};
use skillhub_sync::SyncEngine;
use skillhub_test_utils::HubFixture;

/// A git client that "clones" by copying registered local directories.
#[derive(Default)]
pub struct LocalGit {
    repos: Mutex<HashMap<String, PathBuf>>,
    revision: Mutex<String>,
    offline: AtomicBool,
    pub clones: AtomicUsize,
    pub refreshes: AtomicUsize,
}

impl LocalGit {
    pub fn register(&self, url: &str, dir: &Path) {
        let url = normalize_repo_url(url).unwrap();
        self.repos.lock().unwrap().insert(url, dir.to_path_buf());
    }

    pub fn set_revision(&self, rev: &str) {
        *self.revision.lock().unwrap() = rev.to_string();
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn source(&self, url: &str) -> Result<PathBuf> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(HubError::Network {
                url: url.to_string(),
                message: "Could not resolve host: github.com".into(),
            });
        }
        self.repos
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| HubError::Network {
                url: url.to_string(),
                message: "repository not found".into(),
            })
    }

    fn origin_of(&self, dest: &Path) -> Result<PathBuf> {
        let url = fs::read_to_string(dest.join(".git/origin")).unwrap();
        self.source(url.trim())
    }
}

impl GitClient for LocalGit {
    fn name(&self) -> &'static str {
        "local-fake"
    }

    fn clone_repo(&self, url: &str, dest: &Path, _branch: Option<&str>) -> Result<()> {
        let src = self.source(url)?;
        copy_dir_recursive(&src, dest)?;
        fs::create_dir_all(dest.join(".git")).unwrap();
        fs::write(dest.join(".git/origin"), url).unwrap();
        self.clones.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn refresh(&self, dest: &Path, _branch: Option<&str>) -> Result<()> {
        let src = self.origin_of(dest)?;
        for entry in fs::read_dir(dest).unwrap() {
            let entry = entry.unwrap();
            if entry.file_name() != ".git" {
                remove_path_any(&entry.path())?;
            }
        }
        copy_dir_recursive(&src, dest)?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn head(&self, _dest: &Path) -> Result<String> {
        let rev = self.revision.lock().unwrap().clone();
        Ok(if rev.is_empty() { "rev-0".into() } else { rev })
    }
}

/// Installer, engine, and fake git wired over an isolated fixture.
pub struct Hub {
    pub fixture: HubFixture,
    pub store: Arc<SkillStore>,
    pub registry: Arc<ToolRegistry>,
    pub git: Arc<LocalGit>,
    pub installer: Installer,
    pub engine: SyncEngine,
}

impl Hub {
    /// Freshness window of zero: every checkout after the first refreshes.
    pub fn new() -> Self {
        Self::with_ttl(Duration::ZERO)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let fixture = HubFixture::new().unwrap();
        let store = Arc::new(SkillStore::open_in_memory().unwrap());
        let registry = Arc::new(ToolRegistry::new(&fixture.home));
        let git = Arc::new(LocalGit::default());
        let cache = Arc::new(GitCache::new(&fixture.cache_dir, ttl, git.clone()));
        let installer = Installer::new(
            store.clone(),
            CentralRepo::at(fixture.central_root()),
            cache,
        );
        let engine = SyncEngine::new(store.clone(), registry.clone())
            .with_skill_locks(installer.skill_locks());
        Self {
            fixture,
            store,
            registry,
            git,
            installer,
            engine,
        }
    }

    /// A directory standing in for a remote repository.
    pub fn repo_dir(&self, name: &str) -> PathBuf {
        let dir = self.fixture.tempdir.path().join("remotes").join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn tool_skills(&self, rel: &str) -> PathBuf {
        self.fixture.tool_dir(rel).unwrap()
    }
}

/// Directory listing of `dir`, sorted, for "nothing else was created" checks.
pub fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
