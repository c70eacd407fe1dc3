//! TTL-based cache of cloned repositories.
//!
//! Layout under the cache root:
//!
//! ```text
//! skillhub-git-cache/
//!   skillhub-repo-<key>/        working tree with .git
//!   skillhub-repo-<key>.json    {"url", "branch", "last_fetched_ms", "head"}
//!   skillhub-git-<uuid>/        in-flight clone, carries the temp marker
//! ```
//!
//! A fresh clone lands in a marked temp directory and is renamed into place,
//! so an entry directory only ever holds a complete checkout. Each key has
//! its own lock, held by the returned [`CacheLease`] until the caller has
//! finished copying out of the checkout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skillhub_core::{
    now_ms, remove_path_any, HubError, IoContext, KeyedLocks, LockGuard, LockPolicy, Result,
};

use crate::client::GitClient;
use crate::url::{cache_key, normalize_repo_url};

/// Directory name of the cache root under the platform cache directory.
pub const CACHE_DIR_NAME: &str = "skillhub-git-cache";
/// Prefix of cache entry directories.
pub const ENTRY_PREFIX: &str = "skillhub-repo-";
/// Prefix of temporary clone directories.
pub const TEMP_PREFIX: &str = "skillhub-git-";
/// Marker written into every temporary clone directory.
pub const TEMP_MARKER: &str = ".skillhub-git-temp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct EntryMeta {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    pub last_fetched_ms: i64,
    #[serde(default)]
    pub head: Option<String>,
}

/// How a checkout was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    /// No entry existed; cloned now.
    Cloned,
    /// Entry younger than the freshness window; no network.
    Fresh,
    /// Entry was stale and the refresh succeeded.
    Refreshed,
    /// Refresh failed; the previous checkout is served with a warning.
    Stale,
}

/// Exclusive access to one cache entry.
///
/// Dropping the lease releases the key's lock.
#[derive(Debug)]
pub struct CacheLease {
    pub path: PathBuf,
    pub url: String,
    pub head: Option<String>,
    pub state: FetchState,
    /// Refresh error text when `state` is `Stale`.
    pub warning: Option<String>,
    _guard: LockGuard,
}

/// Clone-or-pull cache keyed by normalized URL and branch.
pub struct GitCache {
    root: PathBuf,
    // Freshness window in milliseconds; adjustable while shared.
    ttl_ms: AtomicU64,
    client: Arc<dyn GitClient>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for GitCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCache")
            .field("root", &self.root)
            .field("ttl", &self.ttl())
            .field("client", &self.client.name())
            .finish()
    }
}

impl GitCache {
    /// Cache rooted at `<cache_dir>/skillhub-git-cache`.
    pub fn new(cache_dir: &Path, ttl: Duration, client: Arc<dyn GitClient>) -> Self {
        Self::with_root(cache_dir.join(CACHE_DIR_NAME), ttl, client)
    }

    /// Cache rooted exactly at `root`.
    pub fn with_root(root: PathBuf, ttl: Duration, client: Arc<dyn GitClient>) -> Self {
        Self {
            root,
            ttl_ms: AtomicU64::new(ttl.as_millis() as u64),
            client,
            locks: KeyedLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_ms.store(ttl.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn client_name(&self) -> &'static str {
        self.client.name()
    }

    pub(crate) fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(format!("{ENTRY_PREFIX}{key}"))
    }

    pub(crate) fn meta_path(entry_dir: &Path) -> PathBuf {
        let mut name = entry_dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".json");
        entry_dir.with_file_name(name)
    }

    pub(crate) fn read_meta(entry_dir: &Path) -> Option<EntryMeta> {
        let raw = fs::read_to_string(Self::meta_path(entry_dir)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn write_meta(entry_dir: &Path, meta: &EntryMeta) -> Result<()> {
        let path = Self::meta_path(entry_dir);
        let body = serde_json::to_vec_pretty(meta).map_err(|e| HubError::Other(e.into()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).io_ctx("write cache meta", &tmp)?;
        fs::rename(&tmp, &path).io_ctx("write cache meta", &path)
    }

    /// Clone or refresh `repo_url` and lease its checkout.
    ///
    /// The URL is validated before anything touches the filesystem. A second
    /// caller for the same key waits for the first and then sees a fresh entry.
    pub fn checkout(&self, repo_url: &str, branch: Option<&str>) -> Result<CacheLease> {
        let url = normalize_repo_url(repo_url)?;
        let key = cache_key(&url, branch);
        let guard = self.locks.acquire(&key, LockPolicy::Wait)?;
        fs::create_dir_all(&self.root).io_ctx("create cache root", &self.root)?;

        let dir = self.entry_dir(&key);
        let has_checkout = dir.join(".git").is_dir();
        if dir.exists() && !has_checkout {
            tracing::warn!(path = %dir.display(), "removing incomplete cache entry");
            remove_path_any(&dir)?;
        }

        if !has_checkout {
            self.clone_fresh(&url, branch, &dir)?;
            let head = self.record(&dir, &url, branch);
            tracing::info!(url = %url, path = %dir.display(), client = self.client.name(), "cloned repository");
            return Ok(self.lease(dir, url, head, FetchState::Cloned, None, guard));
        }

        let meta = Self::read_meta(&dir);
        let age_ms = meta
            .as_ref()
            .map(|m| now_ms().saturating_sub(m.last_fetched_ms))
            .unwrap_or(i64::MAX);
        if (age_ms as u128) < self.ttl().as_millis() {
            tracing::debug!(url = %url, age_ms, "cache entry is fresh");
            let head = meta.and_then(|m| m.head);
            return Ok(self.lease(dir, url, head, FetchState::Fresh, None, guard));
        }

        match self.client.refresh(&dir, branch) {
            Ok(()) => {
                let head = self.record(&dir, &url, branch);
                tracing::debug!(url = %url, "refreshed cache entry");
                Ok(self.lease(dir, url, head, FetchState::Refreshed, None, guard))
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "refresh failed; using cached checkout");
                let head = meta.and_then(|m| m.head);
                let warning = Some(e.to_string());
                Ok(self.lease(dir, url, head, FetchState::Stale, warning, guard))
            }
        }
    }

    fn lease(
        &self,
        path: PathBuf,
        url: String,
        head: Option<String>,
        state: FetchState,
        warning: Option<String>,
        guard: LockGuard,
    ) -> CacheLease {
        CacheLease {
            path,
            url,
            head,
            state,
            warning,
            _guard: guard,
        }
    }

    fn clone_fresh(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
        let temp = self
            .root
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&temp).io_ctx("create temp clone dir", &temp)?;
        let cleanup = |temp: &Path| {
            if let Err(e) = fs::remove_dir_all(temp) {
                tracing::warn!(path = %temp.display(), error = %e, "failed to remove temp clone dir");
            }
        };
        if let Err(e) = fs::write(temp.join(TEMP_MARKER), b"skillhub-git-temp-v1\n") {
            cleanup(&temp);
            return Err(HubError::io("write temp marker", &temp, e));
        }
        let checkout = temp.join("checkout");
        if let Err(e) = self.client.clone_repo(url, &checkout, branch) {
            cleanup(&temp);
            return Err(e);
        }
        if let Err(e) = fs::rename(&checkout, dest) {
            cleanup(&temp);
            return Err(HubError::io("move clone into cache", dest, e));
        }
        cleanup(&temp);
        Ok(())
    }

    /// Stamp the entry as fetched now; metadata failures only cost freshness.
    fn record(&self, dir: &Path, url: &str, branch: Option<&str>) -> Option<String> {
        let head = match self.client.head(dir) {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "could not read HEAD");
                None
            }
        };
        let meta = EntryMeta {
            url: url.to_string(),
            branch: branch.map(str::to_string),
            last_fetched_ms: now_ms(),
            head: head.clone(),
        };
        if let Err(e) = Self::write_meta(dir, &meta) {
            tracing::warn!(path = %dir.display(), error = %e, "could not write cache meta");
        }
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockGitClient;
    use mockall::predicate::always;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fake_clone(dest: &Path) -> Result<()> {
        fs::create_dir_all(dest.join(".git")).unwrap();
        fs::write(dest.join("SKILL.md"), "# cloned").unwrap();
        Ok(())
    }

    #[test]
    fn second_checkout_within_ttl_skips_network() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockGitClient::new();
        mock.expect_name().return_const("mock");
        mock.expect_clone_repo()
            .times(1)
            .returning(|_, dest, _| fake_clone(dest));
        mock.expect_head().returning(|_| Ok("abc".into()));
        mock.expect_refresh().never();

        let cache = GitCache::new(tmp.path(), Duration::from_secs(600), Arc::new(mock));
        let first = cache.checkout("https://github.com/a/b", None).unwrap();
        assert_eq!(first.state, FetchState::Cloned);
        assert_eq!(first.head.as_deref(), Some("abc"));
        let path = first.path.clone();
        drop(first);

        let second = cache.checkout("https://github.com/a/b.git/", None).unwrap();
        assert_eq!(second.state, FetchState::Fresh);
        assert_eq!(second.path, path);
        assert!(path.join("SKILL.md").exists());
    }

    #[test]
    fn stale_entry_falls_back_when_refresh_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockGitClient::new();
        mock.expect_name().return_const("mock");
        mock.expect_clone_repo()
            .times(1)
            .returning(|_, dest, _| fake_clone(dest));
        mock.expect_head().returning(|_| Ok("abc".into()));
        mock.expect_refresh()
            .with(always(), always())
            .times(1)
            .returning(|_, _| {
                Err(HubError::Network {
                    url: "x".into(),
                    message: "Could not resolve host".into(),
                })
            });

        let cache = GitCache::new(tmp.path(), Duration::ZERO, Arc::new(mock));
        drop(cache.checkout("a/b", None).unwrap());
        let lease = cache.checkout("a/b", None).unwrap();
        assert_eq!(lease.state, FetchState::Stale);
        assert!(lease.warning.unwrap().contains("Could not resolve host"));
        assert!(lease.path.join("SKILL.md").exists());
    }

    #[test]
    fn failed_clone_without_cache_propagates_and_leaves_no_debris() {
        let tmp = tempfile::tempdir().unwrap();
        let mut mock = MockGitClient::new();
        mock.expect_name().return_const("mock");
        mock.expect_clone_repo().returning(|_, dest, _| {
            fs::create_dir_all(dest).unwrap();
            Err(HubError::Network {
                url: "x".into(),
                message: "fatal: repository not found".into(),
            })
        });

        let cache = GitCache::new(tmp.path(), Duration::from_secs(60), Arc::new(mock));
        let err = cache.checkout("a/b", None).unwrap_err();
        assert!(err.to_string().contains("repository not found"));
        let leftovers: Vec<_> = fs::read_dir(cache.root()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn invalid_url_fails_before_creating_cache_root() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockGitClient::new();
        let cache = GitCache::new(tmp.path(), Duration::from_secs(60), Arc::new(mock));
        assert!(cache.checkout("not a url", None).is_err());
        assert!(!cache.root().exists());
    }

    #[test]
    fn concurrent_checkouts_of_same_repo_clone_once() {
        let tmp = tempfile::tempdir().unwrap();
        let clones = Arc::new(AtomicUsize::new(0));
        let counter = clones.clone();
        let mut mock = MockGitClient::new();
        mock.expect_name().return_const("mock");
        mock.expect_clone_repo().returning(move |_, dest, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            fake_clone(dest)
        });
        mock.expect_head().returning(|_| Ok("abc".into()));

        let cache = Arc::new(GitCache::new(
            tmp.path(),
            Duration::from_secs(600),
            Arc::new(mock),
        ));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.checkout("a/b", None).map(|l| l.state))
            })
            .collect();
        let states: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        assert_eq!(clones.load(Ordering::SeqCst), 1);
        assert_eq!(
            states.iter().filter(|s| **s == FetchState::Cloned).count(),
            1
        );
    }
}
