//! Git client capability and its implementations.
//!
//! The cache depends only on [`GitClient`]. [`SystemGit`] drives the `git`
//! binary non-interactively with an explicit deadline; the libgit2 client is
//! compiled in with the `libgit2` feature and used when no binary is usable,
//! or after a binary failure when the fallback is explicitly allowed.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use skillhub_core::{HubError, Result};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Default ceiling for `git clone`.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(60);
/// Default ceiling for fetch, reset, and rev-parse.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(45);

/// Well-known install locations probed after `PATH`.
const FALLBACK_GIT_PATHS: &[&str] = &["/usr/bin/git", "/opt/homebrew/bin/git", "/usr/local/bin/git"];

/// Operations the cache needs from a git implementation.
///
/// Both implementations must leave the same on-disk layout: a working tree
/// with a `.git` directory at `dest`.
#[cfg_attr(test, mockall::automock)]
pub trait GitClient: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Clone `url` into `dest`, which must not exist yet.
    fn clone_repo<'a>(&self, url: &str, dest: &Path, branch: Option<&'a str>) -> Result<()>;

    /// Fetch from origin and move the working tree to the fetched head.
    fn refresh<'a>(&self, dest: &Path, branch: Option<&'a str>) -> Result<()>;

    /// Current `HEAD` commit id.
    fn head(&self, dest: &Path) -> Result<String>;
}

/// Errors raised while running git.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to spawn git process '{binary}': {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },

    #[error("{operation} timed out after {}s", timeout.as_secs())]
    TimedOut {
        operation: String,
        timeout: Duration,
        stderr: String,
    },

    #[error("failed to wait for git process: {0}")]
    WaitFailed(#[source] io::Error),

    #[cfg(feature = "libgit2")]
    #[error("libgit2: {0}")]
    Library(#[from] git2::Error),
}

impl GitError {
    fn into_hub(self, target: &str) -> HubError {
        match self {
            GitError::TimedOut {
                operation,
                timeout,
                stderr,
            } => HubError::Timeout {
                operation,
                secs: timeout.as_secs(),
                detail: Some(stderr.trim().to_string()).filter(|s| !s.is_empty()),
            },
            GitError::SpawnFailed { .. } => HubError::NoGitClient(self.to_string()),
            GitError::WaitFailed(source) => HubError::Io {
                context: format!("wait for git ({target})"),
                source,
            },
            other => HubError::Network {
                url: target.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Settings for git clients.
#[derive(Debug, Clone)]
pub struct GitConfig {
    /// Explicit binary; `None` searches `PATH` and common locations.
    pub binary: Option<PathBuf>,
    pub clone_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Retry with libgit2 after the system binary fails.
    pub allow_libgit2_fallback: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: None,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            allow_libgit2_fallback: false,
        }
    }
}

impl GitConfig {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn with_timeouts(mut self, clone: Duration, fetch: Duration) -> Self {
        self.clone_timeout = clone;
        self.fetch_timeout = fetch;
        self
    }

    pub fn with_libgit2_fallback(mut self, allow: bool) -> Self {
        self.allow_libgit2_fallback = allow;
        self
    }
}

fn git_bin_works(bin: &Path) -> bool {
    Command::new(bin)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Find a usable git binary: the configured one, then `PATH`, then common
/// install locations.
pub fn resolve_git_bin(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(bin) = configured {
        if git_bin_works(bin) {
            return Some(bin.to_path_buf());
        }
        tracing::warn!(bin = %bin.display(), "configured git binary is not usable");
    }
    let candidates = std::iter::once("git").chain(FALLBACK_GIT_PATHS.iter().copied());
    for cand in candidates {
        let path = PathBuf::from(cand);
        if git_bin_works(&path) {
            return Some(path);
        }
    }
    None
}

/// Drives the system `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    bin: PathBuf,
    clone_timeout: Duration,
    fetch_timeout: Duration,
}

impl SystemGit {
    pub fn new(bin: impl Into<PathBuf>, config: &GitConfig) -> Self {
        Self {
            bin: bin.into(),
            clone_timeout: config.clone_timeout,
            fetch_timeout: config.fetch_timeout,
        }
    }

    /// Locate a binary per `config`; `None` when git is not installed.
    pub fn discover(config: &GitConfig) -> Option<Self> {
        resolve_git_bin(config.binary.as_deref()).map(|bin| Self::new(bin, config))
    }

    pub fn binary(&self) -> &Path {
        &self.bin
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        // Never block on credential prompts; abort stalled HTTPS transfers.
        cmd.env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_ASKPASS", "echo")
            .env("GIT_HTTP_LOW_SPEED_LIMIT", "1024")
            .env("GIT_HTTP_LOW_SPEED_TIME", "120");
        cmd
    }

    fn run(&self, cmd: Command, timeout: Duration, operation: &str) -> std::result::Result<Output, GitError> {
        let mut cmd = tokio::process::Command::from(cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        block_on(self.run_async(cmd, timeout, operation))?
    }

    async fn run_async(
        &self,
        mut cmd: tokio::process::Command,
        timeout: Duration,
        operation: &str,
    ) -> std::result::Result<Output, GitError> {
        let mut child = cmd.spawn().map_err(|source| GitError::SpawnFailed {
            binary: self.bin.display().to_string(),
            source,
        })?;
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let started = Instant::now();
        let finished = tokio::time::timeout(timeout, async {
            // Drain both pipes while waiting so a chatty child cannot stall.
            let out = async {
                match stdout_pipe.as_mut() {
                    Some(pipe) => pipe.read_to_end(&mut stdout).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let err = async {
                match stderr_pipe.as_mut() {
                    Some(pipe) => pipe.read_to_end(&mut stderr).await.map(|_| ()),
                    None => Ok(()),
                }
            };
            let (out, err) = tokio::join!(out, err);
            out.and(err)?;
            child.wait().await
        })
        .await;

        let status = match finished {
            Ok(status) => status.map_err(GitError::WaitFailed)?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(operation, error = %e, "failed to kill timed out git process");
                }
                return Err(GitError::TimedOut {
                    operation: operation.to_string(),
                    timeout,
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                });
            }
        };
        tracing::debug!(
            operation,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = status.success(),
            "git command finished"
        );
        if !status.success() {
            return Err(GitError::CommandFailed {
                operation: operation.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(Output {
            status,
            stdout,
            stderr,
        })
    }

    fn in_repo(&self, dest: &Path, args: &[&str]) -> Command {
        let mut cmd = self.command();
        cmd.arg("-C").arg(dest).args(args);
        cmd
    }
}

/// Drive `fut` to completion from synchronous code.
///
/// Callers run on tokio's blocking pool, where the ambient runtime can be
/// borrowed; without one (plain threads, tests) a current-thread runtime is
/// built for the call.
fn block_on<F: Future>(fut: F) -> std::result::Result<F::Output, GitError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        Ok(handle) => Ok(handle.block_on(fut)),
        Err(_) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(GitError::WaitFailed)?;
            Ok(rt.block_on(fut))
        }
    }
}

impl GitClient for SystemGit {
    fn name(&self) -> &'static str {
        "git-cli"
    }

    fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("clone")
            .args(["--depth", "1", "--filter=blob:none", "--no-tags"]);
        if let Some(b) = branch {
            cmd.arg("--branch").arg(b).arg("--single-branch");
        }
        cmd.arg(url).arg(dest);
        self.run(cmd, self.clone_timeout, "git clone")
            .map_err(|e| e.into_hub(url))?;
        Ok(())
    }

    fn refresh(&self, dest: &Path, branch: Option<&str>) -> Result<()> {
        let target = dest.display().to_string();
        self.run(
            self.in_repo(dest, &["fetch", "--prune", "origin"]),
            self.fetch_timeout,
            "git fetch",
        )
        .map_err(|e| e.into_hub(&target))?;
        let step = match branch {
            Some(b) => {
                let remote = format!("origin/{b}");
                self.run(
                    self.in_repo(dest, &["checkout", "-B", b, &remote]),
                    self.fetch_timeout,
                    "git checkout",
                )
            }
            None => self.run(
                self.in_repo(dest, &["reset", "--hard", "FETCH_HEAD"]),
                self.fetch_timeout,
                "git reset",
            ),
        };
        step.map_err(|e| e.into_hub(&target))?;
        Ok(())
    }

    fn head(&self, dest: &Path) -> Result<String> {
        let out = self
            .run(
                self.in_repo(dest, &["rev-parse", "HEAD"]),
                self.fetch_timeout,
                "git rev-parse",
            )
            .map_err(|e| e.into_hub(&dest.display().to_string()))?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

#[cfg(feature = "libgit2")]
pub use self::libgit2::LibGit2Client;

#[cfg(feature = "libgit2")]
mod libgit2 {
    use super::*;
    use git2::{build::RepoBuilder, FetchOptions, Repository, ResetType};

    /// In-process client backed by libgit2.
    #[derive(Debug, Clone, Default)]
    pub struct LibGit2Client;

    fn lib_err(target: &Path, e: git2::Error) -> HubError {
        GitError::from(e).into_hub(&target.display().to_string())
    }

    impl GitClient for LibGit2Client {
        fn name(&self) -> &'static str {
            "libgit2"
        }

        fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<()> {
            let mut builder = RepoBuilder::new();
            if let Some(b) = branch {
                builder.branch(b);
            }
            builder
                .clone(url, dest)
                .map_err(|e| GitError::from(e).into_hub(url))?;
            Ok(())
        }

        fn refresh(&self, dest: &Path, branch: Option<&str>) -> Result<()> {
            let repo = Repository::open(dest).map_err(|e| lib_err(dest, e))?;
            let mut remote = repo.find_remote("origin").map_err(|e| lib_err(dest, e))?;
            let mut opts = FetchOptions::new();
            remote
                .fetch(
                    &["+refs/heads/*:refs/remotes/origin/*"],
                    Some(&mut opts),
                    None,
                )
                .map_err(|e| lib_err(dest, e))?;
            let spec = match branch {
                Some(b) => format!("refs/remotes/origin/{b}"),
                None => "FETCH_HEAD".to_string(),
            };
            let obj = repo.revparse_single(&spec).map_err(|e| lib_err(dest, e))?;
            repo.reset(&obj, ResetType::Hard, None)
                .map_err(|e| lib_err(dest, e))?;
            Ok(())
        }

        fn head(&self, dest: &Path) -> Result<String> {
            let repo = Repository::open(dest).map_err(|e| lib_err(dest, e))?;
            let head = repo.head().map_err(|e| lib_err(dest, e))?;
            head.target()
                .map(|oid| oid.to_string())
                .ok_or_else(|| HubError::Network {
                    url: dest.display().to_string(),
                    message: "HEAD has no target".into(),
                })
        }
    }
}

/// Tries the system binary first and libgit2 second.
#[cfg(feature = "libgit2")]
struct FallbackClient {
    primary: SystemGit,
    secondary: LibGit2Client,
}

#[cfg(feature = "libgit2")]
impl FallbackClient {
    fn attempt<T>(
        &self,
        op: &str,
        first: impl FnOnce(&SystemGit) -> Result<T>,
        second: impl FnOnce(&LibGit2Client) -> Result<T>,
    ) -> Result<T> {
        match first(&self.primary) {
            Ok(v) => Ok(v),
            Err(e) => {
                tracing::warn!(operation = op, error = %e, "git binary failed; retrying with libgit2");
                second(&self.secondary)
            }
        }
    }
}

#[cfg(feature = "libgit2")]
impl GitClient for FallbackClient {
    fn name(&self) -> &'static str {
        "git-cli+libgit2"
    }

    fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<()> {
        self.attempt(
            "clone",
            |g| g.clone_repo(url, dest, branch),
            |l| {
                // A failed CLI clone may leave a partial directory behind.
                let _ = std::fs::remove_dir_all(dest);
                l.clone_repo(url, dest, branch)
            },
        )
    }

    fn refresh(&self, dest: &Path, branch: Option<&str>) -> Result<()> {
        self.attempt(
            "refresh",
            |g| g.refresh(dest, branch),
            |l| l.refresh(dest, branch),
        )
    }

    fn head(&self, dest: &Path) -> Result<String> {
        self.attempt("head", |g| g.head(dest), |l| l.head(dest))
    }
}

/// Pick the client for this process.
///
/// The system binary is preferred. Without one, libgit2 is used when compiled
/// in; otherwise this fails with `NoGitClient`.
pub fn select_client(config: &GitConfig) -> Result<Arc<dyn GitClient>> {
    match SystemGit::discover(config) {
        Some(git) => {
            tracing::info!(bin = %git.binary().display(), "using system git");
            #[cfg(feature = "libgit2")]
            if config.allow_libgit2_fallback {
                return Ok(Arc::new(FallbackClient {
                    primary: git,
                    secondary: LibGit2Client,
                }));
            }
            Ok(Arc::new(git))
        }
        None => {
            #[cfg(feature = "libgit2")]
            {
                tracing::info!("system git not available; using libgit2");
                Ok(Arc::new(LibGit2Client))
            }
            #[cfg(not(feature = "libgit2"))]
            {
                Err(HubError::NoGitClient(
                    "no git binary found on PATH or in common locations; install git or set SKILLHUB_GIT_BIN".into(),
                ))
            }
        }
    }
}
