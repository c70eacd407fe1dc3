//! Error taxonomy shared by every skillhub crate.
//!
//! Callers match on [`HubError::kind`] rather than on message text; the
//! CLI surfaces [`ErrorKind::code`] in JSON output.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors raised by hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// A skill, target, tool, or source did not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// A skill with the same name is already managed.
    #[error("{what} already exists: {id}")]
    AlreadyExists { what: &'static str, id: String },

    /// An unrecorded entry occupies a target location.
    #[error("target already exists: {}", path.display())]
    Conflict { path: PathBuf },

    /// A relative path would leave its base directory.
    #[error("unsafe path '{path}': {reason}")]
    PathUnsafe { path: String, reason: &'static str },

    /// Filesystem failure with the operation that hit it.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The recorded source of a skill is gone.
    #[error("source missing: {0}")]
    SourceMissing(String),

    /// Remote fetch failed.
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// A git operation exceeded its deadline.
    #[error("{operation} timed out after {secs}s{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    Timeout {
        operation: String,
        secs: u64,
        detail: Option<String>,
    },

    /// Another operation holds the lock for this skill or cache entry.
    #[error("busy: {0} is locked by another operation")]
    Busy(String),

    /// Neither a git binary nor the libgit2 fallback is usable.
    #[error("no usable git client: {0}")]
    NoGitClient(String),

    /// Caller supplied a value the hub cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Anything else, typically persistence failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Stable classification of [`HubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    PathUnsafe,
    Io,
    SourceMissing,
    Network,
    Timeout,
    Busy,
    NoGitClient,
    InvalidInput,
    Other,
}

impl ErrorKind {
    /// Machine-readable code, e.g. `TARGET_EXISTS`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::Conflict => "TARGET_EXISTS",
            ErrorKind::PathUnsafe => "PATH_UNSAFE",
            ErrorKind::Io => "IO",
            ErrorKind::SourceMissing => "SOURCE_MISSING",
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Busy => "BUSY",
            ErrorKind::NoGitClient => "NO_GIT_CLIENT",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Other => "INTERNAL",
        }
    }
}

impl HubError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::NotFound { .. } => ErrorKind::NotFound,
            HubError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            HubError::Conflict { .. } => ErrorKind::Conflict,
            HubError::PathUnsafe { .. } => ErrorKind::PathUnsafe,
            HubError::Io { .. } => ErrorKind::Io,
            HubError::SourceMissing(_) => ErrorKind::SourceMissing,
            HubError::Network { .. } => ErrorKind::Network,
            HubError::Timeout { .. } => ErrorKind::Timeout,
            HubError::Busy(_) => ErrorKind::Busy,
            HubError::NoGitClient(_) => ErrorKind::NoGitClient,
            HubError::InvalidInput(_) => ErrorKind::InvalidInput,
            HubError::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether retrying the same call later can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Busy | ErrorKind::Timeout)
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        HubError::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn already_exists(what: &'static str, id: impl Into<String>) -> Self {
        HubError::AlreadyExists {
            what,
            id: id.into(),
        }
    }

    /// Wrap an io error with a message naming the operation and path.
    pub fn io(op: &str, path: &Path, source: io::Error) -> Self {
        HubError::Io {
            context: format!("{op} {}", path.display()),
            source,
        }
    }
}

/// Attach path context to io results, mirroring `anyhow::Context`.
pub trait IoContext<T> {
    fn io_ctx(self, op: &str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn io_ctx(self, op: &str, path: &Path) -> Result<T> {
        self.map_err(|e| HubError::io(op, path, e))
    }
}
