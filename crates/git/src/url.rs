//! Repository URL normalization and cache keys.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use skillhub_core::{HubError, Result};

static SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid regex"));

static SCP_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9_.-]+@)?([A-Za-z0-9.-]+):([A-Za-z0-9_.~/-]+)$").expect("valid regex")
});

static GITHUB_TREE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https://github\.com/[^/]+/[^/]+)/tree/([^/]+)(?:/(.+))?$").expect("valid regex")
});

fn strip_repo_suffix(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    if let Some(stripped) = s.strip_suffix(".git") {
        s = stripped.to_string();
    }
    while s.ends_with('/') {
        s.pop();
    }
    s
}

fn invalid(input: &str, why: &str) -> HubError {
    HubError::InvalidInput(format!("not a repository URL '{input}': {why}"))
}

/// Canonical form of a repository reference.
///
/// Accepts `https://`/`http://`/`ssh://`/`git://`/`file://` URLs, GitHub
/// `owner/repo` shorthand, scheme-less `github.com/owner/repo`,
/// `git@github.com:owner/repo.git`, and existing local directories.
/// Credentials, a trailing `.git`, and trailing slashes are removed so
/// equivalent spellings share one cache entry.
pub fn normalize_repo_url(input: &str) -> Result<String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(invalid(input, "empty"));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(invalid(input, "contains whitespace"));
    }

    if let Some((scheme, rest)) = raw.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if scheme == "file" {
            return Ok(format!("file://{}", strip_repo_suffix(rest.to_string())));
        }
        if !matches!(scheme.as_str(), "https" | "http" | "ssh" | "git") {
            return Err(invalid(input, "unsupported scheme"));
        }
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority
            .rsplit_once('@')
            .map(|(_, h)| h)
            .unwrap_or(authority)
            .to_ascii_lowercase();
        if host.is_empty() {
            return Err(invalid(input, "missing host"));
        }
        let path = path.split(['?', '#']).next().unwrap_or_default();
        return Ok(strip_repo_suffix(format!("{scheme}://{host}/{path}")));
    }

    if Path::new(raw).is_absolute() && Path::new(raw).is_dir() {
        return Ok(strip_repo_suffix(raw.to_string()));
    }

    if let Some(rest) = raw
        .strip_prefix("github.com/")
        .or_else(|| raw.strip_prefix("www.github.com/"))
    {
        return Ok(strip_repo_suffix(format!("https://github.com/{rest}")));
    }

    if let Some(caps) = SCP_LIKE.captures(raw) {
        let host = caps[1].to_ascii_lowercase();
        let path = caps[2].trim_start_matches('/');
        if host == "github.com" {
            return Ok(strip_repo_suffix(format!("https://github.com/{path}")));
        }
        return Ok(strip_repo_suffix(format!("ssh://{host}/{path}")));
    }

    if SHORTHAND.is_match(raw) {
        return Ok(strip_repo_suffix(format!("https://github.com/{raw}")));
    }

    Err(invalid(input, "unrecognized format"))
}

/// Short stable key for a normalized URL and optional branch.
pub fn cache_key(normalized_url: &str, branch: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    if let Some(b) = branch {
        hasher.update(b"#");
        hasher.update(b.as_bytes());
    }
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// A GitHub "tree" URL split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeUrl {
    pub repo_url: String,
    pub branch: String,
    pub subpath: Option<String>,
}

/// Split `https://github.com/o/r/tree/<branch>/<subpath>` into its parts.
///
/// The first segment after `tree/` is taken as the branch.
pub fn parse_tree_url(url: &str) -> Option<TreeUrl> {
    let normalized = normalize_repo_url(url).ok()?;
    let caps = GITHUB_TREE.captures(&normalized)?;
    Some(TreeUrl {
        repo_url: caps[1].to_string(),
        branch: caps[2].to_string(),
        subpath: caps
            .get(3)
            .map(|m| m.as_str().trim_matches('/').to_string())
            .filter(|s| !s.is_empty()),
    })
}
