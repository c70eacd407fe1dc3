//! Where a git install comes from.

use serde::Serialize;
use skillhub_core::{is_safe_relative, HubError, Result};
use skillhub_git::{normalize_repo_url, parse_tree_url};

/// A repository reference split into repo, branch, and subpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitSource {
    /// Normalized repository URL.
    pub repo_url: String,
    pub branch: Option<String>,
    pub subpath: Option<String>,
}

fn clean_subpath(raw: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = raw.map(|s| s.trim().trim_matches('/')).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if !is_safe_relative(raw) {
        return Err(HubError::PathUnsafe {
            path: raw.to_string(),
            reason: "subpath escapes the repository",
        });
    }
    Ok(Some(raw.to_string()))
}

impl GitSource {
    /// Resolve user input. A GitHub tree URL contributes its branch and
    /// subpath unless they are given explicitly.
    pub fn parse(url: &str, branch: Option<&str>, subpath: Option<&str>) -> Result<Self> {
        let branch = branch.map(str::trim).filter(|b| !b.is_empty());
        if let Some(tree) = parse_tree_url(url) {
            return Ok(Self {
                repo_url: tree.repo_url,
                branch: Some(branch.map(str::to_string).unwrap_or(tree.branch)),
                subpath: clean_subpath(subpath.or(tree.subpath.as_deref()))?,
            });
        }
        Ok(Self {
            repo_url: normalize_repo_url(url)?,
            branch: branch.map(str::to_string),
            subpath: clean_subpath(subpath)?,
        })
    }

    /// Same repository, another subpath.
    pub fn at(&self, subpath: &str) -> Result<Self> {
        Ok(Self {
            subpath: clean_subpath(Some(subpath))?,
            ..self.clone()
        })
    }

    /// Last path segment of the repository URL.
    pub fn repo_name(&self) -> String {
        self.repo_url
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("skill")
            .to_string()
    }

    /// Name a skill installed from this source would get by default.
    pub fn default_name(&self) -> String {
        self.subpath
            .as_deref()
            .and_then(|s| s.rsplit('/').next())
            .map(str::to_string)
            .unwrap_or_else(|| self.repo_name())
    }
}
