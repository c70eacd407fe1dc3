use std::path::{Path, PathBuf};

use serde::Serialize;
use skillhub_core::{HubError, Result};

/// How a tool's targets are realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// Symlink (or junction) to the central copy, falling back to a copy.
    PreferLink,
    /// Always an independent copy.
    ForceCopy,
}

impl SyncPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPolicy::PreferLink => "prefer_link",
            SyncPolicy::ForceCopy => "force_copy",
        }
    }
}

/// Static description of one supported tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolAdapter {
    /// Stable key stored in target records, e.g. `claude_code`.
    pub id: &'static str,
    /// Human label.
    pub label: &'static str,
    /// Skills directory relative to the home directory.
    pub relative_skills_dir: &'static str,
    /// Directory whose presence means the tool is installed.
    pub relative_detect_dir: &'static str,
    pub policy: SyncPolicy,
    /// Entry names in the skills directory that belong to the tool itself.
    pub excluded_names: &'static [&'static str],
}

const fn adapter(
    id: &'static str,
    label: &'static str,
    relative_skills_dir: &'static str,
    relative_detect_dir: &'static str,
) -> ToolAdapter {
    ToolAdapter {
        id,
        label,
        relative_skills_dir,
        relative_detect_dir,
        policy: SyncPolicy::PreferLink,
        excluded_names: &[],
    }
}

static DEFAULT_ADAPTERS: &[ToolAdapter] = &[
    // Cursor does not follow symlinked skill directories.
    ToolAdapter {
        policy: SyncPolicy::ForceCopy,
        ..adapter("cursor", "Cursor", ".cursor/skills", ".cursor")
    },
    adapter("claude_code", "Claude Code", ".claude/skills", ".claude"),
    ToolAdapter {
        excluded_names: &[".system"],
        ..adapter("codex", "Codex", ".codex/skills", ".codex")
    },
    adapter("opencode", "OpenCode", ".config/opencode/skill", ".config/opencode"),
    adapter(
        "antigravity",
        "Antigravity",
        ".gemini/antigravity/skills",
        ".gemini/antigravity",
    ),
    adapter("amp", "Amp", ".config/agents/skills", ".config/agents"),
    adapter("kilo_code", "Kilo Code", ".kilocode/skills", ".kilocode"),
    adapter("roo_code", "Roo Code", ".roo/skills", ".roo"),
    adapter("goose", "Goose", ".config/goose/skills", ".config/goose"),
    adapter("gemini_cli", "Gemini CLI", ".gemini/skills", ".gemini"),
    adapter("github_copilot", "GitHub Copilot", ".copilot/skills", ".copilot"),
    adapter("clawdbot", "Clawdbot", ".clawdbot/skills", ".clawdbot"),
    adapter("droid", "Droid", ".factory/skills", ".factory"),
    adapter(
        "windsurf",
        "Windsurf",
        ".codeium/windsurf/skills",
        ".codeium/windsurf",
    ),
];

/// The built-in adapter table, in display order.
pub fn default_adapters() -> &'static [ToolAdapter] {
    DEFAULT_ADAPTERS
}

/// Installation status of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub id: &'static str,
    pub label: &'static str,
    pub installed: bool,
    pub skills_dir: PathBuf,
    pub policy: SyncPolicy,
}

/// Adapters resolved against a home directory.
///
/// Built once at startup. Force-copy overrides from settings or environment
/// are folded in here so the rest of the system reads one policy per tool.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    home: PathBuf,
    adapters: Vec<ToolAdapter>,
}

impl ToolRegistry {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self::with_adapters(home, default_adapters().to_vec())
    }

    /// Registry over a custom adapter table.
    pub fn with_adapters(home: impl Into<PathBuf>, adapters: Vec<ToolAdapter>) -> Self {
        Self {
            home: home.into(),
            adapters,
        }
    }

    /// Force the named tools to copy mode. Unknown keys are logged and ignored.
    pub fn with_force_copy<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        for key in keys {
            let key = key.as_ref();
            match self.adapters.iter_mut().find(|a| a.id == key) {
                Some(a) => a.policy = SyncPolicy::ForceCopy,
                None => tracing::warn!(tool = key, "ignoring force-copy override for unknown tool"),
            }
        }
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn adapters(&self) -> &[ToolAdapter] {
        &self.adapters
    }

    /// Look up a tool by key.
    pub fn get(&self, key: &str) -> Result<&ToolAdapter> {
        self.adapters
            .iter()
            .find(|a| a.id == key)
            .ok_or_else(|| HubError::not_found("tool", key))
    }

    pub fn skills_dir(&self, adapter: &ToolAdapter) -> PathBuf {
        self.home.join(adapter.relative_skills_dir)
    }

    /// Whether the tool appears installed. Never blocks a sync.
    pub fn detect(&self, adapter: &ToolAdapter) -> bool {
        self.home.join(adapter.relative_detect_dir).exists()
    }

    pub fn status(&self) -> Vec<ToolStatus> {
        self.adapters
            .iter()
            .map(|a| ToolStatus {
                id: a.id,
                label: a.label,
                installed: self.detect(a),
                skills_dir: self.skills_dir(a),
                policy: a.policy,
            })
            .collect()
    }
}
