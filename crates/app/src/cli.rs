use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for command results.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Command-line interface for the `skillhub` application.
#[derive(Debug, Parser)]
#[command(
    name = "skillhub",
    version,
    about = "Manage agent skills in one place and sync them into every AI coding tool"
)]
pub struct Cli {
    /// Output format.
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available `skillhub` commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Imports a local skill directory into the central repository.
    Install {
        /// Directory containing the skill.
        path: PathBuf,
        /// Name to register (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing skill with the same name.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Installs one or more skills from a git repository.
    InstallGit {
        /// Repository URL, `owner/repo` shorthand, or a GitHub tree URL.
        url: String,
        /// Subdirectory to install (repeatable; several install as a batch).
        #[arg(long = "subpath", value_name = "PATH")]
        subpaths: Vec<String>,
        /// Name to register (single installs only).
        #[arg(long)]
        name: Option<String>,
        /// Branch to check out.
        #[arg(long)]
        branch: Option<String>,
        /// Replace existing skills with the same names.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        /// Pick from the repository's candidates interactively when it holds several.
        #[arg(long, short = 'i', default_value_t = false)]
        interactive: bool,
    },
    /// Lists the candidate skills a git repository offers.
    Candidates {
        url: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Lists managed skills and their targets.
    #[command(alias = "ls")]
    List,
    /// Realizes a skill in a tool's skills directory.
    Sync {
        /// Skill id or name.
        skill: String,
        /// Tool key, e.g. `claude_code` or `cursor`.
        tool: String,
        /// Replace an existing directory at the destination.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        /// Re-inspect the destination instead of trusting the recorded target.
        #[arg(long, default_value_t = false)]
        verify: bool,
    },
    /// Removes a skill's realization from a tool.
    Unsync { skill: String, tool: String },
    /// Re-imports a skill from its recorded source.
    Update {
        skill: String,
        /// Re-copy copy-mode targets when the content changed.
        #[arg(long, default_value_t = false)]
        refresh_copies: bool,
    },
    /// Re-copies one copy-mode target from the central repository.
    Refresh { skill: String, tool: String },
    /// Removes a skill's targets, its central copy, and its record.
    Delete { skill: String },
    /// Shows which tools are installed and how they receive skills.
    Tools,
    /// Takes over skills already present in tool directories.
    Onboard {
        #[command(subcommand)]
        action: OnboardAction,
    },
    /// Git cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Reads or writes a stored setting.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Runs the periodic cache sweeps until interrupted.
    Daemon {
        /// Minutes between cache eviction passes.
        #[arg(long, value_name = "MINUTES", default_value_t = 360)]
        evict_every: u64,
        /// Minutes between temp directory sweeps.
        #[arg(long, value_name = "MINUTES", default_value_t = 60)]
        temp_every: u64,
    },
}

#[derive(Debug, Subcommand)]
pub enum OnboardAction {
    /// Scans installed tools and reports unmanaged skills grouped by name.
    Scan,
    /// Imports selected groups, replacing the originals with managed targets.
    Apply {
        /// `name` or `name=tool` (repeatable). Conflicting groups need the tool.
        #[arg(long = "select", value_name = "NAME[=TOOL]")]
        selections: Vec<String>,
        /// Import every group without a conflict.
        #[arg(long, default_value_t = false, conflicts_with = "interactive")]
        all: bool,
        /// Choose groups and variants interactively.
        #[arg(long, short = 'i', default_value_t = false)]
        interactive: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Evicts cache entries older than the configured cleanup age.
    Clean {
        /// Evict every idle entry regardless of age.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Prints a setting (with defaults applied), or every setting.
    Get { key: Option<String> },
    /// Validates and stores a setting.
    Set { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeatable_subpaths_and_global_format() {
        let cli = Cli::try_parse_from([
            "skillhub",
            "install-git",
            "acme/kit",
            "--subpath",
            "skills/a",
            "--subpath",
            "skills/b",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(cli.format.is_json());
        match cli.command {
            Commands::InstallGit { url, subpaths, .. } => {
                assert_eq!(url, "acme/kit");
                assert_eq!(subpaths, vec!["skills/a", "skills/b"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn onboard_apply_collects_selections() {
        let cli = Cli::try_parse_from([
            "skillhub", "onboard", "apply", "--select", "pdf", "--select", "bar=codex",
        ])
        .unwrap();
        match cli.command {
            Commands::Onboard {
                action: OnboardAction::Apply { selections, all, .. },
            } => {
                assert_eq!(selections, vec!["pdf", "bar=codex"]);
                assert!(!all);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn all_and_interactive_are_exclusive() {
        assert!(Cli::try_parse_from(["skillhub", "onboard", "apply", "--all", "-i"]).is_err());
    }
}
