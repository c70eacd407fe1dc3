//! CLI command handlers for the skillhub application.

mod maintenance;
mod onboard;
mod skills;
mod targets;

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::cli::{CacheAction, Commands, OnboardAction, OutputFormat, SettingsAction};
use crate::context::AppContext;

/// Route a parsed command to its handler.
pub(crate) async fn dispatch(ctx: &AppContext, command: Commands, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Install {
            path,
            name,
            overwrite,
        } => skills::handle_install_command(ctx, path, name, overwrite, format).await,
        Commands::InstallGit {
            url,
            subpaths,
            name,
            branch,
            overwrite,
            interactive,
        } => {
            skills::handle_install_git_command(
                ctx,
                skills::InstallGitArgs {
                    url,
                    subpaths,
                    name,
                    branch,
                    overwrite,
                    interactive,
                },
                format,
            )
            .await
        }
        Commands::Candidates { url, branch } => {
            skills::handle_candidates_command(ctx, url, branch, format).await
        }
        Commands::List => skills::handle_list_command(ctx, format),
        Commands::Update {
            skill,
            refresh_copies,
        } => skills::handle_update_command(ctx, skill, refresh_copies, format).await,
        Commands::Delete { skill } => skills::handle_delete_command(ctx, skill, format).await,
        Commands::Sync {
            skill,
            tool,
            overwrite,
            verify,
        } => targets::handle_sync_command(ctx, skill, tool, overwrite, verify, format).await,
        Commands::Unsync { skill, tool } => {
            targets::handle_unsync_command(ctx, skill, tool, format).await
        }
        Commands::Refresh { skill, tool } => {
            targets::handle_refresh_command(ctx, skill, tool, format).await
        }
        Commands::Tools => targets::handle_tools_command(ctx, format),
        Commands::Onboard { action } => match action {
            OnboardAction::Scan => onboard::handle_scan_command(ctx, format).await,
            OnboardAction::Apply {
                selections,
                all,
                interactive,
            } => onboard::handle_apply_command(ctx, selections, all, interactive, format).await,
        },
        Commands::Cache {
            action: CacheAction::Clean { all },
        } => maintenance::handle_cache_clean_command(ctx, all, format).await,
        Commands::Settings { action } => match action {
            SettingsAction::Get { key } => maintenance::handle_settings_get_command(ctx, key, format),
            SettingsAction::Set { key, value } => {
                maintenance::handle_settings_set_command(ctx, &key, &value, format)
            }
        },
        Commands::Daemon {
            evict_every,
            temp_every,
        } => maintenance::handle_daemon_command(ctx, evict_every, temp_every).await,
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Epoch milliseconds as RFC 3339, or the raw number if out of range.
pub(crate) fn format_ms(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ms.to_string())
}

/// `~/...` for paths under `home`, the full path otherwise.
pub(crate) fn display_path(path: &Path, home: &Path) -> String {
    if path.starts_with(home) {
        if let Some(rel) = pathdiff::diff_paths(path, home) {
            return format!("~/{}", rel.display());
        }
    }
    path.display().to_string()
}
