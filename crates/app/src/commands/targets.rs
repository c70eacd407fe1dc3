//! Handlers for realizing skills in tool directories.

use anyhow::Result;
use skillhub_sync::{SyncOptions, SyncOutcome};

use super::{display_path, print_json};
use crate::cli::OutputFormat;
use crate::context::AppContext;

fn print_outcome(ctx: &AppContext, out: &SyncOutcome) {
    println!(
        "{}: {} ({}) at {}",
        out.tool,
        out.action.description(),
        out.mode,
        display_path(&out.target_path, ctx.registry().home())
    );
    if out.fell_back {
        eprintln!(
            "warning: {} could not be linked; a copy was used and needs `skillhub refresh` after updates",
            out.tool
        );
    }
}

pub(crate) async fn handle_sync_command(
    ctx: &AppContext,
    skill: String,
    tool: String,
    overwrite: bool,
    verify: bool,
    format: OutputFormat,
) -> Result<()> {
    let opts = SyncOptions {
        overwrite,
        verify_on_disk: verify,
        ..SyncOptions::default()
    };
    let out = ctx.sync(skill, tool, opts).await?;
    if format.is_json() {
        return print_json(&out);
    }
    print_outcome(ctx, &out);
    Ok(())
}

pub(crate) async fn handle_unsync_command(
    ctx: &AppContext,
    skill: String,
    tool: String,
    format: OutputFormat,
) -> Result<()> {
    let out = ctx.unsync(skill, tool).await?;
    if format.is_json() {
        return print_json(&out);
    }
    let place = display_path(&out.target_path, ctx.registry().home());
    if out.removed_from_disk {
        println!("{}: removed {place}", out.tool);
    } else {
        println!("{}: target record removed", out.tool);
    }
    if let Some(w) = &out.warning {
        eprintln!("warning: {w}");
    }
    Ok(())
}

pub(crate) async fn handle_refresh_command(
    ctx: &AppContext,
    skill: String,
    tool: String,
    format: OutputFormat,
) -> Result<()> {
    let out = ctx.refresh_target(skill, tool).await?;
    if format.is_json() {
        return print_json(&out);
    }
    print_outcome(ctx, &out);
    Ok(())
}

pub(crate) fn handle_tools_command(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let status = ctx.tool_status();
    if format.is_json() {
        return print_json(&status);
    }
    let home = ctx.registry().home();
    for tool in &status {
        println!(
            "{:<15} {:<16} {:<10} {:<11} {}",
            tool.id,
            tool.label,
            if tool.installed { "installed" } else { "-" },
            tool.policy.as_str(),
            display_path(&tool.skills_dir, home)
        );
    }
    Ok(())
}
