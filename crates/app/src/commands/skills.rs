//! Handlers for installing, listing, updating, and deleting managed skills.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Result};
use inquire::MultiSelect;
use skillhub_installer::{BatchItem, BatchOutcome, GitCandidate, GitInstall};
use skillhub_state::SkillRecord;

use super::{display_path, format_ms, print_json};
use crate::cli::OutputFormat;
use crate::context::{AppContext, GitRequest};

fn describe_skill(ctx: &AppContext, skill: &SkillRecord) -> String {
    format!(
        "{} ({}) -> {}",
        skill.name,
        skill.id,
        display_path(&skill.central_path, ctx.registry().home())
    )
}

pub(crate) async fn handle_install_command(
    ctx: &AppContext,
    path: PathBuf,
    name: Option<String>,
    overwrite: bool,
    format: OutputFormat,
) -> Result<()> {
    let skill = ctx.install_local(path, name, overwrite).await?;
    if format.is_json() {
        return print_json(&skill);
    }
    println!("Installed {}", describe_skill(ctx, &skill));
    Ok(())
}

pub(crate) struct InstallGitArgs {
    pub url: String,
    pub subpaths: Vec<String>,
    pub name: Option<String>,
    pub branch: Option<String>,
    pub overwrite: bool,
    pub interactive: bool,
}

fn candidate_label(c: &GitCandidate) -> String {
    match &c.description {
        Some(desc) => format!("{}  [{}]  {}", c.name, c.subpath, desc),
        None => format!("{}  [{}]", c.name, c.subpath),
    }
}

fn pick_candidates(candidates: &[GitCandidate]) -> Result<Vec<String>> {
    if !std::io::stdout().is_terminal() {
        bail!("interactive selection requires a TTY; pass --subpath instead");
    }
    let labels: Vec<String> = candidates.iter().map(candidate_label).collect();
    let chosen = MultiSelect::new(
        "Select skills to install (space to toggle, enter to confirm)",
        labels.clone(),
    )
    .prompt()?;
    Ok(candidates
        .iter()
        .zip(labels)
        .filter(|(_, label)| chosen.contains(label))
        .map(|(c, _)| c.subpath.clone())
        .collect())
}

fn print_batch(ctx: &AppContext, items: &[BatchItem]) {
    for item in items {
        match &item.outcome {
            BatchOutcome::Installed { skill } => {
                println!("  ok    {}: {}", item.subpath, describe_skill(ctx, skill))
            }
            BatchOutcome::Failed { error } => {
                println!("  FAIL  {}: [{}] {}", item.subpath, error.code, error.message)
            }
        }
    }
    let ok = items.iter().filter(|i| i.is_ok()).count();
    println!("{ok} of {} installed", items.len());
}

pub(crate) async fn handle_install_git_command(
    ctx: &AppContext,
    args: InstallGitArgs,
    format: OutputFormat,
) -> Result<()> {
    let request = GitRequest {
        url: args.url,
        branch: args.branch,
        subpath: None,
        name: args.name,
        overwrite: args.overwrite,
    };

    if args.subpaths.len() > 1 {
        if request.name.is_some() {
            bail!("--name applies to single installs only");
        }
        let items = ctx.install_git_batch(request, args.subpaths).await?;
        return finish_batch(ctx, &items, format);
    }

    let single = GitRequest {
        subpath: args.subpaths.into_iter().next(),
        ..request.clone()
    };
    match ctx.install_git(single).await? {
        GitInstall::Installed { skill, warning } => {
            if format.is_json() {
                return print_json(&GitInstall::Installed { skill, warning });
            }
            if let Some(w) = &warning {
                eprintln!("warning: {w}");
            }
            println!("Installed {}", describe_skill(ctx, &skill));
            Ok(())
        }
        GitInstall::MultipleCandidates { candidates, .. } if args.interactive => {
            let subpaths = pick_candidates(&candidates)?;
            if subpaths.is_empty() {
                println!("Nothing selected.");
                return Ok(());
            }
            let items = ctx.install_git_batch(request, subpaths).await?;
            finish_batch(ctx, &items, format)
        }
        GitInstall::MultipleCandidates {
            repo_url,
            branch,
            candidates,
        } => {
            if format.is_json() {
                return print_json(&GitInstall::MultipleCandidates {
                    repo_url,
                    branch,
                    candidates,
                });
            }
            println!("{repo_url} holds {} skills:", candidates.len());
            for c in &candidates {
                println!("  {}", candidate_label(c));
            }
            println!("Re-run with --subpath <PATH> (repeatable) or --interactive.");
            Ok(())
        }
    }
}

fn finish_batch(ctx: &AppContext, items: &[BatchItem], format: OutputFormat) -> Result<()> {
    if format.is_json() {
        print_json(items)?;
    } else {
        print_batch(ctx, items);
    }
    if items.iter().all(|i| !i.is_ok()) {
        bail!("no skill was installed");
    }
    Ok(())
}

pub(crate) async fn handle_candidates_command(
    ctx: &AppContext,
    url: String,
    branch: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = GitRequest {
        branch,
        ..GitRequest::new(url)
    };
    let candidates = ctx.list_git_candidates(request).await?;
    if format.is_json() {
        return print_json(&candidates);
    }
    if candidates.is_empty() {
        println!("No candidate skills found.");
    }
    for c in &candidates {
        println!("{}", candidate_label(c));
    }
    Ok(())
}

pub(crate) fn handle_list_command(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let managed = ctx.list_managed()?;
    if format.is_json() {
        return print_json(&managed);
    }
    if managed.is_empty() {
        println!("No managed skills. Use `skillhub install` or `skillhub onboard scan`.");
        return Ok(());
    }
    let home = ctx.registry().home();
    for entry in &managed {
        let skill = &entry.skill;
        let source = skill.source_ref.as_deref().unwrap_or("-");
        println!(
            "{}  [{}: {}]  updated {}",
            skill.name,
            skill.source_type.as_str(),
            source,
            format_ms(skill.updated_at)
        );
        for t in &entry.targets {
            println!(
                "    {:<14} {:<8} {}",
                t.tool,
                t.mode.as_str(),
                display_path(&t.target_path, home)
            );
        }
    }
    Ok(())
}

pub(crate) async fn handle_update_command(
    ctx: &AppContext,
    skill: String,
    refresh_copies: bool,
    format: OutputFormat,
) -> Result<()> {
    let (update, refreshed) = ctx.update_from_source(skill, refresh_copies).await?;
    if format.is_json() {
        return print_json(&serde_json::json!({
            "update": update,
            "refreshed": refreshed,
        }));
    }
    if let Some(w) = &update.warning {
        eprintln!("warning: {w}");
    }
    if !update.changed {
        println!("{} is up to date", update.skill.name);
        return Ok(());
    }
    match &update.revision {
        Some(rev) => println!("Updated {} to {rev}", update.skill.name),
        None => println!("Updated {}", update.skill.name),
    }
    match refreshed {
        Some(report) => println!("{}", report.format_summary("Refreshed")),
        None if !update.copy_targets.is_empty() => println!(
            "Copy targets need a refresh: {} (use --refresh-copies or `skillhub refresh`)",
            update.copy_targets.join(", ")
        ),
        None => {}
    }
    Ok(())
}

pub(crate) async fn handle_delete_command(
    ctx: &AppContext,
    skill: String,
    format: OutputFormat,
) -> Result<()> {
    let report = ctx.delete_skill(skill).await?;
    if format.is_json() {
        return print_json(&report);
    }
    println!("Deleted {} ({})", report.name, report.targets.format_summary("removed"));
    for w in &report.targets.warnings {
        eprintln!("warning: {w}");
    }
    for f in &report.targets.failed {
        eprintln!("failed: {} [{}] {}", f.tool, f.code, f.message);
    }
    Ok(())
}
