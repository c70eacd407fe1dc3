//! Handlers for the onboarding scan and import.

use std::io::IsTerminal;

use anyhow::{bail, Result};
use inquire::{MultiSelect, Select};
use skillhub_discovery::{GroupStatus, OnboardingPlan, SkillGroup};
use skillhub_installer::{GroupOutcome, ImportResult, Selection};

use super::{display_path, print_json};
use crate::cli::OutputFormat;
use crate::context::AppContext;

fn status_label(status: GroupStatus) -> &'static str {
    match status {
        GroupStatus::Single => "single",
        GroupStatus::Consistent => "identical",
        GroupStatus::Conflict => "CONFLICT",
    }
}

fn group_label(group: &SkillGroup) -> String {
    let tools: Vec<&str> = group.variants.iter().map(|v| v.tool.as_str()).collect();
    format!(
        "{}  ({}; {})",
        group.name,
        status_label(group.status),
        tools.join(", ")
    )
}

fn print_plan(ctx: &AppContext, plan: &OnboardingPlan) {
    println!(
        "Scanned {} tool(s): {} unmanaged skill(s) in {} group(s), {} conflict(s)",
        plan.tools_scanned,
        plan.skills_found,
        plan.groups.len(),
        plan.conflicts().count()
    );
    let home = ctx.registry().home();
    for group in &plan.groups {
        println!("{}", group_label(group));
        for v in &group.variants {
            let link = v
                .link_target
                .as_ref()
                .map(|t| format!(" -> {}", t.display()))
                .unwrap_or_default();
            println!(
                "    {:<14} {}{}",
                v.tool,
                display_path(&v.path, home),
                link
            );
        }
    }
}

pub(crate) async fn handle_scan_command(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let plan = ctx.scan_onboarding().await?;
    if format.is_json() {
        return print_json(&plan);
    }
    print_plan(ctx, &plan);
    if !plan.groups.is_empty() {
        println!("Import with `skillhub onboard apply --all` or `--select name[=tool]`.");
    }
    Ok(())
}

fn choose_interactively(plan: &OnboardingPlan) -> Result<Vec<Selection>> {
    if !std::io::stdout().is_terminal() {
        bail!("interactive selection requires a TTY; pass --select instead");
    }
    let labels: Vec<String> = plan.groups.iter().map(group_label).collect();
    let defaults: Vec<usize> = plan
        .groups
        .iter()
        .enumerate()
        .filter(|(_, g)| !g.has_conflict())
        .map(|(i, _)| i)
        .collect();
    let chosen = MultiSelect::new("Select skills to take over", labels.clone())
        .with_default(&defaults)
        .prompt()?;

    let mut selections = Vec::new();
    for (group, label) in plan.groups.iter().zip(&labels) {
        if !chosen.contains(label) {
            continue;
        }
        if group.has_conflict() {
            let tools: Vec<String> = group.variants.iter().map(|v| v.tool.clone()).collect();
            let tool = Select::new(
                &format!("'{}' differs between tools; keep which copy?", group.name),
                tools,
            )
            .prompt()?;
            selections.push(Selection::variant(&group.name, tool));
        } else {
            selections.push(Selection::group(&group.name));
        }
    }
    Ok(selections)
}

fn print_import(result: &ImportResult) {
    for report in &result.groups {
        match &report.outcome {
            GroupOutcome::Imported {
                synced,
                left_unmanaged,
                failures,
                ..
            } => {
                let tools: Vec<&str> = synced.iter().map(|s| s.tool.as_str()).collect();
                println!("  ok    {}: managed in {}", report.name, tools.join(", "));
                if !left_unmanaged.is_empty() {
                    println!("        left as-is (different content): {}", left_unmanaged.join(", "));
                }
                for f in failures {
                    println!("        failed {}: [{}] {}", f.tool, f.code, f.message);
                }
            }
            GroupOutcome::NeedsSelection { tools } => println!(
                "  skip  {}: content differs; choose one with --select {}=<{}>",
                report.name,
                report.name,
                tools.join("|")
            ),
            GroupOutcome::Failed { error } => {
                println!("  FAIL  {}: [{}] {}", report.name, error.code, error.message)
            }
        }
    }
    println!("{} of {} group(s) imported", result.imported(), result.groups.len());
}

pub(crate) async fn handle_apply_command(
    ctx: &AppContext,
    selections: Vec<String>,
    all: bool,
    interactive: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut chosen: Vec<Selection> = selections.iter().map(|s| Selection::parse(s)).collect();
    if all || interactive {
        let plan = ctx.scan_onboarding().await?;
        if interactive {
            chosen.extend(choose_interactively(&plan)?);
        } else {
            chosen.extend(
                plan.groups
                    .iter()
                    .filter(|g| !g.has_conflict())
                    .map(|g| Selection::group(&g.name)),
            );
        }
    }
    if chosen.is_empty() {
        if all {
            println!("Nothing to import.");
            return Ok(());
        }
        bail!("nothing selected; pass --select name[=tool], --all, or --interactive");
    }

    let result = ctx.apply_onboarding(chosen).await?;
    if format.is_json() {
        return print_json(&result);
    }
    print_import(&result);
    Ok(())
}
