//! Handlers for cache maintenance, settings, and daemon mode.

use std::time::Duration;

use anyhow::{Context, Result};
use skillhub_state::settings::{self, KNOWN_KEYS};

use super::print_json;
use crate::background::{BackgroundSweeps, SweepSchedule};
use crate::cli::OutputFormat;
use crate::context::AppContext;

pub(crate) async fn handle_cache_clean_command(
    ctx: &AppContext,
    all: bool,
    format: OutputFormat,
) -> Result<()> {
    let report = ctx.sweep_cache(all).await?;
    if format.is_json() {
        return print_json(&report);
    }
    println!(
        "Removed {} cache entr{}{}{}",
        report.removed,
        if report.removed == 1 { "y" } else { "ies" },
        if report.busy > 0 {
            format!(", {} in use", report.busy)
        } else {
            String::new()
        },
        if report.failed > 0 {
            format!(", {} failed", report.failed)
        } else {
            String::new()
        }
    );
    Ok(())
}

pub(crate) fn handle_settings_get_command(
    ctx: &AppContext,
    key: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let keys: Vec<&str> = match &key {
        Some(k) => vec![k.as_str()],
        None => KNOWN_KEYS.to_vec(),
    };
    let mut values = serde_json::Map::new();
    for k in keys {
        let value = settings::get_display(ctx.store(), k)?;
        values.insert(k.to_string(), serde_json::Value::String(value));
    }
    if format.is_json() {
        return print_json(&values);
    }
    for (k, v) in &values {
        match v.as_str() {
            Some("") => println!("{k} = (unset)"),
            Some(s) => println!("{k} = {s}"),
            None => println!("{k} = {v}"),
        }
    }
    Ok(())
}

pub(crate) fn handle_settings_set_command(
    ctx: &AppContext,
    key: &str,
    value: &str,
    format: OutputFormat,
) -> Result<()> {
    ctx.set_setting(key, value)?;
    let stored = settings::get_display(ctx.store(), key)?;
    if format.is_json() {
        return print_json(&serde_json::json!({ key: stored }));
    }
    println!("{key} = {stored}");
    if key == settings::KEY_CENTRAL_REPO_PATH {
        println!("Managed skills moved to {}.", ctx.central_root().display());
    } else if key == settings::KEY_FORCE_COPY_TOOLS {
        println!("Takes effect on the next start.");
    }
    Ok(())
}

/// Run both sweeps until Ctrl-C.
pub(crate) async fn handle_daemon_command(
    ctx: &AppContext,
    evict_every_mins: u64,
    temp_every_mins: u64,
) -> Result<()> {
    let minutes = |m: u64| Duration::from_secs(m.max(1) * 60);
    let schedule = SweepSchedule {
        cache_eviction: minutes(evict_every_mins),
        temp_cleanup: minutes(temp_every_mins),
        ..SweepSchedule::default()
    };
    let sweeps = BackgroundSweeps::start(ctx, schedule);
    tracing::info!(
        evict_every_mins,
        temp_every_mins,
        cache = %ctx.git_cache().root().display(),
        "daemon running; press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c()
        .await
        .context("wait for Ctrl-C")?;
    sweeps.stop();
    tracing::info!("daemon stopped");
    Ok(())
}
