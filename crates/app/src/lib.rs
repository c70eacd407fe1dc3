//! Application layer for the `skillhub` binary.
//!
//! The main entry point is [`run`], which applies the config file, builds the
//! process-wide [`AppContext`], and dispatches one CLI command. Embedders
//! (a GUI shell, tests) can build an [`AppContext`] directly and call its
//! async entry points; [`BackgroundSweeps`] runs the periodic cache
//! maintenance for long-lived processes.

#![deny(unsafe_code)]

pub mod background;
pub mod cli;
mod commands;
pub mod config;
pub mod context;

use anyhow::Result;
use clap::Parser;
use skillhub_core::HubError;

pub use background::{BackgroundSweeps, SweepSchedule};
pub use cli::{Cli, Commands, OutputFormat};
pub use context::{AppContext, GitRequest, ManagedSkill};

fn report_json_error(err: &anyhow::Error) {
    let code = err
        .downcast_ref::<HubError>()
        .map(|e| e.kind().code())
        .unwrap_or("INTERNAL");
    let body = serde_json::json!({
        "error": { "code": code, "message": format!("{err:#}") }
    });
    println!("{body}");
}

/// The main entry point for the `skillhub` application.
pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    config::apply_config_to_env();
    let cli = Cli::parse();
    let format = cli.format;

    let rt = tokio::runtime::Runtime::new()?;
    let ctx = AppContext::init()?;
    let result = rt.block_on(commands::dispatch(&ctx, cli.command, format));
    drop(rt);
    ctx.shutdown()?;

    if let Err(err) = &result {
        if format.is_json() {
            report_json_error(err);
        }
    }
    result
}
