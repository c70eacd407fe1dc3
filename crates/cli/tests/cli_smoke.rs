//! CLI integration tests for the `skillhub` binary.
//!
//! Each test runs the real executable against a throwaway home, data
//! directory, and cache directory.

use std::env;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result};
use scopeguard::guard;
use skillhub_test_utils::{env_guard, HubFixture};

fn skillhub(fixture: &HubFixture, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_skillhub"))
        .args(args)
        .env("HOME", &fixture.home)
        .env("SKILLHUB_DATA_DIR", &fixture.data_dir)
        .env("SKILLHUB_CACHE_DIR", &fixture.cache_dir)
        .env_remove("SKILLHUB_CENTRAL_REPO")
        .env_remove("SKILLHUB_FORCE_COPY_TOOLS")
        .output()
        .with_context(|| format!("failed to execute skillhub {}", args.join(" ")))?;

    // In debug builds, always show output
    if cfg!(debug_assertions) {
        let cmd = args.join(" ");
        eprintln!("skillhub {cmd} stdout:\n{}", String::from_utf8_lossy(&output.stdout));
        eprintln!("skillhub {cmd} stderr:\n{}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(output)
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} should succeed\n\
         Status: {:?}\n\
         STDERR:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn given_local_skill_when_installed_and_synced_then_claude_sees_it() -> Result<()> {
    let _g = env_guard();

    // Restore HOME when test exits (even on panic)
    let original_home = env::var("HOME").ok();
    let _home_guard = guard(original_home, |original_home| match original_home {
        Some(home) => env::set_var("HOME", home),
        None => env::remove_var("HOME"),
    });

    // GIVEN a local skill and an installed Claude Code
    let fixture = HubFixture::new()?;
    env::set_var("HOME", &fixture.home);
    let src = fixture.source_skill(
        "cli-test",
        "---\nname: cli-test\ndescription: CLI test skill\n---\n# CLI Test\n",
    )?;
    fixture.tool_dir(".claude")?;

    // WHEN the user installs it and syncs it into Claude Code
    let install = skillhub(&fixture, &["install", &path_arg(&src)])?;
    assert_success(&install, "install");
    let sync = skillhub(&fixture, &["sync", "cli-test", "claude_code"])?;
    assert_success(&sync, "sync");

    // THEN the tool directory holds the skill
    let synced = fixture.home.join(".claude/skills/cli-test/SKILL.md");
    assert!(synced.exists(), "claude skills directory should receive the skill");
    assert!(fixture.central_root().join("cli-test/SKILL.md").is_file());

    // AND the JSON listing records the target
    let list = skillhub(&fixture, &["list", "--format", "json"])?;
    assert_success(&list, "list");
    let listed: serde_json::Value = serde_json::from_slice(&list.stdout)?;
    let entries = listed.as_array().context("list output is an array")?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "cli-test");
    assert_eq!(entries[0]["targets"][0]["tool"], "claude_code");
    Ok(())
}

#[test]
fn given_fresh_home_when_listing_tools_then_detected_tools_are_marked() -> Result<()> {
    let _g = env_guard();
    let fixture = HubFixture::new()?;
    fixture.tool_dir(".cursor")?;

    let output = skillhub(&fixture, &["tools", "--format", "json"])?;
    assert_success(&output, "tools");
    let tools: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let tools = tools.as_array().context("tools output is an array")?;
    let cursor = tools
        .iter()
        .find(|t| t["id"] == "cursor")
        .context("cursor listed")?;
    assert_eq!(cursor["installed"], true);
    assert_eq!(cursor["policy"], "force_copy");
    let codex = tools.iter().find(|t| t["id"] == "codex").context("codex listed")?;
    assert_eq!(codex["installed"], false);
    Ok(())
}

#[test]
fn given_unknown_skill_when_syncing_then_json_error_is_reported() -> Result<()> {
    let _g = env_guard();
    let fixture = HubFixture::new()?;
    fixture.tool_dir(".claude")?;

    let output = skillhub(&fixture, &["sync", "ghost", "claude_code", "--format", "json"])?;
    assert!(!output.status.success(), "sync of an unknown skill must fail");
    let body: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(!fixture.home.join(".claude/skills/ghost").exists());
    Ok(())
}

#[test]
fn given_settings_when_set_then_get_reads_them_back() -> Result<()> {
    let _g = env_guard();
    let fixture = HubFixture::new()?;

    let set = skillhub(&fixture, &["settings", "set", "git_cache_ttl_secs", "90"])?;
    assert_success(&set, "settings set");
    let get = skillhub(&fixture, &["settings", "get", "git_cache_ttl_secs"])?;
    assert_success(&get, "settings get");
    assert!(String::from_utf8_lossy(&get.stdout).contains("git_cache_ttl_secs = 90"));

    let bad = skillhub(&fixture, &["settings", "set", "git_cache_ttl_secs", "abc"])?;
    assert!(!bad.status.success());
    assert!(fs::metadata(fixture.data_dir.join("skillhub.db"))?.is_file());
    Ok(())
}
