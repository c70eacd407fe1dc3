//! End-to-end behaviour of the sync engine against real tool directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skillhub_core::{inspect_path, ErrorKind, PathKind};
use skillhub_discovery::ToolRegistry;
use skillhub_state::{SkillRecord, SkillStore, SourceType, TargetMode};
use skillhub_sync::{SyncAction, SyncEngine, SyncOptions};
use skillhub_test_utils::{write_skill, HubFixture};

struct SyncTestContext {
    fixture: HubFixture,
    store: Arc<SkillStore>,
    engine: SyncEngine,
}

impl SyncTestContext {
    fn new() -> Self {
        Self::with_force_copy(&[])
    }

    fn with_force_copy(tools: &[&str]) -> Self {
        let fixture = HubFixture::new().unwrap();
        let store = Arc::new(SkillStore::open_in_memory().unwrap());
        let registry = Arc::new(ToolRegistry::new(&fixture.home).with_force_copy(tools));
        let engine = SyncEngine::new(store.clone(), registry);
        Self {
            fixture,
            store,
            engine,
        }
    }

    /// Same store, different force-copy overrides.
    fn reconfigured(&self, tools: &[&str]) -> SyncEngine {
        let registry = Arc::new(ToolRegistry::new(&self.fixture.home).with_force_copy(tools));
        SyncEngine::new(self.store.clone(), registry)
    }

    fn add_skill(&self, name: &str, body: &str) -> SkillRecord {
        let central = write_skill(&self.fixture.central_root(), name, body).unwrap();
        let record = SkillRecord {
            id: format!("{name}-id"),
            name: name.to_string(),
            source_type: SourceType::Local,
            source_ref: Some(self.fixture.sources.join(name).display().to_string()),
            source_subpath: None,
            source_branch: None,
            source_revision: None,
            central_path: central,
            content_hash: None,
            created_at: 1,
            updated_at: 1,
        };
        self.store.upsert_skill(&record).unwrap();
        record
    }

    fn tool_path(&self, rel: &str, name: &str) -> PathBuf {
        self.fixture.home.join(rel).join(name)
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path.join("SKILL.md")).unwrap()
}

#[cfg(unix)]
#[test]
fn linked_target_reads_central_edits_immediately() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");

    let out = ctx
        .engine
        .sync(&skill.id, "claude_code", &SyncOptions::default())
        .unwrap();
    let dest = ctx.tool_path(".claude/skills", "foo");
    assert_eq!(out.action, SyncAction::Created);
    assert_eq!(out.mode, TargetMode::Symlink);
    assert_eq!(out.target_path, dest);
    assert_eq!(
        inspect_path(&dest).unwrap(),
        PathKind::Link(skill.central_path.clone())
    );

    fs::write(skill.central_path.join("SKILL.md"), "v2").unwrap();
    assert_eq!(read(&dest), "v2");
}

#[test]
fn copied_target_waits_for_refresh() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");

    let out = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::default())
        .unwrap();
    let dest = ctx.tool_path(".cursor/skills", "foo");
    assert_eq!(out.mode, TargetMode::Copy);
    assert_eq!(inspect_path(&dest).unwrap(), PathKind::Dir);

    fs::write(skill.central_path.join("SKILL.md"), "v2").unwrap();
    assert_eq!(read(&dest), "v1");

    let refreshed = ctx.engine.refresh_copy_target(&skill.id, "cursor").unwrap();
    assert_eq!(refreshed.action, SyncAction::Refreshed);
    assert_eq!(read(&dest), "v2");
}

#[cfg(unix)]
#[test]
fn force_copy_tool_never_links_while_others_do() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let opts = SyncOptions::default();

    let linked = ctx.engine.sync(&skill.id, "claude_code", &opts).unwrap();
    let copied = ctx.engine.sync(&skill.id, "cursor", &opts).unwrap();
    assert!(linked.mode.is_link());
    assert_eq!(copied.mode, TargetMode::Copy);
    assert!(!copied.fell_back);
    assert_eq!(inspect_path(&copied.target_path).unwrap(), PathKind::Dir);
}

#[test]
fn second_sync_only_moves_synced_at() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let opts = SyncOptions::default();

    let first = ctx.engine.sync(&skill.id, "cursor", &opts).unwrap();
    let marker = first.target_path.join("local-note.md");
    fs::write(&marker, "kept").unwrap();

    let second = ctx.engine.sync(&skill.id, "cursor", &opts).unwrap();
    assert_eq!(second.action, SyncAction::Unchanged);
    assert_eq!(second.mode, first.mode);
    assert!(second.synced_at >= first.synced_at);
    // No recopy happened.
    assert!(marker.exists());

    let row = ctx.store.get_target(&skill.id, "cursor").unwrap().unwrap();
    assert_eq!(row.synced_at, second.synced_at);
}

#[test]
fn trusted_record_ignores_out_of_band_deletion() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let first = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::default())
        .unwrap();
    fs::remove_dir_all(&first.target_path).unwrap();

    let again = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::default())
        .unwrap();
    assert_eq!(again.action, SyncAction::Unchanged);
    assert_eq!(inspect_path(&first.target_path).unwrap(), PathKind::Missing);
}

#[test]
fn verified_sync_repairs_out_of_band_deletion() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let verify = SyncOptions {
        verify_on_disk: true,
        ..SyncOptions::default()
    };
    let first = ctx.engine.sync(&skill.id, "cursor", &verify).unwrap();
    fs::remove_dir_all(&first.target_path).unwrap();

    let repaired = ctx.engine.sync(&skill.id, "cursor", &verify).unwrap();
    assert_eq!(repaired.action, SyncAction::Repaired);
    assert_eq!(read(&first.target_path), "v1");

    let settled = ctx.engine.sync(&skill.id, "cursor", &verify).unwrap();
    assert_eq!(settled.action, SyncAction::Unchanged);
}

#[cfg(unix)]
#[test]
fn verified_sync_refuses_to_clobber_a_foreign_replacement() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let verify = SyncOptions {
        verify_on_disk: true,
        ..SyncOptions::default()
    };
    let first = ctx.engine.sync(&skill.id, "claude_code", &verify).unwrap();
    fs::remove_file(&first.target_path).unwrap();
    fs::create_dir_all(&first.target_path).unwrap();
    fs::write(first.target_path.join("mine.txt"), "user data").unwrap();

    let err = ctx.engine.sync(&skill.id, "claude_code", &verify).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(
        fs::read_to_string(first.target_path.join("mine.txt")).unwrap(),
        "user data"
    );
}

#[test]
fn unmanaged_destination_is_a_conflict_and_left_untouched() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "central");
    let existing = write_skill(&ctx.fixture.home.join(".cursor/skills"), "foo", "theirs").unwrap();
    fs::write(existing.join("extra.bin"), [0u8, 1, 2, 3]).unwrap();
    let before = skillhub_core::hash_dir(&existing).unwrap();

    let err = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.kind().code(), "TARGET_EXISTS");
    assert_eq!(skillhub_core::hash_dir(&existing).unwrap(), before);
    assert_eq!(fs::read(existing.join("extra.bin")).unwrap(), vec![0u8, 1, 2, 3]);
    assert!(ctx.store.get_target(&skill.id, "cursor").unwrap().is_none());

    let replaced = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::overwrite())
        .unwrap();
    assert_eq!(replaced.action, SyncAction::Replaced);
    assert_eq!(read(&existing), "central");
    assert!(!existing.join("extra.bin").exists());
}

#[cfg(unix)]
#[test]
fn existing_link_to_central_copy_is_adopted() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let tool_dir = ctx.fixture.tool_dir(".claude/skills").unwrap();
    std::os::unix::fs::symlink(&skill.central_path, tool_dir.join("foo")).unwrap();

    let out = ctx
        .engine
        .sync(&skill.id, "claude_code", &SyncOptions::default())
        .unwrap();
    assert_eq!(out.action, SyncAction::Adopted);
    assert!(!out.action.mutated());
}

#[cfg(unix)]
#[test]
fn policy_change_migrates_between_link_and_copy() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let opts = SyncOptions::default();
    let dest = ctx.tool_path(".claude/skills", "foo");

    ctx.engine.sync(&skill.id, "claude_code", &opts).unwrap();
    assert!(matches!(inspect_path(&dest).unwrap(), PathKind::Link(_)));

    let copying = ctx.reconfigured(&["claude_code"]);
    let migrated = copying.sync(&skill.id, "claude_code", &opts).unwrap();
    assert_eq!(migrated.action, SyncAction::Migrated);
    assert_eq!(migrated.mode, TargetMode::Copy);
    assert_eq!(inspect_path(&dest).unwrap(), PathKind::Dir);
    assert_eq!(read(&dest), "v1");

    let back = ctx.engine.sync(&skill.id, "claude_code", &opts).unwrap();
    assert_eq!(back.action, SyncAction::Migrated);
    assert_eq!(back.mode, TargetMode::Symlink);
    assert!(matches!(inspect_path(&dest).unwrap(), PathKind::Link(_)));
}

#[cfg(unix)]
#[test]
fn unsync_removes_link_but_never_central_content() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let out = ctx
        .engine
        .sync(&skill.id, "claude_code", &SyncOptions::default())
        .unwrap();

    let removed = ctx.engine.unsync(&skill.id, "claude_code").unwrap();
    assert!(removed.removed_from_disk);
    assert!(removed.warning.is_none());
    assert_eq!(inspect_path(&out.target_path).unwrap(), PathKind::Missing);
    assert_eq!(read(&skill.central_path), "v1");
    assert!(ctx.store.get_target(&skill.id, "claude_code").unwrap().is_none());
}

#[cfg(unix)]
#[test]
fn unsync_leaves_foreign_replacement_and_drops_record() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let out = ctx
        .engine
        .sync(&skill.id, "claude_code", &SyncOptions::default())
        .unwrap();
    // User swapped our link for their own directory.
    fs::remove_file(&out.target_path).unwrap();
    fs::create_dir_all(&out.target_path).unwrap();
    fs::write(out.target_path.join("notes.txt"), "mine").unwrap();

    let removed = ctx.engine.unsync(&skill.id, "claude_code").unwrap();
    assert!(!removed.removed_from_disk);
    assert!(removed.warning.is_some());
    assert_eq!(
        fs::read_to_string(out.target_path.join("notes.txt")).unwrap(),
        "mine"
    );
    assert!(ctx.store.get_target(&skill.id, "claude_code").unwrap().is_none());
}

#[test]
fn unsync_leaves_a_user_directory_in_place_of_a_copy() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let out = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::default())
        .unwrap();
    assert_eq!(out.mode, TargetMode::Copy);
    // User swapped our copy for a directory of their own.
    fs::remove_dir_all(&out.target_path).unwrap();
    fs::create_dir_all(&out.target_path).unwrap();
    fs::write(out.target_path.join("my-notes.txt"), "mine").unwrap();

    let removed = ctx.engine.unsync(&skill.id, "cursor").unwrap();
    assert!(!removed.removed_from_disk);
    assert!(removed.warning.is_some());
    assert_eq!(
        fs::read_to_string(out.target_path.join("my-notes.txt")).unwrap(),
        "mine"
    );
    assert!(ctx.store.get_target(&skill.id, "cursor").unwrap().is_none());
}

#[test]
fn unsync_removes_an_untouched_copy_even_after_central_edits() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let out = ctx
        .engine
        .sync(&skill.id, "cursor", &SyncOptions::default())
        .unwrap();
    fs::write(skill.central_path.join("SKILL.md"), "v2").unwrap();

    let removed = ctx.engine.unsync(&skill.id, "cursor").unwrap();
    assert!(removed.removed_from_disk);
    assert!(removed.warning.is_none());
    assert_eq!(inspect_path(&out.target_path).unwrap(), PathKind::Missing);
}

#[cfg(unix)]
#[test]
fn unsync_leaves_a_lookalike_skill_in_place_of_a_link() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let out = ctx
        .engine
        .sync(&skill.id, "claude_code", &SyncOptions::default())
        .unwrap();
    // Same layout as the central copy, different content.
    fs::remove_file(&out.target_path).unwrap();
    write_skill(&ctx.fixture.home.join(".claude/skills"), "foo", "their own skill").unwrap();

    let removed = ctx.engine.unsync(&skill.id, "claude_code").unwrap();
    assert!(!removed.removed_from_disk);
    assert!(removed.warning.is_some());
    assert_eq!(read(&out.target_path), "their own skill");
}

#[test]
fn verified_sync_treats_an_edited_copy_as_foreign() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let verify = SyncOptions {
        verify_on_disk: true,
        ..SyncOptions::default()
    };
    let first = ctx.engine.sync(&skill.id, "cursor", &verify).unwrap();
    fs::write(first.target_path.join("my-notes.txt"), "mine").unwrap();

    let err = ctx.engine.sync(&skill.id, "cursor", &verify).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(first.target_path.join("my-notes.txt").exists());
}

#[test]
fn unsync_of_unknown_target_is_not_found() {
    let ctx = SyncTestContext::new();
    let skill = ctx.add_skill("foo", "v1");
    let err = ctx.engine.unsync(&skill.id, "cursor").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn multi_target_helpers_cover_every_tool() {
    let ctx = SyncTestContext::with_force_copy(&["claude_code"]);
    let skill = ctx.add_skill("foo", "v1");
    for tool in ["cursor", "claude_code"] {
        ctx.engine
            .sync(&skill.id, tool, &SyncOptions::default())
            .unwrap();
    }
    fs::write(skill.central_path.join("SKILL.md"), "v2").unwrap();

    let refreshed = ctx.engine.refresh_copy_targets(&skill.id).unwrap();
    assert_eq!(refreshed.succeeded.len(), 2);
    assert_eq!(read(&ctx.tool_path(".claude/skills", "foo")), "v2");

    let removed = ctx.engine.unsync_all(&skill.id).unwrap();
    assert!(removed.is_clean());
    assert_eq!(removed.succeeded.len(), 2);
    assert!(ctx.store.list_targets(&skill.id).unwrap().is_empty());
}

#[test]
fn parallel_syncs_of_one_pair_create_once() {
    let ctx = Arc::new(SyncTestContext::new());
    let skill = ctx.add_skill("foo", "v1");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ctx = ctx.clone();
            let id = skill.id.clone();
            std::thread::spawn(move || {
                ctx.engine
                    .sync(&id, "cursor", &SyncOptions::default())
                    .unwrap()
                    .action
            })
        })
        .collect();
    let actions: Vec<SyncAction> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        actions
            .iter()
            .filter(|a| **a == SyncAction::Created)
            .count(),
        1
    );
    assert_eq!(
        actions
            .iter()
            .filter(|a| **a == SyncAction::Unchanged)
            .count(),
        3
    );
}
