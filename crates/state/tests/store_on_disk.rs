use skillhub_state::{SkillRecord, SkillStore, SourceType, TargetMode, TargetRecord};
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn records_survive_reopen() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("nested/skillhub.db");

    let store = SkillStore::open(&db).unwrap();
    store
        .upsert_skill(&SkillRecord {
            id: "id-1".into(),
            name: "pdf".into(),
            source_type: SourceType::Git,
            source_ref: Some("https://github.com/acme/skills".into()),
            source_subpath: Some("skills/pdf".into()),
            source_branch: Some("main".into()),
            source_revision: Some("abc123".into()),
            central_path: tmp.path().join("skills/pdf"),
            content_hash: Some("ff".into()),
            created_at: 100,
            updated_at: 100,
        })
        .unwrap();
    store
        .upsert_target(&TargetRecord {
            skill_id: "id-1".into(),
            tool: "claude_code".into(),
            mode: TargetMode::Symlink,
            target_path: PathBuf::from("/home/u/.claude/skills/pdf"),
            synced_at: 200,
            content_hash: None,
        })
        .unwrap();
    store.close().unwrap();

    let reopened = SkillStore::open(&db).unwrap();
    let skill = reopened.get_skill("id-1").unwrap().unwrap();
    assert_eq!(skill.source_type, SourceType::Git);
    assert_eq!(skill.source_subpath.as_deref(), Some("skills/pdf"));
    let target = reopened.get_target("id-1", "claude_code").unwrap().unwrap();
    assert_eq!(target.mode, TargetMode::Symlink);
    assert_eq!(target.synced_at, 200);
}

#[test]
fn older_target_table_gains_copy_digest_column() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("skillhub.db");
    {
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE skill_targets (
                 skill_id TEXT NOT NULL,
                 tool TEXT NOT NULL,
                 mode TEXT NOT NULL,
                 target_path TEXT NOT NULL,
                 synced_at INTEGER NOT NULL,
                 UNIQUE(skill_id, tool)
             );
             INSERT INTO skill_targets VALUES ('id-1', 'cursor', 'copy', '/t/pdf', 5);",
        )
        .unwrap();
    }

    let store = SkillStore::open(&db).unwrap();
    let old = store.get_target("id-1", "cursor").unwrap().unwrap();
    assert_eq!(old.mode, TargetMode::Copy);
    assert_eq!(old.content_hash, None);

    store
        .upsert_target(&TargetRecord {
            content_hash: Some("abc".into()),
            ..old
        })
        .unwrap();
    let updated = store.get_target("id-1", "cursor").unwrap().unwrap();
    assert_eq!(updated.content_hash.as_deref(), Some("abc"));
}
