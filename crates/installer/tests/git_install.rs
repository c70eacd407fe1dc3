//! Git installs through the fetch cache, using a local fake client.

mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{names_in, Hub};
use skillhub_core::ErrorKind;
use skillhub_installer::{BatchOutcome, GitInstall, GitSource};
use skillhub_state::SourceType;
use skillhub_test_utils::{write_skill, write_skill_with_frontmatter};

const REPO: &str = "https://github.com/acme/kit";

fn installed(result: GitInstall) -> skillhub_state::SkillRecord {
    match result {
        GitInstall::Installed { skill, .. } => skill,
        other => panic!("expected install, got {other:?}"),
    }
}

#[test]
fn root_skill_repository_installs_without_git_metadata() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    fs::write(repo.join("SKILL.md"), "# kit").unwrap();
    hub.git.register(REPO, &repo);
    hub.git.set_revision("abc123");

    let source = GitSource::parse("https://github.com/acme/kit.git/", None, None).unwrap();
    let skill = installed(hub.installer.install_git_skill(&source, None, false).unwrap());
    assert_eq!(skill.name, "kit");
    assert_eq!(skill.source_type, SourceType::Git);
    assert_eq!(skill.source_ref.as_deref(), Some(REPO));
    assert_eq!(skill.source_revision.as_deref(), Some("abc123"));
    assert_eq!(names_in(&skill.central_path), vec!["SKILL.md"]);
}

#[test]
fn several_candidates_are_returned_for_selection() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    write_skill_with_frontmatter(&repo, "pdf", "Read PDFs", "body").unwrap();
    write_skill(&repo.join("skills"), "xlsx", "# xlsx").unwrap();
    hub.git.register(REPO, &repo);

    let source = GitSource::parse(REPO, None, None).unwrap();
    match hub.installer.install_git_skill(&source, None, false).unwrap() {
        GitInstall::MultipleCandidates { candidates, .. } => {
            let subpaths: Vec<_> = candidates.iter().map(|c| c.subpath.as_str()).collect();
            assert_eq!(subpaths, vec!["pdf", "skills/xlsx"]);
            assert_eq!(candidates[0].description.as_deref(), Some("Read PDFs"));
        }
        other => panic!("expected candidates, got {other:?}"),
    }
    assert!(hub.store.list_skills().unwrap().is_empty());
    assert!(names_in(&hub.fixture.central_root()).is_empty());
}

#[test]
fn single_candidate_installs_directly() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    write_skill(&repo.join("skills"), "only", "# only").unwrap();
    hub.git.register(REPO, &repo);

    let source = GitSource::parse(REPO, None, None).unwrap();
    let skill = installed(hub.installer.install_git_skill(&source, None, false).unwrap());
    assert_eq!(skill.name, "only");
    assert_eq!(skill.source_subpath.as_deref(), Some("skills/only"));
}

#[test]
fn tree_url_installs_its_subpath() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    write_skill(&repo.join("skills"), "pdf", "# pdf").unwrap();
    write_skill(&repo.join("skills"), "xlsx", "# xlsx").unwrap();
    hub.git.register(REPO, &repo);

    let source = GitSource::parse(&format!("{REPO}/tree/main/skills/pdf"), None, None).unwrap();
    let skill = installed(hub.installer.install_git_skill(&source, None, false).unwrap());
    assert_eq!(skill.name, "pdf");
    assert_eq!(skill.source_branch.as_deref(), Some("main"));
}

#[test]
fn batch_reports_each_item_on_its_own() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    for name in ["one", "two", "three"] {
        write_skill(&repo.join("skills"), name, name).unwrap();
    }
    hub.git.register(REPO, &repo);
    let source = GitSource::parse(REPO, None, None).unwrap();
    let listed = hub.installer.list_git_candidates(&source).unwrap();
    assert_eq!(listed.len(), 3);

    // One candidate disappears upstream before the batch re-fetches.
    fs::remove_dir_all(repo.join("skills/two")).unwrap();
    let subpaths: Vec<String> = listed.into_iter().map(|c| c.subpath).collect();
    let items = hub
        .installer
        .install_git_batch(&source, &subpaths, false)
        .unwrap();

    assert_eq!(items.len(), 3);
    let ok: Vec<_> = items.iter().filter(|i| i.is_ok()).map(|i| &i.subpath).collect();
    assert_eq!(ok, vec!["skills/one", "skills/three"]);
    match &items.iter().find(|i| i.subpath == "skills/two").unwrap().outcome {
        BatchOutcome::Failed { error } => assert_eq!(error.code, "NOT_FOUND"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(hub.store.list_skills().unwrap().len(), 2);
}

#[test]
fn git_update_follows_upstream_and_reports_revision() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    fs::write(repo.join("SKILL.md"), "v1").unwrap();
    hub.git.register(REPO, &repo);
    hub.git.set_revision("r1");
    let source = GitSource::parse(REPO, None, None).unwrap();
    let skill = installed(hub.installer.install_git_skill(&source, None, false).unwrap());

    fs::write(repo.join("SKILL.md"), "v2").unwrap();
    hub.git.set_revision("r2");
    let update = hub.installer.update_skill_from_source(&skill.id).unwrap();
    assert!(update.changed);
    assert_eq!(update.revision.as_deref(), Some("r2"));
    assert!(update.warning.is_none());
    assert_eq!(
        fs::read_to_string(skill.central_path.join("SKILL.md")).unwrap(),
        "v2"
    );
    assert_eq!(hub.git.refreshes.load(Ordering::SeqCst), 1);
}

#[test]
fn offline_update_uses_cached_checkout_with_warning() {
    let hub = Hub::new();
    let repo = hub.repo_dir("kit");
    fs::write(repo.join("SKILL.md"), "v1").unwrap();
    hub.git.register(REPO, &repo);
    let source = GitSource::parse(REPO, None, None).unwrap();
    let skill = installed(hub.installer.install_git_skill(&source, None, false).unwrap());

    hub.git.set_offline(true);
    let update = hub.installer.update_skill_from_source(&skill.id).unwrap();
    assert!(!update.changed);
    let warning = update.warning.unwrap();
    assert!(warning.contains("Could not resolve host"), "{warning}");
}

#[test]
fn fresh_cache_is_reused_across_installs() {
    let hub = Hub::with_ttl(Duration::from_secs(600));
    let repo = hub.repo_dir("kit");
    write_skill(&repo, "a", "a").unwrap();
    write_skill(&repo, "b", "b").unwrap();
    hub.git.register(REPO, &repo);
    let source = GitSource::parse(REPO, None, None).unwrap();

    hub.installer.list_git_candidates(&source).unwrap();
    hub.installer
        .install_git_batch(&source, &["a".to_string(), "b".to_string()], false)
        .unwrap();
    assert_eq!(hub.git.clones.load(Ordering::SeqCst), 1);
    assert_eq!(hub.git.refreshes.load(Ordering::SeqCst), 0);
}

#[test]
fn unreachable_repository_surfaces_cause_and_writes_nothing() {
    let hub = Hub::new();
    let source = GitSource::parse("https://github.com/acme/missing", None, None).unwrap();
    let err = hub
        .installer
        .install_git_skill(&source, None, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.to_string().contains("repository not found"));
    assert!(names_in(&hub.fixture.central_root()).is_empty());
}

#[test]
fn malformed_url_fails_before_touching_the_cache() {
    let hub = Hub::new();
    let err = GitSource::parse("not a url", None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(names_in(&hub.fixture.cache_dir).is_empty());
}
