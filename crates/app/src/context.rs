//! Process-scoped application context.
//!
//! [`AppContext`] owns the store, the tool registry, the git cache, the
//! installer, and the sync engine for the lifetime of the process. Every
//! user-facing operation has an `async` entry point that runs the blocking
//! work on tokio's blocking pool and resolves once with the typed result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use skillhub_core::{HubError, Result};
use skillhub_discovery::{OnboardingPlan, ToolRegistry, ToolStatus};
use skillhub_git::{select_client, GitCache, GitClient, GitConfig, SweepReport};
use skillhub_installer::{
    apply_plan, scan_onboarding, BatchItem, DeleteReport, GitCandidate, GitInstall, GitSource,
    ImportResult, Installer, Selection, UpdateResult,
};
use skillhub_state::{env, settings, CentralRepo, SkillRecord, SkillStore, TargetRecord};
use skillhub_sync::{SyncEngine, SyncOptions, SyncOutcome, TargetsReport, UnsyncOutcome};

/// Stand-in client when neither a git binary nor libgit2 is available.
///
/// Local installs and syncing keep working; git operations fail with the
/// selection error.
struct UnavailableGit(String);

impl GitClient for UnavailableGit {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn clone_repo(&self, _url: &str, _dest: &Path, _branch: Option<&str>) -> Result<()> {
        Err(HubError::NoGitClient(self.0.clone()))
    }

    fn refresh(&self, _dest: &Path, _branch: Option<&str>) -> Result<()> {
        Err(HubError::NoGitClient(self.0.clone()))
    }

    fn head(&self, _dest: &Path) -> Result<String> {
        Err(HubError::NoGitClient(self.0.clone()))
    }
}

/// Git client settings from the environment (already seeded by the config file).
pub fn git_config_from_env() -> GitConfig {
    let mut config = GitConfig::default()
        .with_timeouts(env::git_clone_timeout(), env::git_fetch_timeout())
        .with_libgit2_fallback(env::env_allow_libgit2_fallback());
    if let Some(bin) = env::env_git_bin() {
        config = config.with_binary(bin);
    }
    config
}

fn client_from_env() -> Arc<dyn GitClient> {
    match select_client(&git_config_from_env()) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "git operations unavailable");
            Arc::new(UnavailableGit(e.to_string()))
        }
    }
}

/// A git install request as issued by a caller.
#[derive(Debug, Clone, Default)]
pub struct GitRequest {
    pub url: String,
    pub branch: Option<String>,
    pub subpath: Option<String>,
    pub name: Option<String>,
    pub overwrite: bool,
}

impl GitRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    fn source(&self) -> Result<GitSource> {
        GitSource::parse(&self.url, self.branch.as_deref(), self.subpath.as_deref())
    }
}

/// A managed skill together with its recorded targets.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ManagedSkill {
    #[serde(flatten)]
    pub skill: SkillRecord,
    pub targets: Vec<TargetRecord>,
}

/// Shared handles for one process. Cloning is cheap.
#[derive(Clone)]
pub struct AppContext {
    store: Arc<SkillStore>,
    registry: Arc<ToolRegistry>,
    git: Arc<GitCache>,
    installer: Arc<Installer>,
    engine: Arc<SyncEngine>,
    data_dir: PathBuf,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("data_dir", &self.data_dir)
            .field("central", &self.central_root())
            .field("git", &self.git)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build the context from the environment, selecting a git client.
    pub fn init() -> anyhow::Result<Self> {
        Self::init_with_client(client_from_env())
    }

    /// Build the context from the environment with an explicit git client.
    pub fn init_with_client(client: Arc<dyn GitClient>) -> anyhow::Result<Self> {
        let data_dir = env::data_dir()?;
        let db_path = env::database_path()?;
        let store = Arc::new(SkillStore::open(&db_path)?);

        let central = CentralRepo::resolve(&store)?;
        central
            .ensure_exists()
            .with_context(|| format!("prepare central repository {}", central.root().display()))?;

        let mut force_copy = settings::force_copy_tools(&store);
        force_copy.extend(env::env_force_copy_tools());
        let registry = Arc::new(ToolRegistry::new(env::home_dir()?).with_force_copy(&force_copy));

        let git = Arc::new(GitCache::new(
            &env::cache_dir()?,
            settings::git_cache_ttl(&store),
            client,
        ));
        let installer = Arc::new(Installer::new(store.clone(), central, git.clone()));
        let engine = Arc::new(
            SyncEngine::new(store.clone(), registry.clone())
                .with_skill_locks(installer.skill_locks()),
        );

        let central_root = installer.central().root().to_path_buf();
        tracing::info!(
            db = %db_path.display(),
            central = %central_root.display(),
            git = git.client_name(),
            "skillhub context ready"
        );
        Ok(Self {
            store,
            registry,
            git,
            installer,
            engine,
            data_dir,
        })
    }

    /// Release every handle and close the database.
    ///
    /// If a background task still holds a clone, the connection closes when
    /// that clone drops instead.
    pub fn shutdown(self) -> anyhow::Result<()> {
        let Self {
            store,
            registry,
            git,
            installer,
            engine,
            ..
        } = self;
        drop((registry, git, installer, engine));
        match Arc::try_unwrap(store) {
            Ok(store) => store.close(),
            Err(_) => {
                tracing::debug!("store still shared at shutdown");
                Ok(())
            }
        }
    }

    pub fn store(&self) -> &SkillStore {
        &self.store
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn git_cache(&self) -> &GitCache {
        &self.git
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn central_root(&self) -> PathBuf {
        self.installer.central().root().to_path_buf()
    }

    /// Look a skill up by id, then by name.
    pub fn resolve_skill(&self, reference: &str) -> Result<SkillRecord> {
        if let Some(skill) = self.store.get_skill(reference)? {
            return Ok(skill);
        }
        self.store
            .get_skill_by_name(reference)?
            .ok_or_else(|| HubError::not_found("skill", reference))
    }

    /// Every managed skill with its targets, ordered by name.
    pub fn list_managed(&self) -> Result<Vec<ManagedSkill>> {
        let mut out = Vec::new();
        for skill in self.store.list_skills()? {
            let targets = self.store.list_targets(&skill.id)?;
            out.push(ManagedSkill { skill, targets });
        }
        out.sort_by(|a, b| a.skill.name.cmp(&b.skill.name));
        Ok(out)
    }

    pub fn tool_status(&self) -> Vec<ToolStatus> {
        self.registry.status()
    }

    /// Roots the onboarding scan must never report: the central repository
    /// and the data directory.
    fn own_roots(&self) -> Vec<PathBuf> {
        vec![self.central_root(), self.data_dir.clone()]
    }

    fn scan_onboarding_blocking(&self) -> Result<OnboardingPlan> {
        scan_onboarding(&self.registry, &self.store, self.own_roots())
    }

    /// Remove cache entries older than the configured cleanup age, or all
    /// idle entries with `all`.
    pub fn clean_git_cache(&self, all: bool) -> SweepReport {
        let max_age = if all {
            Duration::ZERO
        } else {
            Duration::from_secs(settings::git_cache_cleanup_days(&self.store) * 24 * 60 * 60)
        };
        self.git.evict_older_than(max_age)
    }

    /// Store a setting and apply it to live components where it has one.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        if key == settings::KEY_CENTRAL_REPO_PATH {
            return self.relocate_central(value);
        }
        settings::set_from_str(&self.store, key, value)?;
        if key == settings::KEY_GIT_CACHE_TTL_SECS {
            self.git.set_ttl(settings::git_cache_ttl(&self.store));
        }
        Ok(())
    }

    /// Move managed skills to a new central repository, then repoint linked
    /// targets, which still reach into the old location.
    fn relocate_central(&self, value: &str) -> Result<()> {
        if let Some(pinned) = env::env_central_repo() {
            return Err(HubError::InvalidInput(format!(
                "central repository is pinned to {} by {}",
                pinned.display(),
                env::ENV_CENTRAL_REPO
            )));
        }
        let value = value.trim();
        let new_root = match value.strip_prefix("~/") {
            Some(rest) => env::home_dir()?.join(rest),
            None => PathBuf::from(value),
        };
        self.installer.relocate_central(&new_root)?;

        let relink = SyncOptions {
            verify_on_disk: true,
            ..SyncOptions::default()
        };
        for skill in self.store.list_skills()? {
            for target in self.store.list_targets(&skill.id)? {
                if !target.mode.is_link() {
                    continue;
                }
                if let Err(e) = self.engine.sync(&skill.id, &target.tool, &relink) {
                    tracing::warn!(
                        skill = %skill.name,
                        tool = %target.tool,
                        error = %e,
                        "could not repoint target after relocation"
                    );
                }
            }
        }
        Ok(())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&AppContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ctx = self.clone();
        tokio::task::spawn_blocking(move || f(&ctx))
            .await
            .map_err(|e| HubError::Other(anyhow!("worker task failed: {e}")))?
    }

    pub async fn install_local(
        &self,
        path: PathBuf,
        name: Option<String>,
        overwrite: bool,
    ) -> Result<SkillRecord> {
        self.blocking(move |c| {
            c.installer
                .install_local_skill(&path, name.as_deref(), overwrite)
        })
        .await
    }

    pub async fn install_git(&self, request: GitRequest) -> Result<GitInstall> {
        self.blocking(move |c| {
            let source = request.source()?;
            c.installer
                .install_git_skill(&source, request.name.as_deref(), request.overwrite)
        })
        .await
    }

    /// Install several subpaths of one repository; failures are per item.
    pub async fn install_git_batch(
        &self,
        request: GitRequest,
        subpaths: Vec<String>,
    ) -> Result<Vec<BatchItem>> {
        self.blocking(move |c| {
            let source = request.source()?;
            c.installer
                .install_git_batch(&source, &subpaths, request.overwrite)
        })
        .await
    }

    pub async fn list_git_candidates(&self, request: GitRequest) -> Result<Vec<GitCandidate>> {
        self.blocking(move |c| c.installer.list_git_candidates(&request.source()?))
            .await
    }

    pub async fn sync(&self, skill: String, tool: String, opts: SyncOptions) -> Result<SyncOutcome> {
        self.blocking(move |c| {
            let skill = c.resolve_skill(&skill)?;
            c.engine.sync(&skill.id, &tool, &opts)
        })
        .await
    }

    pub async fn unsync(&self, skill: String, tool: String) -> Result<UnsyncOutcome> {
        self.blocking(move |c| {
            let skill = c.resolve_skill(&skill)?;
            c.engine.unsync(&skill.id, &tool)
        })
        .await
    }

    /// Re-import from the recorded source; with `refresh_copies`, copy-mode
    /// targets are re-copied afterwards.
    pub async fn update_from_source(
        &self,
        skill: String,
        refresh_copies: bool,
    ) -> Result<(UpdateResult, Option<TargetsReport>)> {
        self.blocking(move |c| {
            let skill = c.resolve_skill(&skill)?;
            let update = c.installer.update_skill_from_source(&skill.id)?;
            let refreshed = if refresh_copies && update.changed {
                Some(c.engine.refresh_copy_targets(&skill.id)?)
            } else {
                None
            };
            Ok((update, refreshed))
        })
        .await
    }

    pub async fn refresh_target(&self, skill: String, tool: String) -> Result<SyncOutcome> {
        self.blocking(move |c| {
            let skill = c.resolve_skill(&skill)?;
            c.engine.refresh_copy_target(&skill.id, &tool)
        })
        .await
    }

    pub async fn delete_skill(&self, skill: String) -> Result<DeleteReport> {
        self.blocking(move |c| {
            let skill = c.resolve_skill(&skill)?;
            c.installer.delete_skill(&c.engine, &skill.id)
        })
        .await
    }

    pub async fn scan_onboarding(&self) -> Result<OnboardingPlan> {
        self.blocking(|c| c.scan_onboarding_blocking()).await
    }

    /// Scan again and import the selected groups.
    pub async fn apply_onboarding(&self, selections: Vec<Selection>) -> Result<ImportResult> {
        self.blocking(move |c| {
            let plan = c.scan_onboarding_blocking()?;
            apply_plan(&c.installer, &c.engine, &plan, &selections)
        })
        .await
    }

    pub async fn sweep_cache(&self, all: bool) -> Result<SweepReport> {
        self.blocking(move |c| Ok(c.clean_git_cache(all))).await
    }
}
