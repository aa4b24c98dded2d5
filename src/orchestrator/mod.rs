//! Issue lifecycle: Absent → (start) → Active → (open_request)* → (finish) → Absent.
//!
//! `start` resolves every profile reference before touching the filesystem,
//! then creates the issue directory, clones and branches each repository,
//! marks the tracker issue in progress and finally records the issue. A
//! failure after the directory exists returns [`IssueError::StartAborted`]
//! carrying what was already done; nothing is persisted.
//!
//! `finish` closes the tracker issue before removing anything locally, so an
//! interrupted finish leaves the record in place and can be re-run.

pub mod resolve;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::backend::{
    Backend, BackendConnector, HttpConnector, OpenedRequest, RequestDraft, normalize_title,
};
use crate::config::{ConfigStore, Issue, Repository};
use crate::errors::IssueError;
use crate::workspace::{GitWorkspace, Workspace, branch_name, sanitize_title};

pub use resolve::ResolvedProfile;

/// Target branch of every opened request.
pub const BASE_BRANCH: &str = "master";

/// Drives issues through their lifecycle.
pub struct IssueOrchestrator {
    workspace: Arc<dyn Workspace>,
    connector: Arc<dyn BackendConnector>,
}

impl Default for IssueOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(GitWorkspace), Arc::new(HttpConnector))
    }
}

impl IssueOrchestrator {
    pub fn new(workspace: Arc<dyn Workspace>, connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            workspace,
            connector,
        }
    }

    fn connect(&self, store: &ConfigStore, name: &str) -> Result<Arc<dyn Backend>, IssueError> {
        let config = store.resolve_backend(name)?;
        Ok(self.connector.connect(config)?)
    }

    /// Start work on `issue_id`.
    ///
    /// `view` supplies the effective profile (command-line overrides applied);
    /// the issue record is written to `store`.
    pub async fn start(
        &self,
        store: &mut ConfigStore,
        view: &ConfigStore,
        issue_id: &str,
        custom_name: Option<&str>,
    ) -> Result<Issue, IssueError> {
        validate_issue_id(issue_id)?;
        let resolved = ResolvedProfile::current(view)?;
        if store.get_issue(issue_id).is_some() {
            return Err(IssueError::DuplicateIssue {
                id: issue_id.to_string(),
            });
        }
        info!(issue = issue_id, profile = resolved.name(), "Starting work on issue");

        let custom_name = custom_name.map(str::trim).filter(|n| !n.is_empty());
        let dir_name = match custom_name {
            Some(custom) => format!("{}-{}", issue_id, sanitize_title(custom)),
            None => issue_id.to_string(),
        };

        let tracker = match &resolved.issue_backend {
            Some(config) => Some(self.connector.connect(config)?),
            None => None,
        };
        let (name, branch) = match (&tracker, custom_name) {
            (Some(tracker), None) => {
                let repo = resolved.require_default_repository()?;
                let snapshot = tracker.get_issue(&repo.owner, &repo.name, issue_id).await?;
                let title = normalize_title(&snapshot.title);
                let branch = branch_name(issue_id, &title);
                (title, branch)
            }
            _ => (dir_name.clone(), dir_name.clone()),
        };
        // Checked before any directory exists.
        let tracker_repo = match &tracker {
            Some(_) => Some(resolved.require_default_repository()?.clone()),
            None => None,
        };

        let dir = self
            .workspace
            .create_issue_directory(&resolved.profile.work_dir, &dir_name)
            .await?;

        let mut issue = Issue {
            id: issue_id.to_string(),
            name,
            branch_name: branch,
            dir,
            profile: resolved.name().to_string(),
            repo_backend: resolved.repo_backend.as_ref().map(|b| b.name.clone()),
            issue_backend: resolved.issue_backend.as_ref().map(|b| b.name.clone()),
            repositories: Vec::new(),
            started_at: Some(Utc::now()),
        };

        let outcome = self
            .populate(store, &resolved, &mut issue, tracker.as_deref(), tracker_repo.as_ref())
            .await;
        match outcome {
            Ok(()) => {
                info!(issue = issue_id, dir = %issue.dir.display(), "Started working on issue");
                Ok(issue)
            }
            Err(err) => Err(self.abort_start(store, issue, err).await),
        }
    }

    /// Steps of `start` that run once the issue directory exists.
    async fn populate(
        &self,
        store: &mut ConfigStore,
        resolved: &ResolvedProfile,
        issue: &mut Issue,
        tracker: Option<&dyn Backend>,
        tracker_repo: Option<&Repository>,
    ) -> Result<(), IssueError> {
        let user = resolved.git_user.as_ref();
        for repo in &resolved.repositories {
            let repo_dir = self
                .workspace
                .clone_repository(repo, &issue.dir, user)
                .await?;
            self.workspace
                .create_branch(&repo_dir, &issue.branch_name, user)
                .await?;
            issue.repositories.push(repo.name.clone());
        }

        if let (Some(tracker), Some(repo)) = (tracker, tracker_repo) {
            tracker
                .start_issue(&repo.owner, &repo.name, &issue.id)
                .await?;
        }

        store.add_issue(issue.clone())?;
        Ok(())
    }

    async fn abort_start(&self, store: &ConfigStore, partial: Issue, err: IssueError) -> IssueError {
        warn!(
            issue = %partial.id,
            cloned = ?partial.repositories,
            error = %err,
            "start aborted"
        );
        if store.settings().rollback_failed_start {
            match self.workspace.remove_directory_tree(&partial.dir).await {
                Ok(()) => info!(dir = %partial.dir.display(), "rolled back issue directory"),
                Err(e) => warn!(error = %e, "rollback of issue directory failed"),
            }
        }
        IssueError::StartAborted {
            partial: Box::new(partial),
            source: Box::new(err),
        }
    }

    /// Open a pull/merge request for an active issue and link it to the
    /// tracker issue. Repeatable; the issue record is left untouched.
    pub async fn open_request(
        &self,
        store: &ConfigStore,
        issue_id: &str,
        custom_title: Option<&str>,
    ) -> Result<OpenedRequest, IssueError> {
        let issue = lookup(store, issue_id)?;
        let resolved = ResolvedProfile::named(store, &issue.profile)?;
        let repo_backend =
            issue
                .repo_backend
                .as_deref()
                .ok_or_else(|| IssueError::MissingProfileField {
                    profile: issue.profile.clone(),
                    field: "repository backend",
                })?;
        let repo = resolved.require_default_repository()?;
        let host = self.connect(store, repo_backend)?;

        let title = custom_title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} | {}", issue.id, issue.name));
        let draft = RequestDraft {
            title,
            body: format!("Resolves #{}", issue.id),
            base: BASE_BRANCH.to_string(),
            head: issue.branch_name.clone(),
        };
        let opened = host.open_request(&repo.owner, &repo.name, &draft).await?;
        info!(issue = issue_id, request = %opened.id, url = %opened.url, "Opened request");

        if let Some(tracker_name) = issue.issue_backend.as_deref() {
            let tracker = self.connect(store, tracker_name)?;
            tracker
                .link_issue_to_request(&repo.owner, &repo.name, &issue.id, &opened)
                .await?;
        }
        Ok(opened)
    }

    /// Close the tracker issue, remove the workspace and forget the issue.
    pub async fn finish(&self, store: &mut ConfigStore, issue_id: &str) -> Result<Issue, IssueError> {
        let issue = lookup(store, issue_id)?.clone();
        info!(issue = issue_id, "Finishing issue");

        if let Some(tracker_name) = issue.issue_backend.as_deref() {
            let resolved = ResolvedProfile::named(store, &issue.profile)?;
            let repo = resolved.require_default_repository()?;
            let tracker = self.connect(store, tracker_name)?;
            tracker.close_issue(&repo.owner, &repo.name, &issue.id).await?;
        }

        self.workspace.remove_directory_tree(&issue.dir).await?;
        store.delete_issue(issue_id)?;
        info!(issue = issue_id, "Finished issue");
        Ok(issue)
    }

    /// Clone one more repository into an active issue and check out its
    /// branch there.
    pub async fn add_repository(
        &self,
        store: &mut ConfigStore,
        issue_id: &str,
        repo_name: &str,
    ) -> Result<Issue, IssueError> {
        let mut issue = lookup(store, issue_id)?.clone();
        if issue.repositories.iter().any(|r| r == repo_name) {
            return Err(IssueError::RepositoryAlreadyAdded {
                id: issue.id,
                repository: repo_name.to_string(),
            });
        }
        let repo = store.resolve_repository(repo_name)?.clone();
        let profile = store.resolve_profile(&issue.profile)?;
        let user = profile
            .git_user
            .as_deref()
            .map(|n| store.resolve_git_user(n).cloned())
            .transpose()?;

        let repo_dir = self
            .workspace
            .clone_repository(&repo, &issue.dir, user.as_ref())
            .await?;
        self.workspace
            .create_branch(&repo_dir, &issue.branch_name, user.as_ref())
            .await?;
        issue.repositories.push(repo.name.clone());
        store.update_issue(issue.clone())?;
        info!(issue = issue_id, repo = %repo.name, "Added repository to issue");
        Ok(issue)
    }
}

fn lookup<'a>(store: &'a ConfigStore, issue_id: &str) -> Result<&'a Issue, IssueError> {
    store
        .get_issue(issue_id)
        .ok_or_else(|| IssueError::IssueNotFound {
            id: issue_id.to_string(),
        })
}

/// Ids become directory names, so they must be a single path component.
fn validate_issue_id(issue_id: &str) -> Result<(), IssueError> {
    let bad = issue_id.trim().is_empty()
        || issue_id != issue_id.trim()
        || issue_id == "."
        || issue_id == ".."
        || issue_id.contains(['/', '\\']);
    if bad {
        return Err(IssueError::InvalidIssueId {
            id: issue_id.to_string(),
        });
    }
    Ok(())
}

/// Work out which issue `cwd` belongs to.
///
/// Prefers the issue whose directory contains `cwd`; otherwise takes the
/// first path component below the current profile's work dir.
pub fn issue_id_from_path(store: &ConfigStore, cwd: &Path) -> Option<String> {
    if let Some(issue) = store.issues().find(|i| cwd.starts_with(&i.dir)) {
        return Some(issue.id.clone());
    }
    let profile = store.get_current_profile().ok()?;
    let rel = cwd.strip_prefix(&profile.work_dir).ok()?;
    match rel.components().next()? {
        std::path::Component::Normal(first) => Some(first.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IssueSnapshot, IssueTracking, RepositoryHosting};
    use crate::config::{
        BackendConfig, BackendKind, CliOverrides, GitHubConfig, GitUser, IssuectlConfig, Profile,
    };
    use crate::errors::{BackendError, ConfigError, RecordKind, WorkspaceError};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records every operation instead of touching disk.
    struct FakeWorkspace {
        journal: Journal,
        dirs: Mutex<HashSet<PathBuf>>,
        fail_clone: Option<String>,
    }

    impl FakeWorkspace {
        fn new(journal: &Journal) -> Self {
            Self {
                journal: journal.clone(),
                dirs: Mutex::new(HashSet::new()),
                fail_clone: None,
            }
        }

        fn log(&self, entry: String) {
            self.journal.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl Workspace for FakeWorkspace {
        async fn create_issue_directory(
            &self,
            work_dir: &Path,
            name: &str,
        ) -> Result<PathBuf, WorkspaceError> {
            let dir = work_dir.join(name);
            if !self.dirs.lock().unwrap().insert(dir.clone()) {
                return Err(WorkspaceError::DirectoryExists(dir));
            }
            self.log(format!("mkdir {}", dir.display()));
            Ok(dir)
        }

        async fn clone_repository(
            &self,
            repo: &Repository,
            parent: &Path,
            user: Option<&GitUser>,
        ) -> Result<PathBuf, WorkspaceError> {
            if self.fail_clone.as_deref() == Some(repo.name.as_str()) {
                return Err(WorkspaceError::GitFailed {
                    args: format!("clone {}", repo.url),
                    stderr: "fatal: repository not found".to_string(),
                });
            }
            let who = user.map(|u| u.name.as_str()).unwrap_or("-");
            self.log(format!("clone {} as {} into {}", repo.name, who, parent.display()));
            Ok(parent.join(&repo.name))
        }

        async fn create_branch(
            &self,
            repo_dir: &Path,
            branch: &str,
            _user: Option<&GitUser>,
        ) -> Result<(), WorkspaceError> {
            self.log(format!("branch {} in {}", branch, repo_dir.display()));
            Ok(())
        }

        async fn remove_directory_tree(&self, path: &Path) -> Result<(), WorkspaceError> {
            self.dirs.lock().unwrap().remove(path);
            self.log(format!("rm {}", path.display()));
            Ok(())
        }
    }

    struct FakeBackend {
        name: String,
        title: String,
        journal: Journal,
        next_request: AtomicU64,
        fail_start: bool,
    }

    impl FakeBackend {
        fn new(name: &str, title: &str, journal: &Journal) -> Self {
            Self {
                name: name.to_string(),
                title: title.to_string(),
                journal: journal.clone(),
                next_request: AtomicU64::new(1),
                fail_start: false,
            }
        }

        fn log(&self, entry: String) {
            self.journal.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl IssueTracking for FakeBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_issue(
            &self,
            owner: &str,
            repo: &str,
            issue_id: &str,
        ) -> Result<IssueSnapshot, BackendError> {
            self.log(format!("{}: get {owner}/{repo}#{issue_id}", self.name));
            Ok(IssueSnapshot {
                id: issue_id.to_string(),
                title: self.title.clone(),
                state: "open".to_string(),
                url: self.get_issue_url(owner, repo, issue_id)?,
            })
        }

        async fn start_issue(
            &self,
            owner: &str,
            repo: &str,
            issue_id: &str,
        ) -> Result<(), BackendError> {
            if self.fail_start {
                return Err(BackendError::Status {
                    backend: self.name.clone(),
                    operation: "add label",
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.log(format!("{}: start {owner}/{repo}#{issue_id}", self.name));
            Ok(())
        }

        async fn close_issue(
            &self,
            owner: &str,
            repo: &str,
            issue_id: &str,
        ) -> Result<(), BackendError> {
            self.log(format!("{}: close {owner}/{repo}#{issue_id}", self.name));
            Ok(())
        }

        fn get_issue_url(
            &self,
            owner: &str,
            repo: &str,
            issue_id: &str,
        ) -> Result<String, BackendError> {
            Ok(format!("https://example.test/{owner}/{repo}/issues/{issue_id}"))
        }

        async fn link_issue_to_request(
            &self,
            owner: &str,
            repo: &str,
            issue_id: &str,
            request: &OpenedRequest,
        ) -> Result<(), BackendError> {
            self.log(format!(
                "{}: link {owner}/{repo}#{issue_id} to {}",
                self.name, request.id
            ));
            Ok(())
        }
    }

    #[async_trait]
    impl RepositoryHosting for FakeBackend {
        async fn open_request(
            &self,
            owner: &str,
            repo: &str,
            draft: &RequestDraft,
        ) -> Result<OpenedRequest, BackendError> {
            let id = self.next_request.fetch_add(1, Ordering::SeqCst);
            self.log(format!(
                "{}: open {owner}/{repo} '{}' '{}' {} <- {}",
                self.name, draft.title, draft.body, draft.base, draft.head
            ));
            Ok(OpenedRequest {
                id: id.to_string(),
                url: format!("https://example.test/{owner}/{repo}/pull/{id}"),
            })
        }
    }

    struct FakeConnector {
        backends: HashMap<String, Arc<FakeBackend>>,
    }

    impl BackendConnector for FakeConnector {
        fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
            match self.backends.get(&config.name) {
                Some(backend) => Ok(backend.clone()),
                None => Err(BackendError::Unsupported {
                    backend: config.name.clone(),
                    operation: "connect",
                }),
            }
        }
    }

    struct Harness {
        journal: Journal,
        store: ConfigStore,
        orchestrator: IssueOrchestrator,
    }

    impl Harness {
        fn entries(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }

        fn view(&self) -> ConfigStore {
            self.store.in_memory()
        }

        async fn start(&mut self, id: &str, custom: Option<&str>) -> Result<Issue, IssueError> {
            let view = self.view();
            self.orchestrator
                .start(&mut self.store, &view, id, custom)
                .await
        }
    }

    fn repo(name: &str) -> Repository {
        Repository {
            name: name.to_string(),
            owner: "acme".to_string(),
            url: format!("git@github.com:acme/{name}.git"),
        }
    }

    fn github(name: &str) -> BackendConfig {
        BackendConfig {
            name: name.to_string(),
            kind: BackendKind::GitHub(GitHubConfig {
                host: "https://api.github.com".to_string(),
                token: String::new(),
                username: "octocat".to_string(),
            }),
        }
    }

    /// Profile `p1` (work dir `/work`, default `svc`, repos `[svc]`) plus
    /// repositories `svc`/`web` and backends `gh`/`tracker`.
    fn base_config(profile: Profile) -> ConfigStore {
        let mut store = ConfigStore::in_memory_from(IssuectlConfig::default());
        store.add_repository(repo("svc")).unwrap();
        store.add_repository(repo("web")).unwrap();
        store.add_backend(github("gh")).unwrap();
        store.add_backend(github("tracker")).unwrap();
        store
            .add_git_user(GitUser {
                name: "dev".to_string(),
                email: "dev@acme.io".to_string(),
                ssh_key_path: PathBuf::from("/keys/dev"),
            })
            .unwrap();
        store.add_profile(profile).unwrap();
        store.use_profile("p1").unwrap();
        store
    }

    fn p1() -> Profile {
        Profile {
            name: "p1".to_string(),
            work_dir: PathBuf::from("/work"),
            default_repository: Some("svc".to_string()),
            repositories: vec!["svc".to_string()],
            ..Default::default()
        }
    }

    fn p1_with_backends() -> Profile {
        Profile {
            issue_backend: Some("tracker".to_string()),
            repo_backend: Some("gh".to_string()),
            git_user: Some("dev".to_string()),
            ..p1()
        }
    }

    fn harness_with(
        profile: Profile,
        tweak_workspace: impl FnOnce(&mut FakeWorkspace),
        tweak_tracker: impl FnOnce(&mut FakeBackend),
    ) -> Harness {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let mut workspace = FakeWorkspace::new(&journal);
        tweak_workspace(&mut workspace);
        let mut tracker = FakeBackend::new("tracker", "Fix: login (urgent)!", &journal);
        tweak_tracker(&mut tracker);
        let connector = FakeConnector {
            backends: HashMap::from([
                ("gh".to_string(), Arc::new(FakeBackend::new("gh", "", &journal))),
                ("tracker".to_string(), Arc::new(tracker)),
            ]),
        };
        Harness {
            journal: journal.clone(),
            store: base_config(profile),
            orchestrator: IssueOrchestrator::new(Arc::new(workspace), Arc::new(connector)),
        }
    }

    fn harness(profile: Profile) -> Harness {
        harness_with(profile, |_| {}, |_| {})
    }

    #[tokio::test]
    async fn start_without_tracker_uses_bare_id() {
        let mut h = harness(p1());
        let issue = h.start("77", None).await.unwrap();

        assert_eq!(issue.id, "77");
        assert_eq!(issue.name, "77");
        assert_eq!(issue.branch_name, "77");
        assert_eq!(issue.dir, PathBuf::from("/work/77"));
        assert_eq!(issue.repositories, vec!["svc"]);
        assert_eq!(issue.profile, "p1");
        assert!(issue.started_at.is_some());
        assert_eq!(h.store.get_issue("77"), Some(&issue));
        assert_eq!(
            h.entries(),
            vec![
                "mkdir /work/77",
                "clone svc as - into /work/77",
                "branch 77 in /work/77/svc",
            ]
        );
    }

    #[tokio::test]
    async fn start_twice_is_rejected_without_side_effects() {
        let mut h = harness(p1());
        h.start("77", None).await.unwrap();
        let recorded = h.store.get_issue("77").cloned();
        let journal_len = h.entries().len();

        let err = h.start("77", None).await.unwrap_err();
        assert!(matches!(err, IssueError::DuplicateIssue { ref id } if id == "77"));
        assert_eq!(h.store.get_issue("77").cloned(), recorded);
        assert_eq!(h.entries().len(), journal_len);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_across_profiles() {
        let mut h = harness(p1());
        h.store
            .add_profile(Profile {
                name: "p2".to_string(),
                work_dir: PathBuf::from("/other"),
                ..Default::default()
            })
            .unwrap();
        h.start("5", None).await.unwrap();
        h.store.use_profile("p2").unwrap();
        let err = h.start("5", None).await.unwrap_err();
        assert!(matches!(err, IssueError::DuplicateIssue { .. }));
    }

    #[tokio::test]
    async fn start_then_finish_round_trips() {
        let mut h = harness(p1_with_backends());
        let before = h.store.data().issues.clone();

        h.start("42", None).await.unwrap();
        h.orchestrator.finish(&mut h.store, "42").await.unwrap();

        assert_eq!(h.store.data().issues, before);
        let entries = h.entries();
        let close = entries.iter().position(|e| e == "tracker: close acme/svc#42");
        let rm = entries.iter().position(|e| e.starts_with("rm /work/42"));
        assert!(close.unwrap() < rm.unwrap(), "tracker closed before cleanup: {entries:?}");
    }

    #[tokio::test]
    async fn unresolved_repository_fails_before_any_directory() {
        let mut h = harness(Profile {
            repositories: vec!["svc".to_string(), "ghost".to_string()],
            ..p1()
        });
        let err = h.start("9", None).await.unwrap_err();
        assert!(matches!(
            err,
            IssueError::Config(ConfigError::Unresolved { kind: RecordKind::Repository, ref name }) if name == "ghost"
        ));
        assert!(h.entries().is_empty());
        assert!(h.store.get_issue("9").is_none());
    }

    #[tokio::test]
    async fn tracker_title_drives_branch_and_marks_in_progress() {
        let mut h = harness(p1_with_backends());
        let issue = h.start("42", None).await.unwrap();

        assert_eq!(issue.name, "Fix: login (urgent)!");
        assert_eq!(issue.branch_name, "42-Fix--login--urgent--");
        assert_eq!(issue.dir, PathBuf::from("/work/42"));
        assert_eq!(issue.issue_backend.as_deref(), Some("tracker"));
        assert_eq!(issue.repo_backend.as_deref(), Some("gh"));
        assert_eq!(
            h.entries(),
            vec![
                "tracker: get acme/svc#42",
                "mkdir /work/42",
                "clone svc as dev into /work/42",
                "branch 42-Fix--login--urgent-- in /work/42/svc",
                "tracker: start acme/svc#42",
            ]
        );
    }

    #[tokio::test]
    async fn custom_name_skips_title_lookup() {
        let mut h = harness(p1_with_backends());
        let issue = h.start("42", Some("hot fix")).await.unwrap();

        assert_eq!(issue.dir, PathBuf::from("/work/42-hot-fix"));
        assert_eq!(issue.branch_name, "42-hot-fix");
        assert!(!h.entries().iter().any(|e| e.contains("get")));
        assert!(h.entries().contains(&"tracker: start acme/svc#42".to_string()));
    }

    #[tokio::test]
    async fn tracker_without_default_repository_is_rejected_early() {
        let mut h = harness(Profile {
            default_repository: None,
            ..p1_with_backends()
        });
        let err = h.start("42", Some("x")).await.unwrap_err();
        assert!(matches!(
            err,
            IssueError::MissingProfileField { field: "default repository", .. }
        ));
        assert!(h.entries().is_empty());
    }

    #[tokio::test]
    async fn failed_clone_reports_partial_issue_and_keeps_directory() {
        let mut h = harness_with(
            Profile {
                repositories: vec!["svc".to_string(), "web".to_string()],
                ..p1()
            },
            |ws| ws.fail_clone = Some("web".to_string()),
            |_| {},
        );
        let err = h.start("77", None).await.unwrap_err();

        let IssueError::StartAborted { partial, .. } = &err else {
            panic!("expected StartAborted, got {err}");
        };
        assert_eq!(partial.repositories, vec!["svc"]);
        assert_eq!(partial.dir, PathBuf::from("/work/77"));
        assert!(matches!(
            err.root(),
            IssueError::Workspace(WorkspaceError::GitFailed { .. })
        ));
        assert!(h.store.get_issue("77").is_none());
        assert!(!h.entries().iter().any(|e| e.starts_with("rm")));
    }

    #[tokio::test]
    async fn failed_start_rolls_back_when_enabled() {
        let mut h = harness_with(p1_with_backends(), |_| {}, |t| t.fail_start = true);
        let mut settings = h.store.settings().clone();
        settings.rollback_failed_start = true;
        h.store.update_settings(settings).unwrap();

        let err = h.start("42", None).await.unwrap_err();
        assert!(matches!(err.root(), IssueError::Backend(BackendError::Status { status: 500, .. })));
        assert_eq!(h.entries().last().map(String::as_str), Some("rm /work/42"));
        assert!(h.store.get_issue("42").is_none());

        // The directory is free again.
        h.orchestrator = IssueOrchestrator::new(
            h.orchestrator.workspace.clone(),
            Arc::new(FakeConnector {
                backends: HashMap::from([(
                    "tracker".to_string(),
                    Arc::new(FakeBackend::new("tracker", "Retry", &h.journal)),
                )]),
            }),
        );
        h.start("42", None).await.unwrap();
    }

    #[tokio::test]
    async fn open_request_is_repeatable_and_leaves_issue_untouched() {
        let mut h = harness(p1_with_backends());
        h.start("42", None).await.unwrap();
        let recorded = h.store.get_issue("42").cloned();

        let first = h.orchestrator.open_request(&h.store, "42", None).await.unwrap();
        let second = h.orchestrator.open_request(&h.store, "42", None).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(h.store.get_issue("42").cloned(), recorded);
        let entries = h.entries();
        assert!(entries.contains(
            &"gh: open acme/svc '42 | Fix: login (urgent)!' 'Resolves #42' master <- 42-Fix--login--urgent--"
                .to_string()
        ));
        assert!(entries.contains(&format!("tracker: link acme/svc#42 to {}", first.id)));
        assert!(entries.contains(&format!("tracker: link acme/svc#42 to {}", second.id)));
    }

    #[tokio::test]
    async fn open_request_accepts_custom_title() {
        let mut h = harness(Profile {
            issue_backend: None,
            ..p1_with_backends()
        });
        h.start("7", None).await.unwrap();
        h.orchestrator
            .open_request(&h.store, "7", Some("Ship it"))
            .await
            .unwrap();
        let entries = h.entries();
        assert!(entries.iter().any(|e| e.contains("'Ship it' 'Resolves #7' master <- 7")));
        assert!(!entries.iter().any(|e| e.contains("link")));
    }

    #[tokio::test]
    async fn open_request_requires_repository_backend() {
        let mut h = harness(p1());
        h.start("7", None).await.unwrap();
        let err = h
            .orchestrator
            .open_request(&h.store, "7", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IssueError::MissingProfileField { field: "repository backend", .. }
        ));
    }

    #[tokio::test]
    async fn unknown_issue_is_not_found() {
        let mut h = harness(p1());
        let err = h.orchestrator.finish(&mut h.store, "404").await.unwrap_err();
        assert!(matches!(err, IssueError::IssueNotFound { .. }));
        let err = h
            .orchestrator
            .open_request(&h.store, "404", None)
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::IssueNotFound { .. }));
    }

    #[tokio::test]
    async fn add_repository_extends_active_issue() {
        let mut h = harness(p1_with_backends());
        h.start("42", Some("x")).await.unwrap();

        let issue = h
            .orchestrator
            .add_repository(&mut h.store, "42", "web")
            .await
            .unwrap();
        assert_eq!(issue.repositories, vec!["svc", "web"]);
        assert_eq!(h.store.get_issue("42"), Some(&issue));
        assert!(h.entries().contains(&"branch 42-x in /work/42-x/web".to_string()));

        let err = h
            .orchestrator
            .add_repository(&mut h.store, "42", "web")
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::RepositoryAlreadyAdded { .. }));
    }

    #[tokio::test]
    async fn overrides_shape_the_issue_but_not_the_store() {
        let mut h = harness(p1());
        let saved_profile = h.store.get_profile("p1").cloned();
        let view = CliOverrides {
            repos: vec!["web".to_string()],
            ..Default::default()
        }
        .apply(&h.store)
        .unwrap();

        let issue = h
            .orchestrator
            .start(&mut h.store, &view, "8", None)
            .await
            .unwrap();
        assert_eq!(issue.repositories, vec!["svc", "web"]);
        assert_eq!(h.store.get_profile("p1").cloned(), saved_profile);
        assert!(h.store.get_issue("8").is_some());
    }

    #[tokio::test]
    async fn ids_must_be_single_path_components() {
        let mut h = harness(p1());
        for bad in ["", "..", "a/b", " 7"] {
            let err = h.start(bad, None).await.unwrap_err();
            assert!(matches!(err, IssueError::InvalidIssueId { .. }), "{bad:?}");
        }
        assert!(h.entries().is_empty());
    }

    #[tokio::test]
    async fn issue_id_is_found_from_working_directory() {
        let mut h = harness(p1());
        h.start("12", Some("docs")).await.unwrap();

        let inside = Path::new("/work/12-docs/svc/src");
        assert_eq!(issue_id_from_path(&h.store, inside).as_deref(), Some("12"));
        let untracked = Path::new("/work/99/svc");
        assert_eq!(issue_id_from_path(&h.store, untracked).as_deref(), Some("99"));
        assert_eq!(issue_id_from_path(&h.store, Path::new("/elsewhere")), None);
    }
}
