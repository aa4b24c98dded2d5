//! Issue trackers and repository hosts behind one capability interface.
//!
//! | Kind | Issue tracking | Repository hosting |
//! |------|----------------|--------------------|
//! | GitHub | labels + assignees, issue state | pull requests |
//! | GitLab | assignee ids, `state_event` | merge requests |
//! | Jira | workflow transitions, comments | not supported |
//!
//! Every variant implements both traits; operations a kind cannot perform
//! return [`BackendError::Unsupported`].

pub mod github;
pub mod gitlab;
pub mod http;
pub mod jira;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendConfig, BackendKind, decode_token};
use crate::errors::BackendError;

pub use github::GitHubBackend;
pub use gitlab::GitLabBackend;
pub use jira::JiraBackend;

/// Tracker-side view of an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSnapshot {
    pub id: String,
    pub title: String,
    pub state: String,
    pub url: String,
}

/// Parameters of a pull/merge request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub title: String,
    pub body: String,
    pub base: String,
    pub head: String,
}

/// A request that was opened on a repository host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedRequest {
    /// Host-native number (PR number, MR iid).
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait IssueTracking: Send + Sync {
    /// Configured backend name, used for logging and error context.
    fn name(&self) -> &str;

    async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<IssueSnapshot, BackendError>;

    /// Mark the issue as being worked on. Succeeds without side effects when
    /// it already is.
    async fn start_issue(&self, owner: &str, repo: &str, issue_id: &str)
    -> Result<(), BackendError>;

    /// Move the issue to its closed/done state. Idempotent.
    async fn close_issue(&self, owner: &str, repo: &str, issue_id: &str)
    -> Result<(), BackendError>;

    fn get_issue_url(&self, owner: &str, repo: &str, issue_id: &str)
    -> Result<String, BackendError>;

    /// Annotate the issue (or the request) so the two reference each other.
    async fn link_issue_to_request(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
        request: &OpenedRequest,
    ) -> Result<(), BackendError>;
}

#[async_trait]
pub trait RepositoryHosting: Send + Sync {
    async fn open_request(
        &self,
        owner: &str,
        repo: &str,
        draft: &RequestDraft,
    ) -> Result<OpenedRequest, BackendError>;
}

/// Full capability set every backend variant exposes.
pub trait Backend: IssueTracking + RepositoryHosting {}

impl<T: IssueTracking + RepositoryHosting> Backend for T {}

/// Turns a stored backend record into a live handle.
///
/// Real implementation: [`HttpConnector`]. Tests substitute a fake that hands
/// out in-memory backends.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError>;
}

/// Connects to the real HTTP APIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpConnector;

impl BackendConnector for HttpConnector {
    fn connect(&self, config: &BackendConfig) -> Result<Arc<dyn Backend>, BackendError> {
        let token = decode_token(&config.name, config.kind.stored_token())?;
        let backend: Arc<dyn Backend> = match &config.kind {
            BackendKind::GitHub(c) => Arc::new(GitHubBackend::new(&config.name, c, &token)?),
            BackendKind::GitLab(c) => Arc::new(GitLabBackend::new(&config.name, c, &token)?),
            BackendKind::Jira(c) => Arc::new(JiraBackend::new(&config.name, c, &token)?),
        };
        tracing::debug!(backend = %config.name, kind = config.kind.type_name(), "connected backend");
        Ok(backend)
    }
}

/// Collapse runs of whitespace in a tracker title.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}
