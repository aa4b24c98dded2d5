//! Jira REST v2 backend.
//!
//! Jira issues move through named workflow states. Starting and closing
//! look up the transition leading to the wanted state and fail when the
//! workflow offers none. Jira cannot host code, so `open_request` is
//! unsupported and linking is a plain comment.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::http::{ApiClient, Auth, map_not_found};
use super::{IssueSnapshot, IssueTracking, OpenedRequest, RepositoryHosting, RequestDraft};
use crate::config::JiraConfig;
use crate::errors::BackendError;

pub const IN_PROGRESS: &str = "In Progress";
pub const DONE: &str = "Done";
pub const START_COMMENT: &str = "On it 👀";
pub const CLOSE_COMMENT: &str = "✅";

#[derive(Debug, Deserialize)]
struct Status {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Fields {
    summary: String,
    status: Status,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    key: String,
    fields: Fields,
}

#[derive(Debug, Deserialize)]
struct Transition {
    id: String,
    name: String,
    #[serde(default)]
    to: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Transitions {
    transitions: Vec<Transition>,
}

impl Transition {
    fn leads_to(&self, state: &str) -> bool {
        self.to.as_ref().is_some_and(|to| to.name == state) || self.name == state
    }
}

pub struct JiraBackend {
    api: ApiClient,
    host: String,
}

impl JiraBackend {
    pub fn new(name: &str, config: &JiraConfig, token: &str) -> Result<Self, BackendError> {
        let host = config.host.trim_end_matches('/').to_string();
        let api = ApiClient::new(
            name,
            &format!("{host}/rest/api/2"),
            Auth::Basic {
                username: config.username.clone(),
                password: token.to_string(),
            },
        )?;
        Ok(Self { api, host })
    }

    fn check_key(&self, issue_id: &str) -> Result<String, BackendError> {
        let key = issue_id.trim();
        if key.is_empty() || key.contains('/') {
            return Err(BackendError::InvalidIssueId {
                backend: self.api.backend().to_string(),
                issue_id: issue_id.to_string(),
                reason: "expected an issue key such as PROJ-123".to_string(),
            });
        }
        Ok(key.to_string())
    }

    async fn fetch(&self, issue_id: &str) -> Result<JiraIssue, BackendError> {
        let key = self.check_key(issue_id)?;
        self.api
            .get("get issue", &format!("/issue/{key}"))
            .await
            .map_err(|e| map_not_found(e, issue_id))
    }

    async fn comment(&self, key: &str, body: &str) -> Result<(), BackendError> {
        self.api
            .send_unit(
                "add comment",
                Method::POST,
                &format!("/issue/{key}/comment"),
                &json!({ "body": body }),
            )
            .await
    }

    /// Transition `issue_id` to `state` and leave `message` as a comment.
    /// No-op when the issue is already there.
    async fn move_to_state(
        &self,
        issue_id: &str,
        state: &str,
        message: &str,
    ) -> Result<(), BackendError> {
        let issue = self.fetch(issue_id).await?;
        if issue.fields.status.name == state {
            debug!(issue = %issue.key, state, "issue already in state");
            return Ok(());
        }

        let listing: Transitions = self
            .api
            .get("list transitions", &format!("/issue/{}/transitions", issue.key))
            .await?;
        let transition = listing
            .transitions
            .iter()
            .find(|t| t.leads_to(state))
            .ok_or_else(|| BackendError::TransitionNotFound {
                backend: self.api.backend().to_string(),
                issue_id: issue.key.clone(),
                state: state.to_string(),
            })?;

        self.api
            .send_unit(
                "transition issue",
                Method::POST,
                &format!("/issue/{}/transitions", issue.key),
                &json!({ "transition": { "id": transition.id } }),
            )
            .await?;
        info!(issue = %issue.key, from = %issue.fields.status.name, to = state, "moved Jira issue");

        if !message.is_empty() {
            self.comment(&issue.key, message).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracking for JiraBackend {
    fn name(&self) -> &str {
        self.api.backend()
    }

    async fn get_issue(
        &self,
        _owner: &str,
        _repo: &str,
        issue_id: &str,
    ) -> Result<IssueSnapshot, BackendError> {
        let issue = self.fetch(issue_id).await?;
        let url = format!("{}/browse/{}", self.host, issue.key);
        Ok(IssueSnapshot {
            id: issue.key,
            title: issue.fields.summary,
            state: issue.fields.status.name,
            url,
        })
    }

    async fn start_issue(
        &self,
        _owner: &str,
        _repo: &str,
        issue_id: &str,
    ) -> Result<(), BackendError> {
        self.move_to_state(issue_id, IN_PROGRESS, START_COMMENT).await
    }

    async fn close_issue(
        &self,
        _owner: &str,
        _repo: &str,
        issue_id: &str,
    ) -> Result<(), BackendError> {
        self.move_to_state(issue_id, DONE, CLOSE_COMMENT).await
    }

    fn get_issue_url(
        &self,
        _owner: &str,
        _repo: &str,
        issue_id: &str,
    ) -> Result<String, BackendError> {
        let key = self.check_key(issue_id)?;
        Ok(format!("{}/browse/{key}", self.host))
    }

    async fn link_issue_to_request(
        &self,
        _owner: &str,
        _repo: &str,
        issue_id: &str,
        request: &OpenedRequest,
    ) -> Result<(), BackendError> {
        let key = self.check_key(issue_id)?;
        self.comment(&key, &format!("Working on changes here: {}", request.url))
            .await
    }
}

#[async_trait]
impl RepositoryHosting for JiraBackend {
    async fn open_request(
        &self,
        _owner: &str,
        _repo: &str,
        _draft: &RequestDraft,
    ) -> Result<OpenedRequest, BackendError> {
        Err(BackendError::Unsupported {
            backend: self.api.backend().to_string(),
            operation: "open_request",
        })
    }
}
