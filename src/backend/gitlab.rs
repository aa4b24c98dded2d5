//! GitLab REST v4 backend. Issue and merge request numbers are per-project
//! `iid`s; projects are addressed by their URL-encoded `owner/repo` path.

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::http::{ApiClient, Auth, map_not_found, parse_issue_number};
use super::{IssueSnapshot, IssueTracking, OpenedRequest, RepositoryHosting, RequestDraft};
use crate::config::GitLabConfig;
use crate::errors::BackendError;

pub const DEFAULT_API_HOST: &str = "https://gitlab.com/api/v4";

#[derive(Debug, Deserialize)]
struct Assignee {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GitLabIssue {
    iid: u64,
    title: String,
    state: String,
    web_url: String,
    #[serde(default)]
    assignee: Option<Assignee>,
    #[serde(default)]
    assignees: Vec<Assignee>,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
    web_url: String,
    #[serde(default)]
    description: Option<String>,
}

pub struct GitLabBackend {
    api: ApiClient,
    user_id: u64,
    web_base: String,
}

/// Everything but RFC 3986 unreserved characters.
const PROJECT_ID: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `owner/repo` as one path segment. Owners may be nested groups.
fn project_path(owner: &str, repo: &str) -> String {
    let id = format!("{}/{}", owner.trim_matches('/'), repo.trim_matches('/'));
    utf8_percent_encode(&id, PROJECT_ID).to_string()
}

fn web_base(api_base: &str) -> String {
    api_base
        .strip_suffix("/api/v4")
        .unwrap_or(api_base)
        .to_string()
}

impl GitLabBackend {
    pub fn new(name: &str, config: &GitLabConfig, token: &str) -> Result<Self, BackendError> {
        let host = if config.host.trim().is_empty() {
            DEFAULT_API_HOST
        } else {
            config.host.as_str()
        };
        let api = ApiClient::new(name, host, Auth::PrivateToken(token.to_string()))?;
        let web_base = web_base(api.base_url());
        Ok(Self {
            api,
            user_id: config.user_id,
            web_base,
        })
    }

    async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<(u64, GitLabIssue), BackendError> {
        let iid = parse_issue_number(self.api.backend(), issue_id)?;
        let issue = self
            .api
            .get::<GitLabIssue>(
                "get issue",
                &format!("/projects/{}/issues/{iid}", project_path(owner, repo)),
            )
            .await
            .map_err(|e| map_not_found(e, issue_id))?;
        Ok((iid, issue))
    }
}

#[async_trait]
impl IssueTracking for GitLabBackend {
    fn name(&self) -> &str {
        self.api.backend()
    }

    async fn get_issue(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<IssueSnapshot, BackendError> {
        let (_, issue) = self.fetch(owner, repo, issue_id).await?;
        Ok(IssueSnapshot {
            id: issue.iid.to_string(),
            title: issue.title,
            state: issue.state,
            url: issue.web_url,
        })
    }

    async fn start_issue(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<(), BackendError> {
        let (iid, issue) = self.fetch(owner, repo, issue_id).await?;
        let assigned = issue.assignee.as_ref().is_some_and(|a| a.id == self.user_id)
            || issue.assignees.iter().any(|a| a.id == self.user_id);
        if assigned {
            debug!(issue = iid, "issue already assigned");
            return Ok(());
        }
        self.api
            .send_unit(
                "assign issue",
                Method::PUT,
                &format!("/projects/{}/issues/{iid}", project_path(owner, repo)),
                &json!({ "assignee_ids": [self.user_id] }),
            )
            .await?;
        info!(issue = iid, "assigned issue on GitLab");
        Ok(())
    }

    async fn close_issue(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<(), BackendError> {
        let (iid, issue) = self.fetch(owner, repo, issue_id).await?;
        if issue.state == "closed" {
            debug!(issue = iid, "issue already closed");
            return Ok(());
        }
        self.api
            .send_unit(
                "close issue",
                Method::PUT,
                &format!("/projects/{}/issues/{iid}", project_path(owner, repo)),
                &json!({ "state_event": "close" }),
            )
            .await
    }

    fn get_issue_url(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<String, BackendError> {
        let iid = parse_issue_number(self.api.backend(), issue_id)?;
        Ok(format!("{}/{owner}/{repo}/-/issues/{iid}", self.web_base))
    }

    /// Add a closing reference to the merge request description.
    async fn link_issue_to_request(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
        request: &OpenedRequest,
    ) -> Result<(), BackendError> {
        let iid = parse_issue_number(self.api.backend(), issue_id)?;
        let path = format!(
            "/projects/{}/merge_requests/{}",
            project_path(owner, repo),
            request.id
        );
        let mr: MergeRequest = self.api.get("get merge request", &path).await?;
        let reference = format!("Closes {owner}/{repo}#{iid}");
        let description = mr.description.unwrap_or_default();
        if description.contains(&reference) {
            debug!(mr = mr.iid, "merge request already references issue");
            return Ok(());
        }
        let description = if description.trim().is_empty() {
            reference
        } else {
            format!("{}\n\n{reference}", description.trim_end())
        };
        self.api
            .send_unit(
                "update merge request",
                Method::PUT,
                &path,
                &json!({ "description": description }),
            )
            .await
    }
}

#[async_trait]
impl RepositoryHosting for GitLabBackend {
    async fn open_request(
        &self,
        owner: &str,
        repo: &str,
        draft: &RequestDraft,
    ) -> Result<OpenedRequest, BackendError> {
        let mr: MergeRequest = self
            .api
            .send(
                "open merge request",
                Method::POST,
                &format!("/projects/{}/merge_requests", project_path(owner, repo)),
                &json!({
                    "title": draft.title,
                    "description": draft.body,
                    "source_branch": draft.head,
                    "target_branch": draft.base,
                }),
            )
            .await?;
        info!(iid = mr.iid, url = %mr.web_url, "opened merge request");
        Ok(OpenedRequest {
            id: mr.iid.to_string(),
            url: mr.web_url,
        })
    }
}
