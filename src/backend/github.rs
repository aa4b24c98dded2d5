//! GitHub REST v3 backend.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::http::{ApiClient, Auth, map_not_found, parse_issue_number};
use super::{IssueSnapshot, IssueTracking, OpenedRequest, RepositoryHosting, RequestDraft};
use crate::config::GitHubConfig;
use crate::errors::BackendError;

pub const DEFAULT_API_HOST: &str = "https://api.github.com";
pub const IN_PROGRESS_LABEL: &str = "In Progress";

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    login: String,
}

/// A GitHub issue (subset of fields).
#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    state: String,
    html_url: String,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    assignees: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    html_url: String,
}

pub struct GitHubBackend {
    api: ApiClient,
    username: String,
    web_base: String,
}

impl GitHubBackend {
    pub fn new(name: &str, config: &GitHubConfig, token: &str) -> Result<Self, BackendError> {
        let host = if config.host.trim().is_empty() {
            DEFAULT_API_HOST
        } else {
            config.host.as_str()
        };
        let api = ApiClient::new(name, host, Auth::Bearer(token.to_string()))?;
        let web_base = web_base(api.base_url());
        Ok(Self {
            api,
            username: config.username.clone(),
            web_base,
        })
    }

    async fn fetch(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<(u64, GitHubIssue), BackendError> {
        let number = parse_issue_number(self.api.backend(), issue_id)?;
        let issue = self
            .api
            .get::<GitHubIssue>("get issue", &format!("/repos/{owner}/{repo}/issues/{number}"))
            .await
            .map_err(|e| map_not_found(e, issue_id))?;
        Ok((number, issue))
    }
}

/// Browser-facing root for a given API root.
///
/// `https://api.github.com` → `https://github.com`,
/// `https://ghe.example.com/api/v3` → `https://ghe.example.com`.
fn web_base(api_base: &str) -> String {
    if let Some(rest) = api_base.strip_prefix("https://api.") {
        return format!("https://{rest}");
    }
    api_base
        .strip_suffix("/api/v3")
        .unwrap_or(api_base)
        .to_string()
}

#[async_trait]
impl IssueTracking for GitHubBackend {
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
            id: issue.number.to_string(),
            title: issue.title,
            state: issue.state,
            url: issue.html_url,
        })
    }

    async fn start_issue(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<(), BackendError> {
        let (number, issue) = self.fetch(owner, repo, issue_id).await?;
        let has_label = issue.labels.iter().any(|l| l.name == IN_PROGRESS_LABEL);
        let is_assigned = issue.assignees.iter().any(|u| u.login == self.username);

        if !has_label {
            self.api
                .send_unit(
                    "add label",
                    Method::POST,
                    &format!("/repos/{owner}/{repo}/issues/{number}/labels"),
                    &json!({ "labels": [IN_PROGRESS_LABEL] }),
                )
                .await?;
        }
        if !is_assigned {
            self.api
                .send_unit(
                    "add assignee",
                    Method::POST,
                    &format!("/repos/{owner}/{repo}/issues/{number}/assignees"),
                    &json!({ "assignees": [self.username] }),
                )
                .await?;
        }
        if has_label && is_assigned {
            debug!(issue = number, "issue already in progress");
        } else {
            info!(issue = number, "marked issue in progress on GitHub");
        }
        Ok(())
    }

    async fn close_issue(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<(), BackendError> {
        let (number, issue) = self.fetch(owner, repo, issue_id).await?;
        if issue.state == "closed" {
            debug!(issue = number, "issue already closed");
            return Ok(());
        }
        self.api
            .send_unit(
                "close issue",
                Method::PATCH,
                &format!("/repos/{owner}/{repo}/issues/{number}"),
                &json!({ "state": "closed" }),
            )
            .await
    }

    fn get_issue_url(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
    ) -> Result<String, BackendError> {
        let number = parse_issue_number(self.api.backend(), issue_id)?;
        Ok(format!("{}/{owner}/{repo}/issues/{number}", self.web_base))
    }

    async fn link_issue_to_request(
        &self,
        owner: &str,
        repo: &str,
        issue_id: &str,
        request: &OpenedRequest,
    ) -> Result<(), BackendError> {
        let number = parse_issue_number(self.api.backend(), issue_id)?;
        // Pull requests share the issue comment endpoint.
        self.api
            .send_unit(
                "comment on pull request",
                Method::POST,
                &format!("/repos/{owner}/{repo}/issues/{}/comments", request.id),
                &json!({ "body": format!("Resolves #{number}") }),
            )
            .await
    }
}

#[async_trait]
impl RepositoryHosting for GitHubBackend {
    async fn open_request(
        &self,
        owner: &str,
        repo: &str,
        draft: &RequestDraft,
    ) -> Result<OpenedRequest, BackendError> {
        let pr: PullRequest = self
            .api
            .send(
                "open pull request",
                Method::POST,
                &format!("/repos/{owner}/{repo}/pulls"),
                &json!({
                    "title": draft.title,
                    "body": draft.body,
                    "head": draft.head,
                    "base": draft.base,
                    "maintainer_can_modify": true,
                }),
            )
            .await?;
        info!(number = pr.number, url = %pr.html_url, "opened pull request");
        Ok(OpenedRequest {
            id: pr.number.to_string(),
            url: pr.html_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeApi;
    use serde_json::Value;

    fn issue_json(labels: &[&str], assignees: &[&str], state: &str) -> Value {
        json!({
            "number": 5,
            "title": "Fix: login (urgent)!",
            "state": state,
            "html_url": "https://github.com/acme/svc/issues/5",
            "labels": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>(),
            "assignees": assignees.iter().map(|a| json!({ "login": a })).collect::<Vec<_>>(),
        })
    }

    async fn backend(api: &FakeApi) -> GitHubBackend {
        let host = api.serve().await;
        GitHubBackend::new(
            "gh",
            &GitHubConfig {
                host,
                token: String::new(),
                username: "octocat".to_string(),
            },
            "ghp_secret",
        )
        .unwrap()
    }

    #[test]
    fn web_base_derivation() {
        assert_eq!(web_base("https://api.github.com"), "https://github.com");
        assert_eq!(web_base("https://ghe.acme.io/api/v3"), "https://ghe.acme.io");
        assert_eq!(web_base("http://127.0.0.1:9000"), "http://127.0.0.1:9000");
    }

    #[tokio::test]
    async fn get_issue_sends_bearer_token() {
        let api = FakeApi::new();
        api.respond("GET /repos/acme/svc/issues/5", 200, issue_json(&[], &[], "open"));
        let gh = backend(&api).await;

        let snapshot = gh.get_issue("acme", "svc", "5").await.unwrap();
        assert_eq!(snapshot.title, "Fix: login (urgent)!");
        assert_eq!(snapshot.state, "open");

        let calls = api.calls();
        assert_eq!(
            calls[0].headers.get("authorization").unwrap(),
            "Bearer ghp_secret"
        );
    }

    #[tokio::test]
    async fn get_missing_issue_is_not_found() {
        let api = FakeApi::new();
        let gh = backend(&api).await;
        let err = gh.get_issue("acme", "svc", "404").await.unwrap_err();
        assert!(matches!(err, BackendError::IssueNotFound { .. }));
    }

    #[tokio::test]
    async fn start_adds_label_and_assignee() {
        let api = FakeApi::new();
        api.respond("GET /repos/acme/svc/issues/5", 200, issue_json(&[], &[], "open"))
            .respond("POST /repos/acme/svc/issues/5/labels", 200, json!([]))
            .respond("POST /repos/acme/svc/issues/5/assignees", 201, json!({}));
        let gh = backend(&api).await;

        gh.start_issue("acme", "svc", "5").await.unwrap();

        let mutations = api.mutations();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0].body, json!({ "labels": ["In Progress"] }));
        assert_eq!(mutations[1].body, json!({ "assignees": ["octocat"] }));
    }

    #[tokio::test]
    async fn start_only_fills_missing_parts() {
        let api = FakeApi::new();
        api.respond(
            "GET /repos/acme/svc/issues/5",
            200,
            issue_json(&["In Progress"], &["someone"], "open"),
        )
        .respond("POST /repos/acme/svc/issues/5/assignees", 201, json!({}));
        let gh = backend(&api).await;

        gh.start_issue("acme", "svc", "5").await.unwrap();

        let mutations = api.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].path, "/repos/acme/svc/issues/5/assignees");
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let api = FakeApi::new();
        api.respond(
            "GET /repos/acme/svc/issues/5",
            200,
            issue_json(&["bug", "In Progress"], &["octocat"], "open"),
        );
        let gh = backend(&api).await;
        gh.start_issue("acme", "svc", "5").await.unwrap();
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn close_patches_state_once() {
        let api = FakeApi::new();
        api.respond("GET /repos/acme/svc/issues/5", 200, issue_json(&[], &[], "open"))
            .respond("PATCH /repos/acme/svc/issues/5", 200, json!({}));
        let gh = backend(&api).await;
        gh.close_issue("acme", "svc", "5").await.unwrap();
        assert_eq!(api.mutations()[0].body, json!({ "state": "closed" }));

        let closed = FakeApi::new();
        closed.respond("GET /repos/acme/svc/issues/5", 200, issue_json(&[], &[], "closed"));
        let gh = backend(&closed).await;
        gh.close_issue("acme", "svc", "5").await.unwrap();
        assert!(closed.mutations().is_empty());
    }

    #[tokio::test]
    async fn open_request_and_link() {
        let api = FakeApi::new();
        api.respond(
            "POST /repos/acme/svc/pulls",
            201,
            json!({ "number": 17, "html_url": "https://github.com/acme/svc/pull/17" }),
        )
        .respond("POST /repos/acme/svc/issues/17/comments", 201, json!({}));
        let gh = backend(&api).await;

        let draft = RequestDraft {
            title: "5 | Fix login".to_string(),
            body: "Resolves #5".to_string(),
            base: "master".to_string(),
            head: "5-Fix-login".to_string(),
        };
        let opened = gh.open_request("acme", "svc", &draft).await.unwrap();
        assert_eq!(opened.id, "17");
        gh.link_issue_to_request("acme", "svc", "5", &opened)
            .await
            .unwrap();

        let mutations = api.mutations();
        assert_eq!(mutations[0].body["head"], "5-Fix-login");
        assert_eq!(mutations[0].body["base"], "master");
        assert_eq!(mutations[0].body["maintainer_can_modify"], true);
        assert_eq!(mutations[1].body, json!({ "body": "Resolves #5" }));
    }

    #[tokio::test]
    async fn api_errors_carry_operation_context() {
        let api = FakeApi::new();
        api.respond(
            "GET /repos/acme/svc/issues/5",
            401,
            json!({ "message": "Bad credentials" }),
        );
        let gh = backend(&api).await;
        let err = gh.close_issue("acme", "svc", "5").await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Status { status: 401, operation: "get issue", .. }
        ));
    }
}
