//! Thin reqwest wrapper shared by the HTTP backends.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::BackendError;

const USER_AGENT: &str = concat!("issuectl/", env!("CARGO_PKG_VERSION"));

/// Credentials attached to every request.
#[derive(Clone)]
pub enum Auth {
    /// `Authorization: Bearer <token>` (GitHub).
    Bearer(String),
    /// `PRIVATE-TOKEN: <token>` (GitLab).
    PrivateToken(String),
    /// HTTP basic auth (Jira).
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self {
            Auth::Bearer(_) => "Bearer",
            Auth::PrivateToken(_) => "PrivateToken",
            Auth::Basic { .. } => "Basic",
        };
        write!(f, "Auth::{scheme}(..)")
    }
}

/// JSON API client bound to one backend instance.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    backend: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(
        backend: impl Into<String>,
        base_url: &str,
        auth: Auth,
    ) -> Result<Self, BackendError> {
        let backend = backend.into();
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| BackendError::Request {
                backend: backend.clone(),
                operation: "build client",
                source,
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            backend,
            auth,
        })
    }

    /// Name of the backend this client talks to, for error context.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.auth {
            Auth::Bearer(token) => builder.header("Authorization", format!("Bearer {}", token)),
            Auth::PrivateToken(token) => builder.header("PRIVATE-TOKEN", token),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }

    async fn execute(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let resp = builder
            .send()
            .await
            .map_err(|source| self.request_error(operation, source))?;
        let status = resp.status();
        debug!(backend = %self.backend, operation, status = status.as_u16(), "api call");
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Status {
            backend: self.backend.clone(),
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        resp: Response,
    ) -> Result<T, BackendError> {
        resp.json::<T>()
            .await
            .map_err(|source| self.request_error(operation, source))
    }

    fn request_error(&self, operation: &'static str, source: reqwest::Error) -> BackendError {
        BackendError::Request {
            backend: self.backend.clone(),
            operation,
            source,
        }
    }

    /// `GET` and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<T, BackendError> {
        let resp = self
            .execute(operation, self.request(Method::GET, path))
            .await?;
        self.decode(operation, resp).await
    }

    /// Send a JSON body and decode the JSON response.
    pub async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let resp = self
            .execute(operation, self.request(method, path).json(body))
            .await?;
        self.decode(operation, resp).await
    }

    /// Send a JSON body and discard whatever comes back.
    pub async fn send_unit<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        self.execute(operation, self.request(method, path).json(body))
            .await?;
        Ok(())
    }
}

/// Whether `err` is an HTTP 404 from the remote.
pub fn is_not_found(err: &BackendError) -> bool {
    matches!(err, BackendError::Status { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
}

/// Turn a 404 into `IssueNotFound`; pass every other error through.
pub fn map_not_found(err: BackendError, issue_id: &str) -> BackendError {
    if is_not_found(&err) {
        let backend = match &err {
            BackendError::Status { backend, .. } => backend.clone(),
            _ => String::new(),
        };
        BackendError::IssueNotFound {
            backend,
            issue_id: issue_id.to_string(),
        }
    } else {
        err
    }
}

/// Parse a GitHub/GitLab issue number.
pub fn parse_issue_number(backend: &str, issue_id: &str) -> Result<u64, BackendError> {
    issue_id
        .trim()
        .trim_start_matches('#')
        .parse::<u64>()
        .map_err(|e| BackendError::InvalidIssueId {
            backend: backend.to_string(),
            issue_id: issue_id.to_string(),
            reason: e.to_string(),
        })
}
