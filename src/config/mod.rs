//! Configuration records and the store that persists them.
//!
//! The store file is YAML with one keyed map per record kind:
//!
//! ```yaml
//! currentProfile: default
//! settings:
//!   rollbackFailedStart: false
//!   editor: code
//! repositories:
//!   svc:
//!     name: svc
//!     owner: acme
//!     url: git@github.com:acme/svc.git
//! backends:
//!   gh:
//!     name: gh
//!     kind:
//!       type: github
//!       host: https://api.github.com
//!       token: Z2hwX3NlY3JldA
//!       username: octocat
//! gitUsers: {}
//! profiles: {}
//! issues: {}
//! ```
//!
//! Tokens are base64-encoded at rest. That is obfuscation only: anyone who
//! can read the file can recover the token.

pub mod overrides;
pub mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub use overrides::CliOverrides;
pub use store::{ConfigStore, Persistence};

/// Unpadded on write, padding-tolerant on read.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Default editor command used by `workon`.
pub const DEFAULT_EDITOR: &str = "code";

/// Obfuscate a plaintext token for storage.
pub fn encode_token(plain: &str) -> String {
    TOKEN_ENGINE.encode(plain.as_bytes())
}

/// Recover the plaintext token of `backend` from its stored form.
pub fn decode_token(backend: &str, stored: &str) -> Result<String, ConfigError> {
    let bytes = TOKEN_ENGINE
        .decode(stored.trim())
        .map_err(|source| ConfigError::TokenDecode {
            backend: backend.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// A git repository that issues can clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: String,
    pub url: String,
}

/// Commit identity and transport key for git operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitUser {
    pub name: String,
    pub email: String,
    pub ssh_key_path: PathBuf,
}

/// Credentials for a GitHub-compatible API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base, e.g. `https://api.github.com` or `https://ghe.example.com/api/v3`.
    pub host: String,
    /// Base64-obfuscated personal access token.
    pub token: String,
    /// Login used for assignment.
    pub username: String,
}

/// Credentials for a GitLab API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitLabConfig {
    /// API base, e.g. `https://gitlab.com/api/v4`.
    pub host: String,
    pub token: String,
    /// Numeric id of the user issues get assigned to.
    pub user_id: u64,
}

/// Credentials for a Jira Cloud/Server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraConfig {
    /// Site root, e.g. `https://acme.atlassian.net`.
    pub host: String,
    pub token: String,
    /// Account e-mail or username for basic auth.
    pub username: String,
}

/// Kind-specific backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(rename = "github")]
    GitHub(GitHubConfig),
    #[serde(rename = "gitlab")]
    GitLab(GitLabConfig),
    Jira(JiraConfig),
}

impl BackendKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            BackendKind::GitHub(_) => "github",
            BackendKind::GitLab(_) => "gitlab",
            BackendKind::Jira(_) => "jira",
        }
    }

    /// The stored (obfuscated) token.
    pub fn stored_token(&self) -> &str {
        match self {
            BackendKind::GitHub(c) => &c.token,
            BackendKind::GitLab(c) => &c.token,
            BackendKind::Jira(c) => &c.token,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            BackendKind::GitHub(c) => &c.host,
            BackendKind::GitLab(c) => &c.host,
            BackendKind::Jira(c) => &c.host,
        }
    }
}

/// A named connection to a tracker or repository host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
}

/// A named bundle of work dir, backends, git identity and repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub work_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_repository: Option<String>,
    /// Ordered, duplicate-free.
    #[serde(default)]
    pub repositories: Vec<String>,
}

impl Profile {
    /// Append `repo` unless it is already listed. Returns whether it was added.
    pub fn add_repository(&mut self, repo: &str) -> bool {
        if self.repositories.iter().any(|r| r == repo) {
            return false;
        }
        self.repositories.push(repo.to_string());
        true
    }
}

/// Local record of an in-progress issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub name: String,
    pub branch_name: String,
    pub dir: PathBuf,
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_backend: Option<String>,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Store-wide behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Remove the issue directory when `start` fails midway.
    pub rollback_failed_start: bool,
    /// Command `workon` launches with the issue directory as argument.
    pub editor: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rollback_failed_start: false,
            editor: DEFAULT_EDITOR.to_string(),
        }
    }
}

/// On-disk shape of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssuectlConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_profile: Option<String>,
    pub settings: Settings,
    pub repositories: BTreeMap<String, Repository>,
    pub backends: BTreeMap<String, BackendConfig>,
    pub git_users: BTreeMap<String, GitUser>,
    pub profiles: BTreeMap<String, Profile>,
    pub issues: BTreeMap<String, Issue>,
}
