//! Typed error hierarchy for issuectl.
//!
//! Subsystem enums and the orchestrator enum that wraps them:
//! - `ConfigError`: store load/save and record resolution failures
//! - `BackendError`: tracker and repository-host API failures
//! - `WorkspaceError`: filesystem and `git` subprocess failures
//! - `IssueError`: orchestrator failures, wrapping the three above

use std::path::PathBuf;

use thiserror::Error;

use crate::config::Issue;

/// The kind of record a configuration lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Repository,
    Backend,
    GitUser,
    Profile,
    Issue,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Repository => write!(f, "repository"),
            RecordKind::Backend => write!(f, "backend"),
            RecordKind::GitUser => write!(f, "git user"),
            RecordKind::Profile => write!(f, "profile"),
            RecordKind::Issue => write!(f, "issue"),
        }
    }
}

/// Errors from the configuration store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file at {path} is corrupted: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{kind} '{name}' is not defined")]
    Unresolved { kind: RecordKind, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: RecordKind, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: RecordKind, name: String },

    #[error("{kind} '{name}' is referenced by issue '{issue}'")]
    InUse {
        kind: RecordKind,
        name: String,
        issue: String,
    },

    #[error("No current profile selected (run `issuectl config profile use <name>`)")]
    NoCurrentProfile,

    #[error("Backend token for '{backend}' is not valid base64: {source}")]
    TokenDecode {
        backend: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Errors from tracker and repository-host backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend}: {operation} request failed: {source}")]
    Request {
        backend: String,
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend}: {operation} returned HTTP {status}: {body}")]
    Status {
        backend: String,
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{backend}: issue '{issue_id}' not found")]
    IssueNotFound { backend: String, issue_id: String },

    #[error("{backend}: issue id '{issue_id}' is invalid: {reason}")]
    InvalidIssueId {
        backend: String,
        issue_id: String,
        reason: String,
    },

    #[error("{backend}: unable to find '{state}' transition for issue '{issue_id}'")]
    TransitionNotFound {
        backend: String,
        issue_id: String,
        state: String,
    },

    #[error("{backend}: {operation} is not supported by this backend")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the local workspace (filesystem + git).
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Directory {0} already exists")]
    DirectoryExists(PathBuf),

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn git {args}: {source}")]
    GitSpawn {
        args: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {args} failed: {stderr}")]
    GitFailed { args: String, stderr: String },
}

/// Errors from the issue orchestrator.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Issue '{id}' is already in use")]
    DuplicateIssue { id: String },

    #[error("Issue '{id}' not found")]
    IssueNotFound { id: String },

    #[error("Issue id '{id}' cannot be used as a directory name")]
    InvalidIssueId { id: String },

    #[error("Profile '{profile}' has no {field} configured")]
    MissingProfileField {
        profile: String,
        field: &'static str,
    },

    #[error("Repository '{repository}' is already part of issue '{id}'")]
    RepositoryAlreadyAdded { id: String, repository: String },

    #[error(
        "Start of issue '{}' aborted (dir: {}, cloned: [{}]): {source}",
        .partial.id,
        .partial.dir.display(),
        .partial.repositories.join(", ")
    )]
    StartAborted {
        partial: Box<Issue>,
        #[source]
        source: Box<IssueError>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl IssueError {
    /// Unwrap `StartAborted` to the failure that caused it.
    pub fn root(&self) -> &IssueError {
        match self {
            IssueError::StartAborted { source, .. } => source.root(),
            other => other,
        }
    }
}
