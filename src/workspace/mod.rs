//! Local side of an issue: its directory, the clones inside it and their
//! branches.

pub mod git;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{GitUser, Repository};
use crate::errors::WorkspaceError;

pub use git::Git;

/// Characters replaced by `-` in branch names.
pub const BRANCH_UNSAFE_CHARS: &[char] = &[
    ' ', ',', ':', '|', ';', '(', ')', '#', '@', '!', '.', '$', '%', '^', '&', '*',
];

/// Replace each branch-unsafe character with `-`, one for one.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if BRANCH_UNSAFE_CHARS.contains(&c) { '-' } else { c })
        .collect()
}

/// `"{issue_id}-{sanitized title}"`.
pub fn branch_name(issue_id: &str, title: &str) -> String {
    format!("{}-{}", issue_id, sanitize_title(title))
}

/// Filesystem and version-control operations on issue workspaces.
///
/// Real implementation: [`GitWorkspace`]. Orchestrator tests use an
/// in-memory fake.
#[async_trait]
pub trait Workspace: Send + Sync {
    /// Create `work_dir/name`. Fails if it already exists.
    async fn create_issue_directory(
        &self,
        work_dir: &Path,
        name: &str,
    ) -> Result<PathBuf, WorkspaceError>;

    /// Clone `repo` into `parent/repo.name` and return the clone's path.
    async fn clone_repository(
        &self,
        repo: &Repository,
        parent: &Path,
        user: Option<&GitUser>,
    ) -> Result<PathBuf, WorkspaceError>;

    /// Check out `branch`, creating and pushing it first if it is new.
    async fn create_branch(
        &self,
        repo_dir: &Path,
        branch: &str,
        user: Option<&GitUser>,
    ) -> Result<(), WorkspaceError>;

    /// Recursively delete `path`. An absent path is not an error.
    async fn remove_directory_tree(&self, path: &Path) -> Result<(), WorkspaceError>;
}

/// [`Workspace`] backed by the real filesystem and `git`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitWorkspace;

#[async_trait]
impl Workspace for GitWorkspace {
    async fn create_issue_directory(
        &self,
        work_dir: &Path,
        name: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|source| WorkspaceError::Io {
                action: "create work directory",
                path: work_dir.to_path_buf(),
                source,
            })?;
        let dir = work_dir.join(name);
        // create_dir (not create_dir_all) so an existing directory is an error
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {
                info!(dir = %dir.display(), "created issue directory");
                Ok(dir)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(WorkspaceError::DirectoryExists(dir))
            }
            Err(source) => Err(WorkspaceError::Io {
                action: "create issue directory",
                path: dir,
                source,
            }),
        }
    }

    async fn clone_repository(
        &self,
        repo: &Repository,
        parent: &Path,
        user: Option<&GitUser>,
    ) -> Result<PathBuf, WorkspaceError> {
        info!(repo = %repo.name, "cloning repository");
        Git::new(parent).clone_into(&repo.url, &repo.name, user).await?;
        let repo_dir = parent.join(&repo.name);
        if let Some(user) = user {
            Git::new(&repo_dir).configure_identity(user).await?;
        }
        Ok(repo_dir)
    }

    async fn create_branch(
        &self,
        repo_dir: &Path,
        branch: &str,
        _user: Option<&GitUser>,
    ) -> Result<(), WorkspaceError> {
        // Transport key and identity were pinned in the clone's local config.
        let git = Git::new(repo_dir);
        if git.branch_exists(branch).await? {
            info!(branch, "checking out existing branch");
            return git.checkout(branch).await;
        }
        // A fresh clone only has remote-tracking refs; `checkout` sets up tracking.
        if git.remote_branch_exists(branch).await? {
            info!(branch, "checking out branch from origin");
            return git.checkout(branch).await;
        }
        info!(branch, "creating branch");
        git.checkout_new(branch).await?;
        git.push_upstream(branch).await
    }

    async fn remove_directory_tree(&self, path: &Path) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!(dir = %path.display(), "removed directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %path.display(), "directory already absent");
                Ok(())
            }
            Err(source) => Err(WorkspaceError::Io {
                action: "remove",
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
