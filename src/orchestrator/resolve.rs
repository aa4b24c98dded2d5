//! Profile resolution: follow every name a profile references to its record.

use crate::config::{BackendConfig, ConfigStore, GitUser, Profile, Repository};
use crate::errors::{ConfigError, IssueError};

/// A profile with all of its references looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub profile: Profile,
    pub issue_backend: Option<BackendConfig>,
    pub repo_backend: Option<BackendConfig>,
    pub git_user: Option<GitUser>,
    pub default_repository: Option<Repository>,
    /// In profile order.
    pub repositories: Vec<Repository>,
}

impl ResolvedProfile {
    /// Resolve the store's current profile.
    pub fn current(store: &ConfigStore) -> Result<Self, ConfigError> {
        Self::resolve(store, store.get_current_profile()?)
    }

    pub fn named(store: &ConfigStore, name: &str) -> Result<Self, ConfigError> {
        Self::resolve(store, store.resolve_profile(name)?)
    }

    /// Fails on the first reference that names no record.
    pub fn resolve(store: &ConfigStore, profile: &Profile) -> Result<Self, ConfigError> {
        let backend = |name: &Option<String>| -> Result<Option<BackendConfig>, ConfigError> {
            name.as_deref()
                .map(|n| store.resolve_backend(n).cloned())
                .transpose()
        };
        let issue_backend = backend(&profile.issue_backend)?;
        let repo_backend = backend(&profile.repo_backend)?;
        let git_user = profile
            .git_user
            .as_deref()
            .map(|n| store.resolve_git_user(n).cloned())
            .transpose()?;
        let default_repository = profile
            .default_repository
            .as_deref()
            .map(|n| store.resolve_repository(n).cloned())
            .transpose()?;
        let repositories = profile
            .repositories
            .iter()
            .map(|n| store.resolve_repository(n).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            profile: profile.clone(),
            issue_backend,
            repo_backend,
            git_user,
            default_repository,
            repositories,
        })
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn require_default_repository(&self) -> Result<&Repository, IssueError> {
        self.default_repository
            .as_ref()
            .ok_or_else(|| IssueError::MissingProfileField {
                profile: self.profile.name.clone(),
                field: "default repository",
            })
    }
}
