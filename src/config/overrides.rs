//! Per-invocation overrides from command-line flags.

use tracing::debug;

use super::ConfigStore;
use crate::errors::ConfigError;

/// Flags that temporarily change the current profile for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// Extra repositories, appended to the profile's list.
    pub repos: Vec<String>,
    /// Profile to use instead of the current one.
    pub profile: Option<String>,
    pub issue_backend: Option<String>,
    pub repo_backend: Option<String>,
}

impl CliOverrides {
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
            && self.profile.is_none()
            && self.issue_backend.is_none()
            && self.repo_backend.is_none()
    }

    /// Return an in-memory view of `store` with the overrides applied.
    ///
    /// The returned handle never writes to disk, so the overrides last only
    /// as long as the handle does.
    pub fn apply(&self, store: &ConfigStore) -> Result<ConfigStore, ConfigError> {
        let mut view = store.in_memory();
        if self.is_empty() {
            return Ok(view);
        }

        if let Some(name) = &self.profile {
            view.use_profile(name)?;
        }

        let mut profile = view.get_current_profile()?.clone();
        for repo in &self.repos {
            profile.add_repository(repo);
        }
        if let Some(backend) = &self.issue_backend {
            profile.issue_backend = Some(backend.clone());
        }
        if let Some(backend) = &self.repo_backend {
            profile.repo_backend = Some(backend.clone());
        }
        debug!(profile = %profile.name, repos = ?profile.repositories, "applied command-line overrides");
        view.update_profile(profile)?;
        Ok(view)
    }
}
