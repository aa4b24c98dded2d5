//! Keyed record store with explicit persistence.
//!
//! A [`ConfigStore`] handle is created either persistent (every mutation is
//! flushed to its file before the call returns) or in-memory (mutations stay
//! in the handle). The mode is fixed for the lifetime of a handle; call
//! [`ConfigStore::in_memory`] to branch off a scratch copy for command-line
//! overrides without touching the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{BackendConfig, GitUser, Issue, IssuectlConfig, Profile, Repository, Settings};
use crate::errors::{ConfigError, RecordKind};

/// File name of the store in the user's home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".issuerc";

/// Where mutations of a store handle go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// Flush to this file after every mutation.
    File(PathBuf),
    /// Keep mutations in the handle only.
    InMemory,
}

/// A record kind that lives in one keyed map of [`IssuectlConfig`].
trait Record: Clone {
    const KIND: RecordKind;
    fn key(&self) -> &str;
    fn map(config: &IssuectlConfig) -> &BTreeMap<String, Self>;
    fn map_mut(config: &mut IssuectlConfig) -> &mut BTreeMap<String, Self>;
}

impl Record for Repository {
    const KIND: RecordKind = RecordKind::Repository;
    fn key(&self) -> &str {
        &self.name
    }
    fn map(config: &IssuectlConfig) -> &BTreeMap<String, Self> {
        &config.repositories
    }
    fn map_mut(config: &mut IssuectlConfig) -> &mut BTreeMap<String, Self> {
        &mut config.repositories
    }
}

impl Record for BackendConfig {
    const KIND: RecordKind = RecordKind::Backend;
    fn key(&self) -> &str {
        &self.name
    }
    fn map(config: &IssuectlConfig) -> &BTreeMap<String, Self> {
        &config.backends
    }
    fn map_mut(config: &mut IssuectlConfig) -> &mut BTreeMap<String, Self> {
        &mut config.backends
    }
}

impl Record for GitUser {
    const KIND: RecordKind = RecordKind::GitUser;
    fn key(&self) -> &str {
        &self.name
    }
    fn map(config: &IssuectlConfig) -> &BTreeMap<String, Self> {
        &config.git_users
    }
    fn map_mut(config: &mut IssuectlConfig) -> &mut BTreeMap<String, Self> {
        &mut config.git_users
    }
}

impl Record for Profile {
    const KIND: RecordKind = RecordKind::Profile;
    fn key(&self) -> &str {
        &self.name
    }
    fn map(config: &IssuectlConfig) -> &BTreeMap<String, Self> {
        &config.profiles
    }
    fn map_mut(config: &mut IssuectlConfig) -> &mut BTreeMap<String, Self> {
        &mut config.profiles
    }
}

impl Record for Issue {
    const KIND: RecordKind = RecordKind::Issue;
    fn key(&self) -> &str {
        &self.id
    }
    fn map(config: &IssuectlConfig) -> &BTreeMap<String, Self> {
        &config.issues
    }
    fn map_mut(config: &mut IssuectlConfig) -> &mut BTreeMap<String, Self> {
        &mut config.issues
    }
}

/// Handle over the configuration records.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    data: IssuectlConfig,
    persistence: Persistence,
}

impl ConfigStore {
    /// `~/.issuerc`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| ConfigError::Read {
            path: PathBuf::from("~"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine home directory",
            ),
        })?;
        Ok(home.join(DEFAULT_CONFIG_FILE))
    }

    /// Load a persistent store from `path`.
    ///
    /// A missing file is created empty. An unreadable or unparsable file is
    /// an error; nothing is repaired.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            info!(path = %path.display(), "config file not found, creating an empty one");
            let store = Self {
                data: IssuectlConfig::default(),
                persistence: Persistence::File(path),
            };
            store.save()?;
            return Ok(store);
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let data = if contents.trim().is_empty() {
            IssuectlConfig::default()
        } else {
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?
        };
        debug!(path = %path.display(), "loaded config");
        Ok(Self {
            data,
            persistence: Persistence::File(path),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory_from(data: IssuectlConfig) -> Self {
        Self {
            data,
            persistence: Persistence::InMemory,
        }
    }

    /// Branch off an in-memory copy of the current state.
    ///
    /// Mutations of the copy are invisible to `self` and never persisted.
    pub fn in_memory(&self) -> Self {
        Self::in_memory_from(self.data.clone())
    }

    /// Re-target the current state at `path`. Nothing is written until the
    /// next mutation or an explicit [`save`](Self::save).
    pub fn into_persistent(self, path: impl Into<PathBuf>) -> Self {
        Self {
            data: self.data,
            persistence: Persistence::File(path.into()),
        }
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.persistence, Persistence::File(_))
    }

    /// The file backing this handle, if persistent.
    pub fn path(&self) -> Option<&Path> {
        match &self.persistence {
            Persistence::File(path) => Some(path),
            Persistence::InMemory => None,
        }
    }

    pub fn data(&self) -> &IssuectlConfig {
        &self.data
    }

    /// Render the full store as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.data).map_err(ConfigError::Serialize)
    }

    /// Write the whole store to its file. No-op for in-memory handles.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Persistence::File(path) = &self.persistence else {
            return Ok(());
        };
        let yaml = self.to_yaml()?;
        write_atomic(path, &yaml)?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Apply `change`, then flush. On flush failure the change is undone so
    /// the handle never reports state that did not reach disk.
    fn mutate<T>(
        &mut self,
        change: impl FnOnce(&mut IssuectlConfig) -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        let snapshot = self.is_persistent().then(|| self.data.clone());
        let out = change(&mut self.data)?;
        if let Err(err) = self.save() {
            if let Some(previous) = snapshot {
                self.data = previous;
            }
            return Err(err);
        }
        Ok(out)
    }

    fn get<R: Record>(&self, name: &str) -> Option<&R> {
        R::map(&self.data).get(name)
    }

    fn resolve<R: Record>(&self, name: &str) -> Result<&R, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::Unresolved {
            kind: R::KIND,
            name: name.to_string(),
        })
    }

    fn add<R: Record>(&mut self, record: R) -> Result<(), ConfigError> {
        self.mutate(|data| {
            let map = R::map_mut(data);
            if map.contains_key(record.key()) {
                return Err(ConfigError::AlreadyExists {
                    kind: R::KIND,
                    name: record.key().to_string(),
                });
            }
            map.insert(record.key().to_string(), record);
            Ok(())
        })
    }

    fn update<R: Record>(&mut self, record: R) -> Result<(), ConfigError> {
        self.mutate(|data| {
            let map = R::map_mut(data);
            let Some(slot) = map.get_mut(record.key()) else {
                return Err(ConfigError::NotFound {
                    kind: R::KIND,
                    name: record.key().to_string(),
                });
            };
            *slot = record;
            Ok(())
        })
    }

    fn delete<R: Record>(&mut self, name: &str) -> Result<bool, ConfigError> {
        if !R::map(&self.data).contains_key(name) {
            return Ok(false);
        }
        self.mutate(|data| Ok(R::map_mut(data).remove(name).is_some()))
    }

    fn ensure_repository_unreferenced(&self, name: &str) -> Result<(), ConfigError> {
        match self
            .data
            .issues
            .values()
            .find(|issue| issue.repositories.iter().any(|r| r == name))
        {
            Some(issue) => Err(ConfigError::InUse {
                kind: RecordKind::Repository,
                name: name.to_string(),
                issue: issue.id.clone(),
            }),
            None => Ok(()),
        }
    }

    // Repositories

    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.data.repositories.values()
    }

    pub fn get_repository(&self, name: &str) -> Option<&Repository> {
        self.get(name)
    }

    pub fn resolve_repository(&self, name: &str) -> Result<&Repository, ConfigError> {
        self.resolve(name)
    }

    pub fn add_repository(&mut self, repo: Repository) -> Result<(), ConfigError> {
        self.add(repo)
    }

    /// Fails with `InUse` while any issue has the repository cloned.
    pub fn update_repository(&mut self, repo: Repository) -> Result<(), ConfigError> {
        self.ensure_repository_unreferenced(&repo.name)?;
        self.update(repo)
    }

    /// Fails with `InUse` while any issue has the repository cloned.
    pub fn delete_repository(&mut self, name: &str) -> Result<bool, ConfigError> {
        self.ensure_repository_unreferenced(name)?;
        self.delete::<Repository>(name)
    }

    // Backends

    pub fn backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.data.backends.values()
    }

    pub fn get_backend(&self, name: &str) -> Option<&BackendConfig> {
        self.get(name)
    }

    pub fn resolve_backend(&self, name: &str) -> Result<&BackendConfig, ConfigError> {
        self.resolve(name)
    }

    pub fn add_backend(&mut self, backend: BackendConfig) -> Result<(), ConfigError> {
        self.add(backend)
    }

    pub fn update_backend(&mut self, backend: BackendConfig) -> Result<(), ConfigError> {
        self.update(backend)
    }

    pub fn delete_backend(&mut self, name: &str) -> Result<bool, ConfigError> {
        self.delete::<BackendConfig>(name)
    }

    // Git users

    pub fn git_users(&self) -> impl Iterator<Item = &GitUser> {
        self.data.git_users.values()
    }

    pub fn get_git_user(&self, name: &str) -> Option<&GitUser> {
        self.get(name)
    }

    pub fn resolve_git_user(&self, name: &str) -> Result<&GitUser, ConfigError> {
        self.resolve(name)
    }

    pub fn add_git_user(&mut self, user: GitUser) -> Result<(), ConfigError> {
        self.add(user)
    }

    pub fn update_git_user(&mut self, user: GitUser) -> Result<(), ConfigError> {
        self.update(user)
    }

    pub fn delete_git_user(&mut self, name: &str) -> Result<bool, ConfigError> {
        self.delete::<GitUser>(name)
    }

    // Profiles

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.data.profiles.values()
    }

    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.get(name)
    }

    pub fn resolve_profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.resolve(name)
    }

    pub fn add_profile(&mut self, profile: Profile) -> Result<(), ConfigError> {
        self.add(profile)
    }

    pub fn update_profile(&mut self, profile: Profile) -> Result<(), ConfigError> {
        self.update(profile)
    }

    /// Deleting the current profile also clears the selector.
    pub fn delete_profile(&mut self, name: &str) -> Result<bool, ConfigError> {
        if !self.data.profiles.contains_key(name) {
            return Ok(false);
        }
        self.mutate(|data| {
            if data.current_profile.as_deref() == Some(name) {
                data.current_profile = None;
            }
            Ok(data.profiles.remove(name).is_some())
        })
    }

    pub fn current_profile_name(&self) -> Option<&str> {
        self.data.current_profile.as_deref()
    }

    pub fn get_current_profile(&self) -> Result<&Profile, ConfigError> {
        let name = self
            .current_profile_name()
            .ok_or(ConfigError::NoCurrentProfile)?;
        self.resolve_profile(name)
    }

    pub fn use_profile(&mut self, name: &str) -> Result<(), ConfigError> {
        self.resolve_profile(name)?;
        self.mutate(|data| {
            data.current_profile = Some(name.to_string());
            Ok(())
        })
    }

    // Issues

    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.data.issues.values()
    }

    pub fn get_issue(&self, id: &str) -> Option<&Issue> {
        self.get(id)
    }

    pub fn add_issue(&mut self, issue: Issue) -> Result<(), ConfigError> {
        self.add(issue)
    }

    pub fn update_issue(&mut self, issue: Issue) -> Result<(), ConfigError> {
        self.update(issue)
    }

    pub fn delete_issue(&mut self, id: &str) -> Result<bool, ConfigError> {
        self.delete::<Issue>(id)
    }

    // Settings

    pub fn settings(&self) -> &Settings {
        &self.data.settings
    }

    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        self.mutate(|data| {
            data.settings = settings;
            Ok(())
        })
    }
}

/// Write via temp file + rename so a failed write never truncates the store.
fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    fs::write(&tmp_path, contents).map_err(|source| ConfigError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
