//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                                          |
//! |----------|-----------------------------------------------------------|
//! | `issue`  | `Start`, `Openpr`, `Finish`, `Workon`, `List`, `Issue`    |
//! | `config` | `Config`                                                  |
//! | `init`   | `Init`                                                    |

pub mod config;
pub mod init;
pub mod issue;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use issuectl::config::ConfigStore;

pub use config::cmd_config;
pub use init::cmd_init;
pub use issue::{cmd_finish, cmd_issue_add_repo, cmd_list, cmd_openpr, cmd_start, cmd_workon};

/// `--config`/`ISSUECTL_CONFIG`, else `~/.issuerc`.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(ConfigStore::default_path()?),
    }
}

/// Load the persistent store.
pub fn load_store(explicit: Option<&Path>) -> Result<ConfigStore> {
    let path = config_path(explicit)?;
    ConfigStore::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}
