//! Async wrapper around the `git` executable.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::GitUser;
use crate::errors::WorkspaceError;

/// `core.sshCommand` that uses `key` and nothing from `~/.ssh/config`.
///
/// git hands the value to the shell, so the key path is single-quoted.
pub fn ssh_command(key: &Path) -> String {
    format!(
        "ssh -i {} -o IdentitiesOnly=yes -F /dev/null",
        shell_quote(&key.to_string_lossy())
    )
}

fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Runs git commands in one working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run git and return its raw output, whatever the exit status.
    pub async fn run<I, S>(&self, args: I) -> Result<Output, WorkspaceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let rendered = render_args(&args);
        debug!(dir = %self.workdir.display(), args = %rendered, "git");
        Command::new("git")
            .args(&args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| WorkspaceError::GitSpawn {
                args: rendered,
                source,
            })
    }

    /// Run git and fail on a non-zero exit status.
    pub async fn run_checked<I, S>(&self, args: I) -> Result<Output, WorkspaceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let out = self.run(&args).await?;
        if !out.status.success() {
            return Err(WorkspaceError::GitFailed {
                args: render_args(&args),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(out)
    }

    /// Run git and return trimmed stdout.
    pub async fn run_capture<I, S>(&self, args: I) -> Result<String, WorkspaceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.run_checked(args).await?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Clone `url` into `self.workdir/dest`, using `user`'s key for transport.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn clone_into(
        &self,
        url: &str,
        dest: &str,
        user: Option<&GitUser>,
    ) -> Result<(), WorkspaceError> {
        let mut args: Vec<String> = Vec::new();
        if let Some(user) = user {
            args.push("-c".to_string());
            args.push(format!("core.sshCommand={}", ssh_command(&user.ssh_key_path)));
        }
        args.extend(["clone".to_string(), url.to_string(), dest.to_string()]);
        self.run_checked(&args).await?;
        Ok(())
    }

    /// Pin commit identity and SSH key in the repository's local config.
    pub async fn configure_identity(&self, user: &GitUser) -> Result<(), WorkspaceError> {
        self.run_checked(["config", "user.name", user.name.as_str()])
            .await?;
        self.run_checked(["config", "user.email", user.email.as_str()])
            .await?;
        self.run_checked([
            "config".to_string(),
            "core.sshCommand".to_string(),
            ssh_command(&user.ssh_key_path),
        ])
        .await?;
        Ok(())
    }

    async fn ref_exists(&self, reference: String) -> Result<bool, WorkspaceError> {
        let out = self
            .run([
                "show-ref".to_string(),
                "--verify".to_string(),
                "--quiet".to_string(),
                reference,
            ])
            .await?;
        Ok(out.status.success())
    }

    /// Check whether a local branch exists.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool, WorkspaceError> {
        self.ref_exists(format!("refs/heads/{branch}")).await
    }

    /// Check whether `origin` had `branch` when last fetched.
    pub async fn remote_branch_exists(&self, branch: &str) -> Result<bool, WorkspaceError> {
        self.ref_exists(format!("refs/remotes/origin/{branch}")).await
    }

    pub async fn checkout(&self, branch: &str) -> Result<(), WorkspaceError> {
        self.run_checked(["checkout", branch]).await?;
        Ok(())
    }

    pub async fn checkout_new(&self, branch: &str) -> Result<(), WorkspaceError> {
        self.run_checked(["checkout", "-b", branch]).await?;
        Ok(())
    }

    /// Push `branch` to `origin` and set it as upstream.
    pub async fn push_upstream(&self, branch: &str) -> Result<(), WorkspaceError> {
        self.run_checked(["push", "-u", "origin", branch]).await?;
        Ok(())
    }

    pub async fn current_branch(&self) -> Result<String, WorkspaceError> {
        self.run_capture(["rev-parse", "--abbrev-ref", "HEAD"]).await
    }
}

fn render_args<S: AsRef<OsStr>>(args: &[S]) -> String {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
