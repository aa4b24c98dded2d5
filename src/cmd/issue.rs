//! Issue lifecycle commands: `issuectl start|openpr|finish|workon|list|issue`.

use anyhow::{Context, Result, bail};
use std::path::Path;

use issuectl::config::CliOverrides;
use issuectl::errors::IssueError;
use issuectl::orchestrator::{IssueOrchestrator, issue_id_from_path};

use super::super::OverrideArgs;
use super::load_store;

impl From<&OverrideArgs> for CliOverrides {
    fn from(args: &OverrideArgs) -> Self {
        CliOverrides {
            repos: args.repos.clone(),
            profile: args.profile.clone(),
            issue_backend: args.issue_backend.clone(),
            repo_backend: args.repo_backend.clone(),
        }
    }
}

pub async fn cmd_start(
    config: Option<&Path>,
    issue_id: &str,
    overrides: &OverrideArgs,
    name: Option<&str>,
) -> Result<()> {
    let mut store = load_store(config)?;
    let view = CliOverrides::from(overrides).apply(&store)?;

    let orchestrator = IssueOrchestrator::default();
    let rollback = store.settings().rollback_failed_start;
    let issue = orchestrator
        .start(&mut store, &view, issue_id, name)
        .await
        .inspect_err(|err| {
            if let IssueError::StartAborted { partial, .. } = err {
                if !rollback && partial.dir.exists() {
                    eprintln!(
                        "Leaving {} in place for inspection; remove it before retrying.",
                        partial.dir.display()
                    );
                }
            }
        })?;

    println!();
    println!("Started issue {}: {}", issue.id, issue.name);
    println!("  Directory:    {}", issue.dir.display());
    println!("  Branch:       {}", issue.branch_name);
    println!("  Repositories: {}", issue.repositories.join(", "));
    println!();
    Ok(())
}

pub async fn cmd_openpr(
    config: Option<&Path>,
    issue_id: Option<&str>,
    title: Option<&str>,
) -> Result<()> {
    let store = load_store(config)?;
    let issue_id = match issue_id {
        Some(id) => id.to_string(),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            match issue_id_from_path(&store, &cwd) {
                Some(id) => id,
                None => bail!(
                    "No issue id given and {} is not inside an issue directory",
                    cwd.display()
                ),
            }
        }
    };

    let opened = IssueOrchestrator::default()
        .open_request(&store, &issue_id, title)
        .await?;
    println!("Opened request #{} for issue {}: {}", opened.id, issue_id, opened.url);
    Ok(())
}

pub async fn cmd_finish(config: Option<&Path>, issue_id: &str) -> Result<()> {
    let mut store = load_store(config)?;
    let issue = IssueOrchestrator::default()
        .finish(&mut store, issue_id)
        .await?;
    println!("Finished issue {} and removed {}", issue.id, issue.dir.display());
    Ok(())
}

pub async fn cmd_issue_add_repo(config: Option<&Path>, repository: &str, issue_id: &str) -> Result<()> {
    let mut store = load_store(config)?;
    let issue = IssueOrchestrator::default()
        .add_repository(&mut store, issue_id, repository)
        .await?;
    println!(
        "Added {} to issue {} (branch {})",
        repository, issue.id, issue.branch_name
    );
    Ok(())
}

pub fn cmd_workon(config: Option<&Path>, issue_id: &str) -> Result<()> {
    let store = load_store(config)?;
    let issue = store
        .get_issue(issue_id)
        .ok_or_else(|| IssueError::IssueNotFound {
            id: issue_id.to_string(),
        })?;

    let editor = store.settings().editor.clone();
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        bail!("No editor configured (set one with `issuectl config settings --editor <cmd>`)");
    };
    let status = std::process::Command::new(program)
        .args(parts)
        .arg(&issue.dir)
        .status()
        .with_context(|| format!("Failed to launch editor '{}'", editor))?;
    if !status.success() {
        bail!("Editor '{}' exited with {}", editor, status);
    }
    Ok(())
}

pub fn cmd_list(config: Option<&Path>) -> Result<()> {
    let store = load_store(config)?;
    let issues: Vec<_> = store.issues().collect();
    if issues.is_empty() {
        println!("No issues in progress.");
        return Ok(());
    }

    println!(
        "{:<12} {:<10} {:<30} {:<20} Directory",
        "Issue", "Profile", "Branch", "Repositories"
    );
    println!(
        "{:<12} {:<10} {:<30} {:<20} ---------",
        "-----", "-------", "------", "------------"
    );
    for issue in issues {
        println!(
            "{:<12} {:<10} {:<30} {:<20} {}",
            issue.id,
            issue.profile,
            issue.branch_name,
            issue.repositories.join(","),
            issue.dir.display()
        );
    }
    Ok(())
}
