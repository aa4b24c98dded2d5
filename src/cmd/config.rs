//! Configuration record commands: `issuectl config`.

use anyhow::{Result, bail};
use std::path::Path;

use issuectl::backend::{github, gitlab};
use issuectl::config::{
    BackendConfig, BackendKind, ConfigStore, GitHubConfig, GitLabConfig, GitUser, JiraConfig,
    Profile, Repository, encode_token,
};

use super::super::{
    BackendArgs, BackendCommands, BackendType, ConfigCommands, GitUserCommands, ProfileCommands,
    ProfileFields, RepoCommands,
};
use super::load_store;

pub fn cmd_config(config: Option<&Path>, command: ConfigCommands) -> Result<()> {
    let mut store = load_store(config)?;

    match command {
        ConfigCommands::Get => print!("{}", store.to_yaml()?),
        ConfigCommands::Settings {
            rollback_failed_start,
            editor,
        } => {
            let mut settings = store.settings().clone();
            let changed = rollback_failed_start.is_some() || editor.is_some();
            if let Some(rollback) = rollback_failed_start {
                settings.rollback_failed_start = rollback;
            }
            if let Some(editor) = editor {
                settings.editor = editor;
            }
            if changed {
                store.update_settings(settings.clone())?;
            }
            println!("rollbackFailedStart: {}", settings.rollback_failed_start);
            println!("editor: {}", settings.editor);
        }
        ConfigCommands::Repo { command } => cmd_repo(&mut store, command)?,
        ConfigCommands::Backend { command } => cmd_backend(&mut store, command)?,
        ConfigCommands::Gituser { command } => cmd_gituser(&mut store, command)?,
        ConfigCommands::Profile { command } => cmd_profile(&mut store, command)?,
    }
    Ok(())
}

fn report_delete(kind: &str, name: &str, removed: bool) {
    if removed {
        println!("Deleted {} '{}'", kind, name);
    } else {
        println!("No {} named '{}'", kind, name);
    }
}

fn cmd_repo(store: &mut ConfigStore, command: RepoCommands) -> Result<()> {
    match command {
        RepoCommands::List => {
            for repo in store.repositories() {
                println!("{:<20} {:<20} {}", repo.name, repo.owner, repo.url);
            }
        }
        RepoCommands::Add { name, owner, url } => {
            store.add_repository(Repository { name: name.clone(), owner, url })?;
            println!("Added repository '{}'", name);
        }
        RepoCommands::Update { name, owner, url } => {
            store.update_repository(Repository { name: name.clone(), owner, url })?;
            println!("Updated repository '{}'", name);
        }
        RepoCommands::Delete { name } => {
            let removed = store.delete_repository(&name)?;
            report_delete("repository", &name, removed);
        }
    }
    Ok(())
}

fn prompt_token(name: &str) -> Result<String> {
    use dialoguer::Password;

    let token = Password::new()
        .with_prompt(format!("Token for backend '{}'", name))
        .interact()?;
    Ok(token)
}

/// Build a backend record from command-line arguments.
fn backend_from_args(args: BackendArgs) -> Result<BackendConfig> {
    let token = match args.token {
        Some(token) => token,
        None => prompt_token(&args.name)?,
    };
    let token = encode_token(token.trim());

    let kind = match args.kind {
        BackendType::Github => {
            let Some(username) = args.username else {
                bail!("GitHub backends need --username");
            };
            BackendKind::GitHub(GitHubConfig {
                host: args
                    .host
                    .unwrap_or_else(|| github::DEFAULT_API_HOST.to_string()),
                token,
                username,
            })
        }
        BackendType::Gitlab => {
            let Some(user_id) = args.user_id else {
                bail!("GitLab backends need --user-id");
            };
            BackendKind::GitLab(GitLabConfig {
                host: args
                    .host
                    .unwrap_or_else(|| gitlab::DEFAULT_API_HOST.to_string()),
                token,
                user_id,
            })
        }
        BackendType::Jira => {
            let (Some(host), Some(username)) = (args.host, args.username) else {
                bail!("Jira backends need --host and --username");
            };
            BackendKind::Jira(JiraConfig {
                host,
                token,
                username,
            })
        }
    };
    Ok(BackendConfig {
        name: args.name,
        kind,
    })
}

fn cmd_backend(store: &mut ConfigStore, command: BackendCommands) -> Result<()> {
    match command {
        BackendCommands::List => {
            for backend in store.backends() {
                println!(
                    "{:<20} {:<8} {}",
                    backend.name,
                    backend.kind.type_name(),
                    backend.kind.host()
                );
            }
        }
        BackendCommands::Add(args) => {
            let backend = backend_from_args(args)?;
            let name = backend.name.clone();
            store.add_backend(backend)?;
            println!("Added backend '{}'", name);
        }
        BackendCommands::Update(args) => {
            let backend = backend_from_args(args)?;
            let name = backend.name.clone();
            store.update_backend(backend)?;
            println!("Updated backend '{}'", name);
        }
        BackendCommands::Delete { name } => {
            let removed = store.delete_backend(&name)?;
            report_delete("backend", &name, removed);
        }
    }
    Ok(())
}

fn cmd_gituser(store: &mut ConfigStore, command: GitUserCommands) -> Result<()> {
    match command {
        GitUserCommands::List => {
            for user in store.git_users() {
                println!(
                    "{:<20} {:<30} {}",
                    user.name,
                    user.email,
                    user.ssh_key_path.display()
                );
            }
        }
        GitUserCommands::Add {
            name,
            email,
            ssh_key_path,
        } => {
            store.add_git_user(GitUser {
                name: name.clone(),
                email,
                ssh_key_path,
            })?;
            println!("Added git user '{}'", name);
        }
        GitUserCommands::Update {
            name,
            email,
            ssh_key_path,
        } => {
            store.update_git_user(GitUser {
                name: name.clone(),
                email,
                ssh_key_path,
            })?;
            println!("Updated git user '{}'", name);
        }
        GitUserCommands::Delete { name } => {
            let removed = store.delete_git_user(&name)?;
            report_delete("git user", &name, removed);
        }
    }
    Ok(())
}

/// Copy the set fields onto `profile`, checking that each named record exists.
fn apply_profile_fields(
    store: &ConfigStore,
    profile: &mut Profile,
    fields: ProfileFields,
) -> Result<()> {
    for backend in [&fields.issue_backend, &fields.repo_backend]
        .into_iter()
        .flatten()
    {
        store.resolve_backend(backend)?;
    }
    if let Some(user) = &fields.git_user {
        store.resolve_git_user(user)?;
    }
    for repo in fields.default_repo.iter().chain(&fields.repos) {
        store.resolve_repository(repo)?;
    }

    if fields.issue_backend.is_some() {
        profile.issue_backend = fields.issue_backend;
    }
    if fields.repo_backend.is_some() {
        profile.repo_backend = fields.repo_backend;
    }
    if fields.git_user.is_some() {
        profile.git_user = fields.git_user;
    }
    if fields.default_repo.is_some() {
        profile.default_repository = fields.default_repo;
    }
    if !fields.repos.is_empty() {
        profile.repositories.clear();
        for repo in &fields.repos {
            profile.add_repository(repo);
        }
    }
    Ok(())
}

fn cmd_profile(store: &mut ConfigStore, command: ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::List => {
            let current = store.current_profile_name().map(str::to_string);
            for profile in store.profiles() {
                let marker = if current.as_deref() == Some(profile.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<16} {:<30} issues: {:<12} repos: {:<12} [{}]",
                    marker,
                    profile.name,
                    profile.work_dir.display(),
                    profile.issue_backend.as_deref().unwrap_or("-"),
                    profile.repo_backend.as_deref().unwrap_or("-"),
                    profile.repositories.join(", ")
                );
            }
        }
        ProfileCommands::Add {
            name,
            work_dir,
            fields,
        } => {
            let mut profile = Profile {
                name: name.clone(),
                work_dir,
                ..Default::default()
            };
            apply_profile_fields(store, &mut profile, fields)?;
            store.add_profile(profile)?;
            if store.current_profile_name().is_none() {
                store.use_profile(&name)?;
            }
            println!("Added profile '{}'", name);
        }
        ProfileCommands::Update {
            name,
            work_dir,
            fields,
        } => {
            let mut profile = store.resolve_profile(&name)?.clone();
            if let Some(work_dir) = work_dir {
                profile.work_dir = work_dir;
            }
            apply_profile_fields(store, &mut profile, fields)?;
            store.update_profile(profile)?;
            println!("Updated profile '{}'", name);
        }
        ProfileCommands::Delete { name } => {
            let removed = store.delete_profile(&name)?;
            report_delete("profile", &name, removed);
        }
        ProfileCommands::Use { name } => {
            store.use_profile(&name)?;
            println!("Using profile '{}'", name);
        }
        ProfileCommands::AddRepo {
            profile,
            repository,
        } => {
            store.resolve_repository(&repository)?;
            let mut record = store.resolve_profile(&profile)?.clone();
            if record.add_repository(&repository) {
                store.update_profile(record)?;
                println!("Added repository '{}' to profile '{}'", repository, profile);
            } else {
                println!("Profile '{}' already has repository '{}'", profile, repository);
            }
        }
    }
    Ok(())
}
