//! First-run setup wizard: `issuectl init`.

use anyhow::{Result, bail};
use dialoguer::{Confirm, Input, Password, Select, theme::ColorfulTheme};
use std::path::{Path, PathBuf};

use issuectl::backend::{github, gitlab};
use issuectl::config::{
    BackendConfig, BackendKind, ConfigStore, GitHubConfig, GitLabConfig, GitUser, IssuectlConfig,
    JiraConfig, Profile, Repository, encode_token,
};
use issuectl::errors::ConfigError;

use super::config_path;

/// Name of the profile the wizard creates.
pub const DEFAULT_PROFILE: &str = "default";

/// Everything the wizard asks for.
#[derive(Debug, Clone)]
pub struct InitAnswers {
    pub git_user: GitUser,
    pub repository: Repository,
    pub work_dir: PathBuf,
    pub backend: Option<BackendConfig>,
}

/// Turn wizard answers into a store with a current `default` profile.
pub fn build_config(answers: InitAnswers) -> Result<ConfigStore, ConfigError> {
    let mut store = ConfigStore::in_memory_from(IssuectlConfig::default());
    let backend_name = answers.backend.as_ref().map(|b| b.name.clone());
    let repo_name = answers.repository.name.clone();

    let mut profile = Profile {
        name: DEFAULT_PROFILE.to_string(),
        work_dir: answers.work_dir,
        git_user: Some(answers.git_user.name.clone()),
        default_repository: Some(repo_name.clone()),
        ..Default::default()
    };
    profile.add_repository(&repo_name);

    if let Some(backend) = answers.backend {
        let hosts_code = !matches!(backend.kind, BackendKind::Jira(_));
        profile.issue_backend = backend_name.clone();
        if hosts_code {
            profile.repo_backend = backend_name;
        }
        store.add_backend(backend)?;
    }
    store.add_git_user(answers.git_user)?;
    store.add_repository(answers.repository)?;
    store.add_profile(profile)?;
    store.use_profile(DEFAULT_PROFILE)?;
    Ok(store)
}

fn ask(theme: &ColorfulTheme, prompt: &str, default: Option<String>) -> Result<String> {
    let mut input = Input::<String>::with_theme(theme).with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default);
    }
    Ok(input.interact_text()?)
}

fn ask_backend(theme: &ColorfulTheme) -> Result<Option<BackendConfig>> {
    let wanted = Confirm::with_theme(theme)
        .with_prompt("Configure an issue tracker / repository host?")
        .default(true)
        .interact()?;
    if !wanted {
        return Ok(None);
    }

    let kinds = ["github", "gitlab", "jira"];
    let choice = Select::with_theme(theme)
        .with_prompt("Backend type")
        .items(&kinds)
        .default(0)
        .interact()?;
    let name = ask(theme, "Backend name", Some(kinds[choice].to_string()))?;
    let token = encode_token(
        Password::with_theme(theme)
            .with_prompt("API token")
            .interact()?
            .trim(),
    );

    let kind = match kinds[choice] {
        "github" => BackendKind::GitHub(GitHubConfig {
            host: ask(theme, "API URL", Some(github::DEFAULT_API_HOST.to_string()))?,
            token,
            username: ask(theme, "GitHub username", None)?,
        }),
        "gitlab" => BackendKind::GitLab(GitLabConfig {
            host: ask(theme, "API URL", Some(gitlab::DEFAULT_API_HOST.to_string()))?,
            token,
            user_id: Input::<u64>::with_theme(theme)
                .with_prompt("GitLab user id")
                .interact_text()?,
        }),
        _ => BackendKind::Jira(JiraConfig {
            host: ask(theme, "Jira site URL (e.g. https://acme.atlassian.net)", None)?,
            token,
            username: ask(theme, "Jira account e-mail", None)?,
        }),
    };
    Ok(Some(BackendConfig { name, kind }))
}

pub fn cmd_init(config: Option<&Path>) -> Result<()> {
    let path = config_path(config)?;
    if path.exists() {
        bail!(
            "Config already exists at {}. Use `issuectl config` to change it.",
            path.display()
        );
    }

    let theme = ColorfulTheme::default();
    let home = dirs::home_dir().unwrap_or_default();

    println!();
    println!("Git identity");
    let git_user = GitUser {
        name: ask(&theme, "Name", None)?,
        email: ask(&theme, "E-mail", None)?,
        ssh_key_path: PathBuf::from(ask(
            &theme,
            "SSH private key",
            Some(home.join(".ssh").join("id_ed25519").display().to_string()),
        )?),
    };

    println!();
    println!("Repository");
    let owner = ask(&theme, "Owner (user or organisation)", None)?;
    let name = ask(&theme, "Repository name", None)?;
    let url = ask(
        &theme,
        "Clone URL",
        Some(format!("git@github.com:{}/{}.git", owner, name)),
    )?;
    let repository = Repository { name, owner, url };

    println!();
    let work_dir = PathBuf::from(ask(
        &theme,
        "Directory for issue workspaces",
        Some(home.join("issues").display().to_string()),
    )?);
    let backend = ask_backend(&theme)?;

    let store = build_config(InitAnswers {
        git_user,
        repository,
        work_dir,
        backend,
    })?
    .into_persistent(&path);
    store.save()?;

    println!();
    println!("Wrote {} with profile '{}'.", path.display(), DEFAULT_PROFILE);
    println!("Start working on an issue with `issuectl start <issue-id>`.");
    Ok(())
}
