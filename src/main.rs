use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use issuectl::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "issuectl")]
#[command(
    version,
    about = "Work on issues in isolated directories across trackers, repo hosts and local clones"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    /// Path to the config file [default: ~/.issuerc]
    #[arg(long, env = "ISSUECTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactively create a first configuration
    Init,
    /// Start working on an issue: create its directory, clone repositories
    /// and check out the issue branch
    Start {
        issue_id: String,
        #[command(flatten)]
        overrides: OverrideArgs,
        /// Custom name appended to the directory and branch; skips the tracker title lookup
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Open a pull/merge request for an issue
    Openpr {
        /// Defaults to the issue of the current directory
        issue_id: Option<String>,
        /// Request title [default: "<id> | <issue name>"]
        title: Option<String>,
    },
    /// Close the issue and remove its directory
    Finish { issue_id: String },
    /// Open the issue directory in the configured editor
    Workon { issue_id: String },
    /// List issues in progress
    List,
    /// Manage issues in progress
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },
    /// Manage configuration records
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Per-invocation profile overrides; never saved.
#[derive(Args, Clone, Debug, Default)]
pub struct OverrideArgs {
    /// Additional repositories to clone (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    pub repos: Vec<String>,
    /// Profile to use instead of the current one
    #[arg(short, long)]
    pub profile: Option<String>,
    #[arg(long)]
    pub issue_backend: Option<String>,
    #[arg(long)]
    pub repo_backend: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum IssueCommands {
    /// Clone another repository into an issue and check out its branch
    AddRepo { repository: String, issue_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the whole configuration
    Get,
    /// Show or change settings
    Settings {
        #[arg(long)]
        rollback_failed_start: Option<bool>,
        #[arg(long)]
        editor: Option<String>,
    },
    /// Manage repositories
    #[command(alias = "repository")]
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Manage tracker and repository host backends
    Backend {
        #[command(subcommand)]
        command: BackendCommands,
    },
    /// Manage git identities
    Gituser {
        #[command(subcommand)]
        command: GitUserCommands,
    },
    /// Manage profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum RepoCommands {
    List,
    Add { name: String, owner: String, url: String },
    Update { name: String, owner: String, url: String },
    Delete { name: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendType {
    Github,
    Gitlab,
    Jira,
}

#[derive(Args, Clone, Debug)]
pub struct BackendArgs {
    pub name: String,
    #[arg(long = "type", value_enum)]
    pub kind: BackendType,
    /// API base URL (GitHub/GitLab) or site URL (Jira)
    #[arg(long)]
    pub host: Option<String>,
    /// Plaintext token; prompted for when omitted
    #[arg(long, env = "ISSUECTL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// GitHub login or Jira account e-mail
    #[arg(long)]
    pub username: Option<String>,
    /// GitLab numeric user id
    #[arg(long)]
    pub user_id: Option<u64>,
}

#[derive(Subcommand, Clone)]
pub enum BackendCommands {
    List,
    Add(BackendArgs),
    Update(BackendArgs),
    Delete { name: String },
}

#[derive(Subcommand, Clone)]
pub enum GitUserCommands {
    List,
    Add {
        name: String,
        email: String,
        ssh_key_path: PathBuf,
    },
    Update {
        name: String,
        email: String,
        ssh_key_path: PathBuf,
    },
    Delete { name: String },
}

#[derive(Args, Clone, Debug, Default)]
pub struct ProfileFields {
    #[arg(long)]
    pub issue_backend: Option<String>,
    #[arg(long)]
    pub repo_backend: Option<String>,
    #[arg(long)]
    pub git_user: Option<String>,
    #[arg(long)]
    pub default_repo: Option<String>,
    /// Repositories cloned for every issue (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub repos: Vec<String>,
}

#[derive(Subcommand, Clone)]
pub enum ProfileCommands {
    List,
    Add {
        name: String,
        work_dir: PathBuf,
        #[command(flatten)]
        fields: ProfileFields,
    },
    Update {
        name: String,
        #[arg(long)]
        work_dir: Option<PathBuf>,
        #[command(flatten)]
        fields: ProfileFields,
    },
    Delete { name: String },
    /// Make a profile the current one
    Use { name: String },
    /// Append a repository to a profile
    AddRepo { profile: String, repository: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);
    let config_path = cli.config.clone();

    match &cli.command {
        Commands::Init => cmd::cmd_init(config_path.as_deref())?,
        Commands::Start {
            issue_id,
            overrides,
            name,
        } => {
            cmd::cmd_start(config_path.as_deref(), issue_id, overrides, name.as_deref()).await?
        }
        Commands::Openpr { issue_id, title } => {
            cmd::cmd_openpr(config_path.as_deref(), issue_id.as_deref(), title.as_deref()).await?
        }
        Commands::Finish { issue_id } => cmd::cmd_finish(config_path.as_deref(), issue_id).await?,
        Commands::Workon { issue_id } => cmd::cmd_workon(config_path.as_deref(), issue_id)?,
        Commands::List => cmd::cmd_list(config_path.as_deref())?,
        Commands::Issue { command } => match command {
            IssueCommands::AddRepo {
                repository,
                issue_id,
            } => cmd::cmd_issue_add_repo(config_path.as_deref(), repository, issue_id).await?,
        },
        Commands::Config { command } => cmd::cmd_config(config_path.as_deref(), command.clone())?,
    }

    Ok(())
}
