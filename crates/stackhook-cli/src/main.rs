//! stackhook operator CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stackhook")]
#[command(about = "Operate stackhook deployments by hand", long_about = None)]
#[command(version)]
struct Cli {
    /// Server configuration file (KDL)
    #[arg(long, global = true, env = "STACKHOOK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identity derived for a clone URL and ref
    Identity {
        clone_url: String,
        /// Git ref or bare branch name
        git_ref: String,
        /// Repository full name (owner/name)
        #[arg(long, default_value = "")]
        repository: String,
    },
    /// Deploy one commit
    Up {
        clone_url: String,
        git_ref: String,
        sha: String,
        #[arg(long, default_value = "")]
        repository: String,
        /// Default branch holding env.pkl
        #[arg(long)]
        default_branch: Option<String>,
    },
    /// Tear down a branch deployment
    Down {
        clone_url: String,
        git_ref: String,
        #[arg(long, default_value = "")]
        repository: String,
    },
    /// Validate a server configuration file
    CheckConfig {
        #[arg(default_value = "stackhook.kdl")]
        path: PathBuf,
    },
    /// Upload a repository's secrets.pkl to a running server
    UploadSecret {
        clone_url: String,
        file: PathBuf,
        /// Server URL
        #[arg(long, env = "STACKHOOK_API_URL", default_value = "http://localhost:8080")]
        api_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Identity {
            clone_url,
            git_ref,
            repository,
        } => {
            commands::identity(&clone_url, &git_ref, &repository)?;
        }
        Commands::Up {
            clone_url,
            git_ref,
            sha,
            repository,
            default_branch,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::deploy::up(
                &config,
                &clone_url,
                &git_ref,
                &sha,
                &repository,
                default_branch,
            )
            .await?;
        }
        Commands::Down {
            clone_url,
            git_ref,
            repository,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::deploy::down(&config, &clone_url, &git_ref, &repository).await?;
        }
        Commands::CheckConfig { path } => {
            commands::check_config(&path)?;
        }
        Commands::UploadSecret {
            clone_url,
            file,
            api_url,
        } => {
            commands::secrets::upload(&api_url, &clone_url, &file).await?;
        }
    }

    Ok(())
}
