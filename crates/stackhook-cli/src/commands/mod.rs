//! CLI command implementations.

pub mod deploy;
pub mod secrets;

use std::path::Path;

use anyhow::{Context, Result};
use stackhook_config::{ServerConfig, load_server_config};
use stackhook_core::DeploymentIdentity;

/// Load the server config, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    match path {
        Some(path) => load_server_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

pub fn identity(clone_url: &str, git_ref: &str, repository: &str) -> Result<()> {
    let identity = DeploymentIdentity::derive(clone_url, git_ref, repository);
    println!("{}", serde_json::to_string_pretty(&identity)?);
    Ok(())
}

pub fn check_config(path: &Path) -> Result<()> {
    match load_server_config(path) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("  listen:      {}", config.listen);
            println!("  cache dir:   {}", config.cache_dir.display());
            println!("  secrets dir: {}", config.secrets_dir.display());
            println!(
                "  webhooks:    {}",
                if config.webhook_secret.is_some() {
                    "signed"
                } else {
                    "unsigned"
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
