//! Local deploy and teardown, bypassing the webhook server.

use anyhow::{Context, Result};
use stackhook_api::build_lifecycle;
use stackhook_config::ServerConfig;
use stackhook_core::{DeploymentIdentity, DeploymentRequest, EventKind};

pub async fn up(
    config: &ServerConfig,
    clone_url: &str,
    git_ref: &str,
    sha: &str,
    repository: &str,
    default_branch: Option<String>,
) -> Result<()> {
    tokio::fs::create_dir_all(&config.cache_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.cache_dir.display()))?;
    let lifecycle = build_lifecycle(config).context("Failed to connect to Docker")?;

    let mut request = DeploymentRequest::new(EventKind::Push, clone_url, git_ref, sha, repository);
    if let Some(branch) = default_branch {
        request = request.with_default_branch(branch);
    }

    let outcome = lifecycle.up(&request).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn down(
    config: &ServerConfig,
    clone_url: &str,
    git_ref: &str,
    repository: &str,
) -> Result<()> {
    let lifecycle = build_lifecycle(config).context("Failed to connect to Docker")?;
    let identity = DeploymentIdentity::derive(clone_url, git_ref, repository);

    let outcome = lifecycle.down(&identity).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
