//! Manifest and phase overlay resolution.

use std::path::PathBuf;
use std::sync::Arc;

use stackhook_config::{EnvironmentProvider, label_manifest, parse_project_config};
use stackhook_core::{Compiler, DeploymentIdentity, Error, Orchestrator, Result};
use tracing::{debug, info, warn};

use crate::workspace::{Workspace, Workspaces};

/// Declarative compose source, compiled on every deployment.
pub const COMPOSE_SOURCE: &str = "docker-compose.pkl";
/// Compose file handed to the orchestrator.
pub const COMPOSE_MANIFEST: &str = "docker-compose.yml";
/// Per-branch project configuration, read from the default branch.
pub const PROJECT_CONFIG_SOURCE: &str = "env.pkl";

/// A compose file ready for `up`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    /// Produced from [`COMPOSE_SOURCE`] rather than committed as-is.
    pub compiled: bool,
}

/// Turns a workspace into a validated manifest and optional phase overlay.
pub struct ConfigResolver {
    compiler: Arc<dyn Compiler>,
    orchestrator: Arc<dyn Orchestrator>,
    inject_labels: bool,
}

impl ConfigResolver {
    pub fn new(compiler: Arc<dyn Compiler>, orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            compiler,
            orchestrator,
            inject_labels: true,
        }
    }

    pub fn with_label_injection(mut self, enabled: bool) -> Self {
        self.inject_labels = enabled;
        self
    }

    /// Compile (or pick up) the workspace's compose manifest, label its
    /// services and have the orchestrator validate it.
    pub async fn resolve_manifest(
        &self,
        workspace: &Workspace,
        identity: &DeploymentIdentity,
    ) -> Result<Manifest> {
        let source = workspace.path().join(COMPOSE_SOURCE);
        let path = workspace.path().join(COMPOSE_MANIFEST);

        let compiled = if tokio::fs::try_exists(&source).await? {
            debug!(project = %identity.project_slug, "Compiling compose manifest");
            let yaml = self.compiler.compile(&source, &identity.branch).await?;
            tokio::fs::write(&path, yaml).await?;
            true
        } else if tokio::fs::try_exists(&path).await? {
            false
        } else {
            return Err(Error::ManifestNotFound(workspace.path().to_path_buf()));
        };

        if self.inject_labels {
            let content = tokio::fs::read_to_string(&path).await?;
            let labelled = label_manifest(&content, &identity.group())
                .map_err(|e| Error::ManifestInvalid(e.to_string()))?;
            tokio::fs::write(&path, labelled).await?;
        }

        self.orchestrator.validate(&path, workspace.path()).await?;
        Ok(Manifest { path, compiled })
    }

    /// Look up the phase for `branch` in the default branch's project config.
    ///
    /// The default branch is checked out into its own workspace, which is
    /// released before returning.
    pub async fn resolve_phase_overlay(
        &self,
        workspaces: &Workspaces,
        clone_url: &str,
        default_branch: &str,
        branch: &str,
        commit_sha: &str,
    ) -> Result<Option<EnvironmentProvider>> {
        let workspace = workspaces
            .acquire_default_branch(clone_url, default_branch, commit_sha)
            .await?;
        let result = self.read_overlay(&workspace, branch).await;
        if let Some(warning) = workspace.release().await {
            warn!(error = %warning, "Workspace cleanup failed");
        }
        result
    }

    async fn read_overlay(
        &self,
        workspace: &Workspace,
        branch: &str,
    ) -> Result<Option<EnvironmentProvider>> {
        let source = workspace.path().join(PROJECT_CONFIG_SOURCE);
        if !tokio::fs::try_exists(&source).await? {
            debug!(branch = %branch, "No project config on default branch");
            return Ok(None);
        }

        let yaml = self.compiler.compile(&source, branch).await?;
        let config = parse_project_config(&yaml)
            .map_err(|e| Error::Compile(format!("{}: {}", PROJECT_CONFIG_SOURCE, e)))?;
        let provider = config
            .for_branch(branch)
            .and_then(|b| b.environment.clone());
        if let Some(provider) = &provider {
            info!(branch = %branch, phase = %provider.value, "Resolved phase overlay");
        }
        Ok(provider)
    }
}
