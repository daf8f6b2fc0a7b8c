//! Lifecycle orchestrator - brings branch deployments up and tears them down.

use std::sync::Arc;

use serde::Serialize;
use stackhook_core::{
    DeploymentIdentity, DeploymentRequest, Error, EventKind, Orchestrator, ResourceFilter,
    ResourceKind, Result, UpSpec,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::locks::IdentityLocks;
use crate::queue::RequestQueues;
use crate::resolve::ConfigResolver;
use crate::secrets::SecretResolver;
use crate::workspace::{Workspace, Workspaces};

/// Environment variable carrying the resolved phase.
pub const PHASE_ENV: &str = "STACKHOOK_PHASE";

/// Result of handling one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Deployed {
        project: String,
        phase: Option<String>,
    },
    TornDown {
        project: String,
        removed: TeardownReport,
    },
    Skipped {
        reason: String,
    },
}

/// Resources affected by a teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub stopped_containers: usize,
    pub removed_containers: usize,
    pub networks: usize,
    pub volumes: usize,
}

/// Serializes up/down per identity and drives the tools through them.
pub struct LifecycleOrchestrator {
    workspaces: Workspaces,
    config: ConfigResolver,
    secrets: SecretResolver,
    orchestrator: Arc<dyn Orchestrator>,
    locks: IdentityLocks,
    queues: RequestQueues,
}

impl LifecycleOrchestrator {
    pub fn new(
        workspaces: Workspaces,
        config: ConfigResolver,
        secrets: SecretResolver,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Self {
        Self {
            workspaces,
            config,
            secrets,
            orchestrator,
            locks: IdentityLocks::new(),
            queues: RequestQueues::new(),
        }
    }

    pub fn secrets(&self) -> &SecretResolver {
        &self.secrets
    }

    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    /// Queue `request` behind earlier requests for the same identity and
    /// return immediately. Handled in the background, in arrival order.
    pub fn enqueue(self: &Arc<Self>, request: DeploymentRequest) {
        if let Some(rx) = self.queues.push(request) {
            tokio::spawn(self.clone().drain(rx));
        }
    }

    async fn drain(self: Arc<Self>, mut rx: UnboundedReceiver<DeploymentRequest>) {
        while let Some(request) = rx.recv().await {
            debug!(request_id = %request.id, "Dequeued request");
            // Outcome is logged by handle.
            let _ = self.handle(&request).await;
        }
    }

    /// Dispatch a request by event kind, logging the outcome.
    pub async fn handle(&self, request: &DeploymentRequest) -> Result<Outcome> {
        let identity = request.identity();
        let result = match request.kind {
            EventKind::BranchDelete => self.down(&identity).await,
            EventKind::BranchCreate if request.commit_sha.is_empty() => Ok(Outcome::Skipped {
                reason: "branch created without a commit".to_string(),
            }),
            EventKind::Push | EventKind::BranchCreate => self.up(request).await,
        };

        match &result {
            Ok(outcome) => info!(
                request_id = %request.id,
                event = %request.kind,
                project = %identity.project_slug,
                branch = %identity.branch,
                ?outcome,
                "Request handled"
            ),
            Err(e) => error!(
                request_id = %request.id,
                event = %request.kind,
                project = %identity.project_slug,
                branch = %identity.branch,
                transient = e.is_transient(),
                error = %e,
                "Request failed"
            ),
        }
        result
    }

    /// Check out, resolve and apply the deployment for `request`.
    pub async fn up(&self, request: &DeploymentRequest) -> Result<Outcome> {
        let identity = request.identity();
        let _guard = self.locks.acquire(&identity.composite_hash).await;

        info!(
            request_id = %request.id,
            project = %identity.project_slug,
            branch = %identity.branch,
            commit = %request.commit_sha,
            "Deploying"
        );

        let workspace = self
            .workspaces
            .acquire(&request.clone_url, &identity.branch, &request.commit_sha)
            .await?;
        let result = self.deploy(request, &identity, &workspace).await;
        if let Some(warning) = workspace.release().await {
            warn!(project = %identity.project_slug, error = %warning, "Workspace cleanup failed");
        }
        result
    }

    async fn deploy(
        &self,
        request: &DeploymentRequest,
        identity: &DeploymentIdentity,
        workspace: &Workspace,
    ) -> Result<Outcome> {
        let manifest = match self.config.resolve_manifest(workspace, identity).await {
            Err(Error::ManifestNotFound(_)) => {
                info!(project = %identity.project_slug, "No compose manifest, skipping");
                return Ok(Outcome::Skipped {
                    reason: "no compose manifest".to_string(),
                });
            }
            other => other?,
        };

        let phase = match &request.default_branch {
            Some(default_branch) => {
                self.config
                    .resolve_phase_overlay(
                        &self.workspaces,
                        &request.clone_url,
                        default_branch,
                        &identity.branch,
                        &request.commit_sha,
                    )
                    .await?
            }
            None => None,
        };

        let mut env = self.secrets.resolve_secrets(identity).await?;
        if let Some(phase) = &phase {
            env.insert(PHASE_ENV, &phase.value)?;
        }

        self.orchestrator
            .up(&UpSpec {
                project_name: identity.project_slug.clone(),
                project_dir: workspace.path().to_path_buf(),
                manifest: manifest.path,
                env,
            })
            .await?;

        info!(project = %identity.project_slug, "Deployment is up");
        Ok(Outcome::Deployed {
            project: identity.project_slug.clone(),
            phase: phase.map(|p| p.value),
        })
    }

    /// Remove everything the orchestrator holds for `identity`.
    ///
    /// Steps run in order (stop running containers, remove containers,
    /// networks, volumes) and the first failure aborts the rest.
    pub async fn down(&self, identity: &DeploymentIdentity) -> Result<Outcome> {
        let _guard = self.locks.acquire(&identity.composite_hash).await;
        info!(project = %identity.project_slug, branch = %identity.branch, "Tearing down");

        let filter = ResourceFilter::for_identity(identity);
        let mut report = TeardownReport::default();

        let running = self
            .orchestrator
            .list(ResourceKind::Container, &filter, false)
            .await?;
        if !running.is_empty() {
            self.orchestrator.stop(&running).await?;
            report.stopped_containers = running.len();
        }

        report.removed_containers = self.sweep(ResourceKind::Container, &filter).await?;
        report.networks = self.sweep(ResourceKind::Network, &filter).await?;
        report.volumes = self.sweep(ResourceKind::Volume, &filter).await?;

        info!(
            project = %identity.project_slug,
            containers = report.removed_containers,
            networks = report.networks,
            volumes = report.volumes,
            "Teardown complete"
        );
        Ok(Outcome::TornDown {
            project: identity.project_slug.clone(),
            removed: report,
        })
    }

    async fn sweep(&self, kind: ResourceKind, filter: &ResourceFilter) -> Result<usize> {
        let ids = self.orchestrator.list(kind, filter, true).await?;
        if !ids.is_empty() {
            self.orchestrator.remove(kind, &ids).await?;
        }
        Ok(ids.len())
    }
}
