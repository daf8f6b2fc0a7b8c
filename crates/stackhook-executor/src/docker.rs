//! Docker orchestrator backend.
//!
//! Manifests are validated and applied with the `docker compose` CLI.
//! Teardown talks to the Engine API directly so listing, stopping and
//! removal can be driven resource by resource.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{ListContainersOptions, RemoveContainerOptions};
use bollard::models::{ContainerSummary, Network, Volume};
use bollard::network::ListNetworksOptions;
use bollard::volume::ListVolumesOptions;
use stackhook_core::{
    COMPOSE_PROJECT_LABEL, Error, Orchestrator, ResourceFilter, ResourceKind, Result, SecretEnv,
    UpSpec,
};
use tokio::process::Command;
use tracing::{debug, info};

use crate::process::run;

/// Host variables passed through to `docker compose`; everything else
/// comes from the deployment's secret environment.
const INHERITED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "DOCKER_HOST",
    "DOCKER_CONFIG",
    "DOCKER_CONTEXT",
    "DOCKER_CERT_PATH",
    "DOCKER_TLS_VERIFY",
    "XDG_RUNTIME_DIR",
];

/// Upper bounds for orchestrator calls.
#[derive(Debug, Clone, Copy)]
pub struct DockerTimeouts {
    pub validate: Duration,
    pub up: Duration,
    pub down: Duration,
}

impl Default for DockerTimeouts {
    fn default() -> Self {
        Self {
            validate: Duration::from_secs(120),
            up: Duration::from_secs(1800),
            down: Duration::from_secs(300),
        }
    }
}

/// Compose-on-Docker orchestrator.
pub struct DockerOrchestrator {
    docker: Docker,
    docker_bin: String,
    timeouts: DockerTimeouts,
}

impl DockerOrchestrator {
    /// Connect to the local Docker daemon.
    pub fn new(docker_bin: impl Into<String>, timeouts: DockerTimeouts) -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self::with_client(docker, docker_bin, timeouts))
    }

    /// Create with a custom Docker client.
    pub fn with_client(
        docker: Docker,
        docker_bin: impl Into<String>,
        timeouts: DockerTimeouts,
    ) -> Self {
        Self {
            docker,
            docker_bin: docker_bin.into(),
            timeouts,
        }
    }

    fn compose(&self, project_dir: &Path, manifest: &Path, project_name: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(compose_args(project_dir, manifest, project_name))
            .current_dir(project_dir);
        cmd
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(self.timeouts.down, fut).await {
            Ok(result) => result.map_err(|e| Error::Orchestrator(format!("{}: {}", op, e))),
            Err(_) => Err(Error::Timeout {
                command: format!("docker {}", op),
                after: self.timeouts.down,
            }),
        }
    }
}

#[async_trait]
impl Orchestrator for DockerOrchestrator {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn validate(&self, manifest: &Path, project_dir: &Path) -> Result<()> {
        let mut cmd = self.compose(project_dir, manifest, None);
        cmd.args(["config", "--quiet"]);
        run(&mut cmd, "docker compose config", self.timeouts.validate)
            .await
            .map_err(|e| e.into_error(Error::ManifestInvalid))?;
        Ok(())
    }

    async fn up(&self, spec: &UpSpec) -> Result<()> {
        let mut cmd = self.compose(&spec.project_dir, &spec.manifest, Some(&spec.project_name));
        cmd.args(["up", "--quiet-pull", "--detach", "--build", "--remove-orphans"])
            .env_clear()
            .envs(compose_env(inherited_env(), &spec.env));

        info!(project = %spec.project_name, secrets = spec.env.len(), "Running docker compose up");
        let output = run(&mut cmd, "docker compose up", self.timeouts.up)
            .await
            .map_err(|e| e.into_error(Error::Orchestrator))?;
        debug!(
            project = %spec.project_name,
            output = %String::from_utf8_lossy(&output.stdout).trim(),
            "docker compose up finished"
        );
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        include_stopped: bool,
    ) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        for filters in engine_filters(filter) {
            let found = match kind {
                ResourceKind::Container => {
                    let options = ListContainersOptions::<String> {
                        all: include_stopped,
                        filters,
                        ..Default::default()
                    };
                    let containers = self
                        .bounded("list containers", self.docker.list_containers(Some(options)))
                        .await?;
                    matching_containers(containers, filter)
                }
                ResourceKind::Network => {
                    let options = ListNetworksOptions::<String> { filters };
                    let networks = self
                        .bounded("list networks", self.docker.list_networks(Some(options)))
                        .await?;
                    matching_networks(networks, filter)
                }
                ResourceKind::Volume => {
                    let options = ListVolumesOptions::<String> { filters };
                    let response = self
                        .bounded("list volumes", self.docker.list_volumes(Some(options)))
                        .await?;
                    matching_volumes(response.volumes.unwrap_or_default(), filter)
                }
            };
            for id in found {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        debug!(kind = %kind, count = ids.len(), "Listed resources");
        Ok(ids)
    }

    async fn stop(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            let stop = async {
                match self.docker.stop_container(id, None).await {
                    Err(e) if is_not_modified(&e) => Ok(()),
                    other => other,
                }
            };
            self.bounded("stop container", stop).await?;
        }
        Ok(())
    }

    async fn remove(&self, kind: ResourceKind, ids: &[String]) -> Result<()> {
        for id in ids {
            match kind {
                ResourceKind::Container => {
                    let options = RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    };
                    self.bounded(
                        "remove container",
                        self.docker.remove_container(id, Some(options)),
                    )
                    .await?
                }
                ResourceKind::Network => {
                    self.bounded("remove network", self.docker.remove_network(id))
                        .await?
                }
                ResourceKind::Volume => {
                    self.bounded("remove volume", self.docker.remove_volume(id, None))
                        .await?
                }
            }
        }
        Ok(())
    }
}

fn compose_args(project_dir: &Path, manifest: &Path, project_name: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "compose".to_string(),
        "--project-directory".to_string(),
        project_dir.to_string_lossy().into_owned(),
        "--file".to_string(),
        manifest.to_string_lossy().into_owned(),
    ];
    if let Some(name) = project_name {
        args.push("--project-name".to_string());
        args.push(name.to_string());
    }
    args
}

fn inherited_env() -> impl Iterator<Item = (String, String)> {
    INHERITED_ENV
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
}

/// Allowlisted host variables overlaid with the deployment's secrets.
fn compose_env(
    inherited: impl Iterator<Item = (String, String)>,
    secrets: &SecretEnv,
) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = inherited
        .filter(|(key, _)| secrets.get(key).is_none())
        .collect();
    env.extend(secrets.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    env
}

/// Engine-side queries, one per selector. The engine ANDs the keys of a
/// single query, so the label and the legacy name prefix are asked apart.
fn engine_filters(filter: &ResourceFilter) -> Vec<HashMap<String, Vec<String>>> {
    let mut queries = vec![HashMap::from([(
        "label".to_string(),
        vec![format!("{}={}", COMPOSE_PROJECT_LABEL, filter.project)],
    )])];
    if let Some(prefix) = &filter.legacy_prefix {
        queries.push(HashMap::from([("name".to_string(), vec![prefix.clone()])]));
    }
    queries
}

/// The engine answers 304 when the container has already stopped.
fn is_not_modified(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

fn project_label(labels: Option<&HashMap<String, String>>) -> Option<&str> {
    labels
        .and_then(|labels| labels.get(COMPOSE_PROJECT_LABEL))
        .map(String::as_str)
}

fn matching_containers(containers: Vec<ContainerSummary>, filter: &ResourceFilter) -> Vec<String> {
    containers
        .into_iter()
        .filter(|c| {
            let label = project_label(c.labels.as_ref());
            c.names
                .as_ref()
                .is_some_and(|names| names.iter().any(|n| filter.matches(n, label)))
        })
        .filter_map(|c| c.id)
        .collect()
}

fn matching_networks(networks: Vec<Network>, filter: &ResourceFilter) -> Vec<String> {
    networks
        .into_iter()
        .filter(|n| {
            n.name
                .as_deref()
                .is_some_and(|name| filter.matches(name, project_label(n.labels.as_ref())))
        })
        .filter_map(|n| n.id)
        .collect()
}

fn matching_volumes(volumes: Vec<Volume>, filter: &ResourceFilter) -> Vec<String> {
    volumes
        .into_iter()
        .filter(|v| filter.matches(&v.name, project_label(Some(&v.labels))))
        .map(|v| v.name)
        .collect()
}
