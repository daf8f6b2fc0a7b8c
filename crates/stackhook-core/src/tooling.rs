//! Capability traits for the external tools stackhook drives.
//!
//! Source control, the config compiler and the container orchestrator are
//! all side-effecting processes. The lifecycle code only talks to them
//! through these traits so it can be exercised against fakes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::identity::DeploymentIdentity;
use crate::secret::SecretEnv;
use crate::Result;

/// Fetches repository contents into a local directory.
#[async_trait]
pub trait Checkout: Send + Sync {
    /// Check out `branch` into `dest`, pinned to `commit_sha` when it is not
    /// empty. `dest` must not exist yet.
    async fn checkout(
        &self,
        clone_url: &str,
        branch: &str,
        commit_sha: &str,
        dest: &Path,
        shallow: bool,
    ) -> Result<()>;
}

/// Turns a declarative config source into YAML.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Evaluate `source` with the `branch` property set and return YAML.
    async fn compile(&self, source: &Path, branch: &str) -> Result<Vec<u8>>;
}

/// Kind of orchestrator-managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[display("container")]
    Container,
    #[display("network")]
    Network,
    #[display("volume")]
    Volume,
}

/// Label compose puts on every container, network and volume it creates.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Selects the resources of one compose project.
///
/// Resources are matched exactly on [`COMPOSE_PROJECT_LABEL`]. Stacks from
/// the hash-named project scheme are also matched by name prefix: compose
/// names resources `<project>-<service>-<n>` and `<project>_<name>`, and a
/// 64-character hash cannot be the start of another project's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub project: String,
    pub legacy_prefix: Option<String>,
}

impl ResourceFilter {
    /// Exactly one compose project.
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            legacy_prefix: None,
        }
    }

    /// The identity's project, plus its stack from the hash-named scheme.
    pub fn for_identity(identity: &DeploymentIdentity) -> Self {
        Self {
            project: identity.project_slug.clone(),
            legacy_prefix: Some(identity.composite_hash.to_string()),
        }
    }

    /// `project_label` is the resource's [`COMPOSE_PROJECT_LABEL`] value.
    pub fn matches(&self, name: &str, project_label: Option<&str>) -> bool {
        let Some(prefix) = self.legacy_prefix.as_deref() else {
            return project_label == Some(self.project.as_str());
        };
        if project_label.is_some_and(|label| label == self.project || label == prefix) {
            return true;
        }
        name.trim_start_matches('/')
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_'))
    }
}

/// Everything needed to reconcile one compose project.
#[derive(Debug, Clone)]
pub struct UpSpec {
    pub project_name: String,
    pub project_dir: PathBuf,
    pub manifest: PathBuf,
    pub env: SecretEnv,
}

/// The container orchestrator.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// Ask the orchestrator whether it accepts `manifest`.
    async fn validate(&self, manifest: &Path, project_dir: &Path) -> Result<()>;

    /// Bring the project in line with its manifest, detached.
    async fn up(&self, spec: &UpSpec) -> Result<()>;

    /// Ids of resources of `kind` selected by `filter`. Containers are
    /// limited to running ones unless `include_stopped` is set.
    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        include_stopped: bool,
    ) -> Result<Vec<String>>;

    /// Stop containers.
    async fn stop(&self, ids: &[String]) -> Result<()>;

    /// Remove resources.
    async fn remove(&self, kind: ResourceKind, ids: &[String]) -> Result<()>;
}
