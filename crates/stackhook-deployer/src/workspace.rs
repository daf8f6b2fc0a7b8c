//! Per-operation checkout directories.
//!
//! Every acquisition gets its own directory, so two branches deploying
//! the same commit never share or remove each other's checkout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stackhook_core::{Checkout, CleanupWarning, Result};
use tracing::{debug, warn};

/// Creates workspaces under a cache directory.
pub struct Workspaces {
    cache_dir: PathBuf,
    checkout: Arc<dyn Checkout>,
}

impl Workspaces {
    pub fn new(cache_dir: impl Into<PathBuf>, checkout: Arc<dyn Checkout>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            checkout,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Shallow checkout of `branch` at `commit_sha` into
    /// `<cache>/<commit_sha>-<unique>`.
    pub async fn acquire(&self, clone_url: &str, branch: &str, commit_sha: &str) -> Result<Workspace> {
        let dir = self.cache_dir.join(workspace_name(commit_sha, None));
        self.checkout_into(dir, clone_url, branch, commit_sha).await
    }

    /// Shallow checkout of the default branch tip into
    /// `<cache>/<commit_sha>-<default_branch>-<unique>`.
    pub async fn acquire_default_branch(
        &self,
        clone_url: &str,
        default_branch: &str,
        commit_sha: &str,
    ) -> Result<Workspace> {
        let dir = self
            .cache_dir
            .join(workspace_name(commit_sha, Some(default_branch)));
        self.checkout_into(dir, clone_url, default_branch, "").await
    }

    async fn checkout_into(
        &self,
        dir: PathBuf,
        clone_url: &str,
        branch: &str,
        commit_sha: &str,
    ) -> Result<Workspace> {
        // Owned from here on so a partial clone is removed on failure.
        let workspace = Workspace::new(dir);
        self.checkout
            .checkout(clone_url, branch, commit_sha, workspace.path(), true)
            .await?;
        Ok(workspace)
    }
}

fn workspace_name(commit_sha: &str, default_branch: Option<&str>) -> String {
    let mut name = if commit_sha.is_empty() {
        "head".to_string()
    } else {
        commit_sha.to_string()
    };
    if let Some(branch) = default_branch {
        name.push('-');
        name.push_str(&branch.replace('/', "-"));
    }
    format!("{}-{}", name, uuid::Uuid::new_v4().simple())
}

/// A checkout directory, removed when released or dropped.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now.
    pub async fn release(mut self) -> Option<CleanupWarning> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => Some(CleanupWarning {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                let warning = CleanupWarning {
                    path: self.path.clone(),
                    source,
                };
                warn!(error = %warning, "Workspace cleanup failed");
            }
        }
    }
}
