//! Inbound deployment requests.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{BRANCH_REF_PREFIX, DeploymentIdentity, branch_from_ref};

/// Correlation id attached to every request.
/// Uses UUIDv7 so ids sort by arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[display("push")]
    Push,
    #[display("branch_create")]
    BranchCreate,
    #[display("branch_delete")]
    BranchDelete,
}

/// One repository change notification, already authenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub id: RequestId,
    pub kind: EventKind,
    pub clone_url: String,
    pub r#ref: String,
    /// Empty when the event carries no commit (branch creation).
    pub commit_sha: String,
    /// `owner/name`; may be empty.
    pub repository: String,
    /// Repository default branch, when the event reports it.
    pub default_branch: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl DeploymentRequest {
    pub fn new(
        kind: EventKind,
        clone_url: impl Into<String>,
        r#ref: impl Into<String>,
        commit_sha: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            kind,
            clone_url: clone_url.into(),
            r#ref: r#ref.into(),
            commit_sha: commit_sha.into(),
            repository: repository.into(),
            default_branch: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_default_branch(mut self, default_branch: impl Into<String>) -> Self {
        let default_branch = default_branch.into();
        self.default_branch = (!default_branch.is_empty()).then_some(default_branch);
        self
    }

    pub fn branch(&self) -> &str {
        branch_from_ref(&self.r#ref)
    }

    pub fn identity(&self) -> DeploymentIdentity {
        DeploymentIdentity::derive(&self.clone_url, &self.r#ref, &self.repository)
    }

    /// Build a request from a GitHub webhook.
    ///
    /// Returns `None` for events that carry nothing to deploy (tag
    /// creation/deletion, unrelated event types, malformed payloads).
    pub fn from_github_event(event_type: &str, payload: &serde_json::Value) -> Option<Self> {
        let repo = payload.get("repository")?;
        let clone_url = repo.get("clone_url")?.as_str()?;
        let repository = repo
            .get("full_name")
            .and_then(|n| n.as_str())
            .unwrap_or_default();
        let default_branch = repo
            .get("default_branch")
            .and_then(|b| b.as_str())
            .unwrap_or_default();

        let request = match event_type {
            "push" => {
                let r#ref = payload.get("ref")?.as_str()?;
                let deleted = payload
                    .get("deleted")
                    .and_then(|d| d.as_bool())
                    .unwrap_or(false);
                if deleted {
                    Self::new(EventKind::BranchDelete, clone_url, r#ref, "", repository)
                } else {
                    let after = payload.get("after")?.as_str()?;
                    Self::new(EventKind::Push, clone_url, r#ref, after, repository)
                }
            }
            "create" | "delete" => {
                if payload.get("ref_type").and_then(|t| t.as_str()) != Some("branch") {
                    return None;
                }
                let name = payload.get("ref")?.as_str()?;
                let r#ref = format!("{}{}", BRANCH_REF_PREFIX, name);
                let kind = if event_type == "create" {
                    EventKind::BranchCreate
                } else {
                    EventKind::BranchDelete
                };
                Self::new(kind, clone_url, r#ref, "", repository)
            }
            _ => return None,
        };

        Some(request.with_default_branch(default_branch))
    }
}
