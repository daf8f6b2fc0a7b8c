//! Error types for stackhook.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("checkout failed: {0}")]
    Checkout(String),

    #[error("no compose manifest found in {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("compile failed: {0}")]
    Compile(String),

    #[error("manifest rejected by orchestrator: {0}")]
    ManifestInvalid(String),

    #[error("invalid secret key: {0:?}")]
    InvalidSecretKey(String),

    #[error("orchestrator invocation failed: {0}")]
    Orchestrator(String),

    #[error("`{command}` timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the next naturally-arriving event can be expected to succeed
    /// where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Orchestrator(_) | Error::Checkout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A workspace directory that could not be removed.
///
/// Only ever logged; never returned as a deployment failure.
#[derive(Debug, Error)]
#[error("failed to remove workspace {}: {source}", .path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
