//! Core domain types and traits for stackhook.
//!
//! This crate contains:
//! - Deployment identities (hashes and project slugs)
//! - Inbound deployment requests
//! - Secret environment handling and the secret store trait
//! - Capability traits for checkout, compilation and orchestration

pub mod error;
pub mod event;
pub mod identity;
pub mod secret;
pub mod tooling;

pub use error::{CleanupWarning, Error, Result};
pub use event::{DeploymentRequest, EventKind, RequestId};
pub use identity::{ContentHash, DeploymentIdentity};
pub use secret::{SecretEnv, SecretStore};
pub use tooling::{
    COMPOSE_PROJECT_LABEL, Checkout, Compiler, Orchestrator, ResourceFilter, ResourceKind, UpSpec,
};
