//! Deployment lifecycle for stackhook.
//!
//! Ties the tool backends together:
//! - Per-operation workspaces
//! - Compose manifest and phase overlay resolution
//! - Secret bundle resolution
//! - Per-identity locking, arrival-order queues and the up/down lifecycle

pub mod lifecycle;
pub mod locks;
pub mod queue;
pub mod resolve;
pub mod secrets;
pub mod workspace;

#[cfg(test)]
mod fakes;

pub use lifecycle::{LifecycleOrchestrator, Outcome, PHASE_ENV, TeardownReport};
pub use locks::IdentityLocks;
pub use queue::RequestQueues;
pub use resolve::{ConfigResolver, Manifest};
pub use secrets::{SecretResolver, parse_secret_yaml};
pub use workspace::{Workspace, Workspaces};
