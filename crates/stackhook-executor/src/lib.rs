//! Tool backends for stackhook.
//!
//! Provides implementations of the core capability traits:
//! - `git` checkouts
//! - `pkl` compilation
//! - Docker Compose orchestration
//! - File-based secret bundle storage

pub mod docker;
pub mod git;
pub mod pkl;
pub mod process;
pub mod secrets;

pub use docker::{DockerOrchestrator, DockerTimeouts};
pub use git::GitCheckout;
pub use pkl::PklCompiler;
pub use process::ProcessError;
pub use secrets::FileSecretStore;
