//! Configuration handling for stackhook.
//!
//! This crate handles:
//! - Server configuration (KDL)
//! - Per-branch project configuration compiled from `env.pkl`
//! - Label injection into compose manifests

pub mod error;
pub mod labels;
pub mod project;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use labels::{inject_service_labels, label_manifest};
pub use project::{
    BranchConfig, EnvironmentProvider, EnvironmentSource, ProjectConfig, parse_project_config,
};
pub use system::{
    LogFormat, ServerConfig, Timeouts, ToolPaths, load_server_config, parse_server_config,
};
