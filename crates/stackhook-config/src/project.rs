//! Per-branch project configuration compiled from `env.pkl`.
//!
//! The compiled YAML maps branch names (or `"*"`) to branch settings:
//!
//! ```yaml
//! main:
//!   environment:
//!     type: phase
//!     value: production
//! "*":
//!   environment:
//!     type: phase
//!     value: development
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Key matching any branch without its own entry.
pub const WILDCARD_BRANCH: &str = "*";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectConfig {
    pub branches: BTreeMap<String, BranchConfig>,
}

impl ProjectConfig {
    /// Settings for `branch`, falling back to the wildcard entry.
    pub fn for_branch(&self, branch: &str) -> Option<&BranchConfig> {
        self.branches
            .get(branch)
            .or_else(|| self.branches.get(WILDCARD_BRANCH))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchConfig {
    #[serde(default)]
    pub environment: Option<EnvironmentProvider>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProvider {
    #[serde(rename = "type")]
    pub source: EnvironmentSource,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentSource {
    Phase,
}

/// Parse compiled project configuration. An empty document is an empty config.
pub fn parse_project_config(yaml: &[u8]) -> ConfigResult<ProjectConfig> {
    if yaml.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProjectConfig::default());
    }
    let config: Option<ProjectConfig> = serde_yaml::from_slice(yaml)?;
    Ok(config.unwrap_or_default())
}
