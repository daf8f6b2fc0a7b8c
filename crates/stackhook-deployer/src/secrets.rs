//! Secret bundle resolution.
//!
//! A bundle is compiled to YAML and must be a flat mapping of variable
//! names to scalars. Values never leave this module except inside the
//! returned [`SecretEnv`], and error messages name keys only. Compiler
//! output is dropped since it can quote the bundle.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_yaml::Value;
use stackhook_core::{
    Compiler, ContentHash, DeploymentIdentity, Error, Result, SecretEnv, SecretStore,
};
use tracing::{debug, warn};

pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    compiler: Arc<dyn Compiler>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>, compiler: Arc<dyn Compiler>) -> Self {
        Self { store, compiler }
    }

    /// Environment for one deployment; empty when the repository has no bundle.
    pub async fn resolve_secrets(&self, identity: &DeploymentIdentity) -> Result<SecretEnv> {
        let Some(path) = self.store.locate(&identity.clone_url_hash).await? else {
            debug!(project = %identity.project_slug, "No secret bundle");
            return Ok(SecretEnv::default());
        };

        let env = self.evaluate(&path, &identity.branch).await?;
        debug!(project = %identity.project_slug, keys = ?env.keys().collect::<Vec<_>>(), "Resolved secrets");
        Ok(env)
    }

    /// Replace a repository's bundle with `bundle` if it evaluates.
    ///
    /// The candidate is compiled once, without a branch. A rejected
    /// candidate is discarded and the previous bundle stays in place.
    /// Returns the number of variables.
    pub async fn install_bundle(&self, clone_url_hash: &ContentHash, bundle: &[u8]) -> Result<usize> {
        let staged = self.store.stage(clone_url_hash, bundle).await?;
        match self.evaluate(&staged, "").await {
            Ok(env) => {
                self.store.promote(clone_url_hash, &staged).await?;
                Ok(env.len())
            }
            Err(e) => {
                if let Err(cleanup) = self.store.discard(&staged).await {
                    warn!(
                        repo_hash = %clone_url_hash.short(12),
                        error = %cleanup,
                        "Failed to remove rejected bundle"
                    );
                }
                Err(e)
            }
        }
    }

    async fn evaluate(&self, path: &Path, branch: &str) -> Result<SecretEnv> {
        let yaml = self.compiler.compile(path, branch).await.map_err(|e| match e {
            Error::Compile(_) => Error::Compile("secret bundle failed to evaluate".to_string()),
            other => other,
        })?;
        SecretEnv::from_map(parse_secret_yaml(&yaml)?)
    }
}

/// Read compiled bundle YAML as a flat string map.
pub fn parse_secret_yaml(yaml: &[u8]) -> Result<BTreeMap<String, String>> {
    if yaml.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    let doc: Value = serde_yaml::from_slice(yaml).map_err(|e| {
        let at = e
            .location()
            .map(|l| format!(" at line {}", l.line()))
            .unwrap_or_default();
        Error::Compile(format!("secret bundle is not valid YAML{}", at))
    })?;

    let mapping = match doc {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err(Error::Compile("secret bundle must be a mapping".to_string())),
    };

    let mut vars = BTreeMap::new();
    for (key, value) in mapping {
        let key = scalar_to_string(&key)
            .ok_or_else(|| Error::Compile("secret bundle keys must be scalars".to_string()))?;
        let value = match value {
            Value::Null => String::new(),
            other => scalar_to_string(&other)
                .ok_or_else(|| Error::Compile(format!("secret {:?} must be a scalar", key)))?,
        };
        vars.insert(key, value);
    }
    Ok(vars)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
