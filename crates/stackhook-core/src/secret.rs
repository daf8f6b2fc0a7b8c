//! Secret bundles and the environment they produce.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::identity::ContentHash;
use crate::{Error, Result};

static ENV_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Whether `key` may be used as an environment variable name.
pub fn is_valid_env_key(key: &str) -> bool {
    ENV_KEY.is_match(key)
}

/// Wrap `value` in single quotes, rewriting embedded quotes as `'\''`.
pub fn escape_shell_arg(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Validated, escaped environment for one orchestrator invocation.
///
/// Values are never printed: `Debug` lists keys only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretEnv {
    vars: Vec<(String, String)>,
}

impl SecretEnv {
    /// Validate every key and escape every value.
    ///
    /// A single invalid key rejects the whole map.
    pub fn from_map(map: BTreeMap<String, String>) -> Result<Self> {
        if let Some(bad) = map.keys().find(|k| !is_valid_env_key(k)) {
            return Err(Error::InvalidSecretKey(bad.clone()));
        }
        Ok(Self {
            vars: map
                .into_iter()
                .map(|(k, v)| {
                    let escaped = escape_shell_arg(&v);
                    (k, escaped)
                })
                .collect(),
        })
    }

    /// Append one variable, validating and escaping it like a bundle entry.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<()> {
        if !is_valid_env_key(key) {
            return Err(Error::InvalidSecretKey(key.to_string()));
        }
        self.vars.retain(|(k, _)| k != key);
        self.vars.push((key.to_string(), escape_shell_arg(value)));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `KEY=value` strings.
    pub fn to_env_strings(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

impl fmt::Debug for SecretEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEnv")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Storage for per-repository secret bundles, keyed by clone-URL hash.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Path of the bundle for a repository, if one was uploaded.
    async fn locate(&self, clone_url_hash: &ContentHash) -> Result<Option<PathBuf>>;

    /// Write a candidate bundle beside the live one. `locate` never
    /// returns a staged bundle.
    async fn stage(&self, clone_url_hash: &ContentHash, bundle: &[u8]) -> Result<PathBuf>;

    /// Replace the live bundle with a staged one.
    async fn promote(&self, clone_url_hash: &ContentHash, staged: &Path) -> Result<PathBuf>;

    /// Remove a staged bundle. Removing a missing file is not an error.
    async fn discard(&self, staged: &Path) -> Result<()>;
}
