//! Server configuration parsing.
//!
//! ```kdl
//! listen "0.0.0.0:8080"
//! cache-dir "/tmp/stackhook"
//! secrets-dir "/secrets"
//! webhook-secret "s3cr3t"
//! inject-labels #true
//! tools { git "git"; pkl "pkl"; docker "docker" }
//! timeouts { checkout 300; compile 120; validate 120; up 1800; down 300 }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kdl::{KdlDocument, KdlNode};

use crate::{ConfigError, ConfigResult};

/// Server-wide configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Parent directory for per-commit workspaces.
    pub cache_dir: PathBuf,
    /// Directory holding one secret bundle per repository.
    pub secrets_dir: PathBuf,
    /// GitHub webhook secret; signatures are not checked when unset.
    pub webhook_secret: Option<String>,
    /// Token used for HTTPS clones of private repositories.
    pub access_token: Option<String>,
    /// Add log-viewer labels to every compose service.
    pub inject_labels: bool,
    pub log_format: LogFormat,
    pub tools: ToolPaths,
    pub timeouts: Timeouts,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cache_dir: std::env::temp_dir().join("stackhook"),
            secrets_dir: PathBuf::from("/secrets"),
            webhook_secret: None,
            access_token: None,
            inject_labels: true,
            log_format: LogFormat::default(),
            tools: ToolPaths::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen)
            .field("cache_dir", &self.cache_dir)
            .field("secrets_dir", &self.secrets_dir)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .field("access_token", &redact(&self.access_token))
            .field("inject_labels", &self.inject_labels)
            .field("log_format", &self.log_format)
            .field("tools", &self.tools)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Executables for the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub git: String,
    pub pkl: String,
    pub docker: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            pkl: "pkl".to_string(),
            docker: "docker".to_string(),
        }
    }
}

/// Upper bounds for each class of external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub checkout: Duration,
    pub compile: Duration,
    pub validate: Duration,
    pub up: Duration,
    pub down: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            checkout: Duration::from_secs(300),
            compile: Duration::from_secs(120),
            validate: Duration::from_secs(120),
            up: Duration::from_secs(1800),
            down: Duration::from_secs(300),
        }
    }
}

/// Read and parse a server configuration file.
pub fn load_server_config(path: &Path) -> ConfigResult<ServerConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_server_config(&content)
}

/// Parse server configuration from KDL text. Missing keys keep defaults.
pub fn parse_server_config(kdl: &str) -> ConfigResult<ServerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ServerConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "listen" => {
                let value = required_string(node, "listen")?;
                config.listen = value.parse().map_err(|e| ConfigError::InvalidValue {
                    field: "listen".to_string(),
                    message: format!("{}", e),
                })?;
            }
            "cache-dir" => config.cache_dir = required_string(node, "cache-dir")?.into(),
            "secrets-dir" => config.secrets_dir = required_string(node, "secrets-dir")?.into(),
            "webhook-secret" => {
                config.webhook_secret = Some(required_string(node, "webhook-secret")?)
            }
            "access-token" => config.access_token = Some(required_string(node, "access-token")?),
            "inject-labels" => {
                config.inject_labels =
                    get_first_bool_arg(node).ok_or_else(|| ConfigError::InvalidValue {
                        field: "inject-labels".to_string(),
                        message: "expected #true or #false".to_string(),
                    })?;
            }
            "log-format" => {
                config.log_format = match required_string(node, "log-format")?.as_str() {
                    "text" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            field: "log-format".to_string(),
                            message: format!("unknown format: {}", other),
                        });
                    }
                };
            }
            "tools" => parse_tools(node, &mut config.tools)?,
            "timeouts" => parse_timeouts(node, &mut config.timeouts)?,
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_tools(node: &KdlNode, tools: &mut ToolPaths) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        let name = child.name().value();
        let slot = match name {
            "git" => &mut tools.git,
            "pkl" => &mut tools.pkl,
            "docker" => &mut tools.docker,
            _ => continue,
        };
        *slot = required_string(child, &format!("tools.{}", name))?;
    }
    Ok(())
}

fn parse_timeouts(node: &KdlNode, timeouts: &mut Timeouts) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        let name = child.name().value();
        let slot = match name {
            "checkout" => &mut timeouts.checkout,
            "compile" => &mut timeouts.compile,
            "validate" => &mut timeouts.validate,
            "up" => &mut timeouts.up,
            "down" => &mut timeouts.down,
            _ => continue,
        };
        let secs = get_first_integer_arg(child)
            .filter(|s| *s > 0)
            .and_then(|s| u64::try_from(s).ok())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: format!("timeouts.{}", name),
                message: "expected a positive number of seconds".to_string(),
            })?;
        *slot = Duration::from_secs(secs);
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}
