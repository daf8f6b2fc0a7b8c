//! Application state.

use std::sync::Arc;

use stackhook_config::ServerConfig;
use stackhook_core::Result;
use stackhook_deployer::{ConfigResolver, LifecycleOrchestrator, SecretResolver, Workspaces};
use stackhook_executor::{
    DockerOrchestrator, DockerTimeouts, FileSecretStore, GitCheckout, PklCompiler,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleOrchestrator>,
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(lifecycle: Arc<LifecycleOrchestrator>, webhook_secret: Option<String>) -> Self {
        Self {
            lifecycle,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()).map(Arc::from),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let lifecycle = build_lifecycle(config)?;
        Ok(Self::new(Arc::new(lifecycle), config.webhook_secret.clone()))
    }
}

/// Wire the real tool backends into a lifecycle orchestrator.
pub fn build_lifecycle(config: &ServerConfig) -> Result<LifecycleOrchestrator> {
    let checkout = Arc::new(
        GitCheckout::new(&config.tools.git, config.timeouts.checkout)
            .with_access_token(config.access_token.clone()),
    );
    let compiler = Arc::new(PklCompiler::new(&config.tools.pkl, config.timeouts.compile));
    let orchestrator = Arc::new(DockerOrchestrator::new(
        &config.tools.docker,
        DockerTimeouts {
            validate: config.timeouts.validate,
            up: config.timeouts.up,
            down: config.timeouts.down,
        },
    )?);
    let store = Arc::new(FileSecretStore::new(&config.secrets_dir));

    Ok(LifecycleOrchestrator::new(
        Workspaces::new(&config.cache_dir, checkout),
        ConfigResolver::new(compiler.clone(), orchestrator.clone())
            .with_label_injection(config.inject_labels),
        SecretResolver::new(store, compiler),
        orchestrator,
    ))
}
