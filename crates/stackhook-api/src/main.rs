//! stackhook webhook server

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use clap::Parser;
use stackhook_api::{AppState, routes};
use stackhook_config::{LogFormat, ServerConfig, load_server_config};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Largest accepted request body (webhook payloads and secret uploads).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "stackhook-server")]
#[command(about = "Deploy docker compose stacks from GitHub webhooks", long_about = None)]
#[command(version)]
struct Args {
    /// Server configuration file (KDL)
    #[arg(short, long, env = "STACKHOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the config file
    #[arg(short, long, env = "STACKHOOK_LISTEN")]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_server_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if args.log_json {
        config.log_format = LogFormat::Json;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!(
        cache_dir = %config.cache_dir.display(),
        secrets_dir = %config.secrets_dir.display(),
        signed = config.webhook_secret.is_some(),
        "Loaded configuration"
    );

    tokio::fs::create_dir_all(&config.cache_dir).await?;
    tokio::fs::create_dir_all(&config.secrets_dir).await?;

    let state = AppState::from_config(&config)?;

    let app = routes::router(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    info!("Starting server on {}", config.listen);

    let listener = TcpListener::bind(config.listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
