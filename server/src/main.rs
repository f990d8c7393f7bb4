mod app;
mod config;
mod error;
mod handlers;

use std::sync::Arc;

use proofgate_exec::SystemRunner;
use proofgate_install::{InstallState, Installer, SystemSteps};
use tracing::{info, warn};

use crate::app::{router, AppState};
use crate::config::ServerConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "proofgate_server=info,proofgate_install=info,proofgate_exec=info".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(
        max_request_bytes = config.max_request_bytes,
        max_source_bytes = config.max_source_bytes,
        max_output_bytes = config.max_output_bytes,
        max_concurrent_runs = config.max_concurrent_runs,
        circomspect = %config.circomspect_bin.display(),
        tamarin = %config.install.install_path.display(),
        auto_install = config.install.allow_download,
        cors_origins = if config.allowed_origins.is_empty() {
            "*".to_string()
        } else {
            config.allowed_origins.join(", ")
        },
        "server config loaded"
    );

    let install = Arc::new(InstallState::new());
    let installer = Installer::new(
        config.install.clone(),
        SystemSteps::default(),
        Arc::clone(&install),
    );
    // Runs alongside request handling; /tamarin-status reports progress.
    proofgate_install::spawn(Arc::new(installer));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, Arc::new(SystemRunner), install)
        .expect("failed to create scratch directory");
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind server address");

    info!(%addr, "proofgate server ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
