use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use proofgate_exec::{Classifier, CommandRunner, Scratch, ScratchError, ToolSpec};
use proofgate_install::InstallState;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers;

pub struct AppState {
    pub config: ServerConfig,
    pub runner: Arc<dyn CommandRunner>,
    pub scratch: Scratch,
    pub classifier: Classifier,
    pub install: Arc<InstallState>,
    pub run_permits: Semaphore,
    pub circomspect: ToolSpec,
    pub tamarin: ToolSpec,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        runner: Arc<dyn CommandRunner>,
        install: Arc<InstallState>,
    ) -> Result<Self, ScratchError> {
        Ok(Self {
            scratch: Scratch::new()?,
            classifier: Classifier::default(),
            run_permits: Semaphore::new(config.max_concurrent_runs),
            circomspect: config.circomspect(),
            tamarin: config.tamarin(),
            runner,
            install,
            config,
        })
    }
}

pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins = if config.allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/tamarin-status", get(handlers::tamarin_status))
        .route("/audit", post(handlers::audit))
        .route("/tamarin", post(handlers::tamarin))
        .route("/n8n/compile", post(handlers::n8n_compile))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&state.config))
        // Enforced by the body extractors so oversize requests get the JSON error shape.
        .layer(DefaultBodyLimit::max(state.config.max_request_bytes))
        .with_state(state)
}
