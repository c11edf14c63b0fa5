//! HTTP server
//!
//! Builds the axum router, wires shared state and middleware, and runs the
//! server until a shutdown signal arrives.

pub mod docs;
pub mod error;
pub mod handlers;

use crate::{config::ServiceConfig, lifecycle::LifecycleController, services::UploadValidator};
use axum::{
    extract::{DefaultBodyLimit, Request},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub lifecycle: Arc<LifecycleController>,
    pub validator: UploadValidator,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServiceConfig, lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            validator: UploadValidator::from_config(&config),
            config: Arc::new(config),
            lifecycle,
        }
    }
}

/// Routes without middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(handlers::HEALTH_PATH, get(handlers::health))
        .route(
            handlers::REMOVE_BACKGROUND_PATH,
            post(handlers::remove_background),
        )
        .route(docs::DOCS_PATH, get(docs::swagger_ui))
        .route(docs::REDOC_PATH, get(docs::redoc))
        .route(docs::OPENAPI_PATH, get(docs::openapi_json))
        .fallback(error::not_found)
        .with_state(state)
}

/// Wrap a router in body limit, panic recovery, request tracing and CORS
pub fn with_middleware(router: Router, config: &ServiceConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    router
        .layer(DefaultBodyLimit::max(config.request_body_limit()))
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(trace)
        .layer(cors)
}

/// Complete application: routes plus middleware
pub fn app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);
    with_middleware(router(state), &config)
}

/// Serve until SIGINT/SIGTERM, then release the model session
///
/// # Errors
/// - Bind failure
/// - Server I/O errors
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config.bind_address();
    let lifecycle = Arc::clone(&state.lifecycle);
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    info!("  GET  /               - Service information");
    info!("  GET  {}         - Health check", handlers::HEALTH_PATH);
    info!(
        "  POST {} - Remove background (multipart field 'file')",
        handlers::REMOVE_BACKGROUND_PATH
    );
    info!("  GET  {}            - API documentation", docs::DOCS_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(lifecycle))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM, releasing the model session first
pub async fn shutdown_signal(lifecycle: Arc<LifecycleController>) {
    let signal = wait_for_signal().await;
    info!("Received {signal}, shutting down...");
    lifecycle.release();
}

async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}
