use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::ServerConfig;
use crate::orchestrator::UpdateOrchestrator;
use crate::scheduler::UpdateScheduler;

pub mod handlers;
pub mod responses;

pub use handlers::{get_history, get_status, not_found, test_connection, trigger_update};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UpdateOrchestrator>,
    pub scheduler: Option<Arc<Mutex<UpdateScheduler>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<UpdateOrchestrator>) -> Self {
        Self {
            orchestrator,
            scheduler: None,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<Mutex<UpdateScheduler>>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api/v1", api_routes())
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/update", post(trigger_update))
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/test", post(test_connection))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "shipwatch"
    }))
}

pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server starting on {}:{}", config.host, config.port);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
