//! HTTP surface over detection, validation, repair and split tasks.

mod handlers;

use crate::services::detector::BoundaryDetector;
use crate::services::orchestrator::SplitOrchestrator;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SplitOrchestrator>,
    pub detector: Arc<BoundaryDetector>,
    /// Used when a detect request does not name its own minimum.
    pub min_pages_per_chapter: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/chapters/detect", post(handlers::detect_chapters))
        .route("/chapters/validate", post(handlers::validate_chapters))
        .route("/chapters/repair", post(handlers::repair_chapters))
        .route(
            "/tasks",
            post(handlers::create_task).get(handlers::list_tasks),
        )
        .route("/tasks/queue", get(handlers::queue_status))
        .route("/tasks/:task_id", get(handlers::get_task_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}
