//! API route definitions

use super::{handlers, state::AppState};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. See /api/health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed for this route.",
        })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_size = state.config.max_upload_size;

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/estimators", get(handlers::list_estimators))
        // Sessions
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:id", get(handlers::get_session).delete(handlers::delete_session))
        // Data
        .route("/sessions/:id/upload", post(handlers::upload_data))
        .route("/sessions/:id/data/preview", get(handlers::get_data_preview))
        // Preprocessing
        .route("/sessions/:id/preprocess/overview", get(handlers::get_preprocessing_overview))
        .route("/sessions/:id/preprocess", post(handlers::run_preprocessing))
        // Training
        .route("/sessions/:id/train", post(handlers::train_model))
        .route("/sessions/:id/model/download", get(handlers::download_model))
        // Charts
        .route("/sessions/:id/visualize", post(handlers::visualize))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes)
        .fallback(handle_404)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
