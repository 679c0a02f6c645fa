use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::propagate_request_id;

use super::handlers;
use super::AppState;

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn(propagate_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/recommendations/generate", post(handlers::generate))
        .route("/recommendations/query", post(handlers::query))
        .route("/recommendations/feedback", post(handlers::apply_feedback))
        .route("/recommendations/:id", delete(handlers::delete_recommendation))
        .route("/recommendations", delete(handlers::clear))
}
