//! Router configuration for the API server.

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    let body_limit = state.body_limit;

    Router::new()
        .route("/health", get(handlers::health))
        // Anonymous sessions
        .route("/anonymous/upload", post(handlers::anonymous_upload))
        .route("/anonymous/rate-limit", get(handlers::anonymous_rate_limit))
        .route("/anonymous/:token", get(handlers::anonymous_preview))
        .route("/anonymous/:token/status", get(handlers::anonymous_status))
        .route("/anonymous/:token/claim", post(handlers::anonymous_claim))
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects/upload", post(handlers::upload_project))
        .route("/projects/:project_id", get(handlers::get_project))
        .route(
            "/projects/:project_id/generate/:kind",
            post(handlers::generate_output),
        )
        .route(
            "/projects/:project_id/outputs",
            get(handlers::list_project_outputs),
        )
        // Outputs
        .route(
            "/outputs/:output_id",
            get(handlers::get_output)
                .patch(handlers::update_output)
                .delete(handlers::delete_output),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
