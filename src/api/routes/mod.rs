//! HTTP route handlers.

mod credentials;
mod health;
mod outcomes;
mod status;
mod upload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::services::ServeDir;

use super::server::AppState;

/// Total multipart parse limit for uploads.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let serve_dir = state.serve_dir.clone();

    Router::new()
        .route("/upload", post(upload::upload_handler))
        .route("/status", get(status::status_handler))
        .route("/cancel", delete(status::cancel_handler))
        .route("/success", get(outcomes::success_query_handler))
        .route("/success/list", get(outcomes::success_list_handler))
        .route("/failures", get(outcomes::failure_query_handler))
        .route("/failures/list", get(outcomes::failure_list_handler))
        .route(
            "/register",
            post(credentials::register_handler).delete(credentials::deregister_handler),
        )
        .route("/health", get(health::health_handler))
        .route("/version", get(health::version_handler))
        .nest_service("/files", ServeDir::new(serve_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
