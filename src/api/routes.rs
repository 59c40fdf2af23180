use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::response::timeout_envelope;
use crate::AppState;

/// Maximum-size files a single multipart request may carry.
const FILES_PER_REQUEST: u64 = 8;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit =
        usize::try_from(state.config.max_upload_size.saturating_mul(FILES_PER_REQUEST))
            .unwrap_or(usize::MAX);

    let mut router = Router::new()
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route(
            "/projects",
            post(handlers::create_project).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/projects/by-number", get(handlers::get_project_by_number))
        .route("/projects/:id", get(handlers::get_project))
        .route(
            "/projects/:id",
            put(handlers::update_project)
                .layer(DefaultBodyLimit::max(body_limit))
                .patch(handlers::patch_project),
        )
        .route("/projects/:id", delete(handlers::delete_project))
        // Resources
        .route("/resources/:id", get(handlers::get_resource))
        .route("/resources/:id", delete(handlers::delete_resource))
        .route("/resources/:id/pages", get(handlers::get_resource_pages))
        // Signed object downloads (local backend)
        .route("/objects/:bucket/*key", get(handlers::serve_object))
        // Reference data
        .route("/catalog", put(handlers::import_catalog))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled: purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::map_response(timeout_envelope))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
