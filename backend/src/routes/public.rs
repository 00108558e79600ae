use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any client may call: health, account entry points, and read access to
/// the shared catalogue. The view-tracking action is public too; a signed-in
/// caller's views are attributed to them.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Accounts ---
        .route("/api/auth/register", post(handlers::register_user))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/logout", post(handlers::logout))
        // --- Catalogue ---
        // GET /api/resources?course_code=...&semester=...&university=...&search=...&limit=...
        .route("/api/resources", get(handlers::list_resources))
        .route("/api/resources/{id}", get(handlers::get_resource))
        // POST /api/resources/{id}/views
        // Appends one view. Not de-duplicated.
        .route("/api/resources/{id}/views", post(handlers::track_resource_view))
        .route("/api/universities", get(handlers::list_universities))
        .route("/api/universities/{slug}", get(handlers::get_university))
}
