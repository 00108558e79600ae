use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes that need a signed-in caller. The `AuthUser` middleware is layered on this
/// router by `create_router`, and each handler also extracts `AuthUser` to learn who
/// is calling.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/me
        .route("/api/me", get(handlers::get_me))
        // GET /api/me/resources
        // Everything the caller has uploaded.
        .route("/api/me/resources", get(handlers::get_my_resources))
        // GET /api/dashboard
        // Profile, own uploads and recent uploads in one payload.
        .route("/api/dashboard", get(handlers::get_dashboard))
        // POST /api/resources
        // Registers metadata for a file already in external storage. Merged with the
        // public GET on the same path.
        .route("/api/resources", post(handlers::create_resource))
}
