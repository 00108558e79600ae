use crate::{AppState, config::RoutePaths, pages};
use axum::{
    Router,
    routing::{get, post},
};

/// Page Router Module
///
/// HTML routes. Paths come from `RoutePaths` so the guards, redirects and the
/// router always agree. Unknown paths fall through to an HTML 404.
pub fn page_routes(paths: &RoutePaths) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::index))
        // Public-only: signed-in viewers are redirected to the dashboard.
        .route(&paths.login, get(pages::login_page).post(pages::login_submit))
        .route(&paths.register, get(pages::register_page).post(pages::register_submit))
        .route("/logout", post(pages::logout))
        // Protected: anonymous viewers are redirected to login.
        .route(&paths.dashboard, get(pages::dashboard_page))
        .route(&paths.resource("{id}"), get(pages::resource_page))
        .fallback(pages::not_found)
}
