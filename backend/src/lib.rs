use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod pages;
pub mod repository;
pub mod tracking;

// JSON API routers (public, authenticated) and the HTML page router.
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, pages as page_routes, public};

// --- Public Re-exports ---

pub use config::{AppConfig, RoutePaths};
pub use repository::{PostgresRepository, RepositoryState};
pub use tracking::{HttpViewSink, RepositoryViewSink, TrackerState};

/// ApiDoc
///
/// OpenAPI document for the JSON API, served at `/api-docs/openapi.json`. Page routes
/// return HTML and are not listed.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::logout,
        handlers::get_me, handlers::get_my_resources, handlers::get_dashboard,
        handlers::list_resources, handlers::get_resource, handlers::create_resource,
        handlers::track_resource_view, handlers::list_universities, handlers::get_university
    ),
    components(
        schemas(
            models::User, models::Resource, models::ResourceDetail, models::University,
            models::RegisterUserRequest, models::LoginRequest, models::CreateResourceRequest,
            models::UserProfile, models::DashboardView, models::AuthResponse,
        )
    ),
    tags(
        (name = "unishare", description = "UniShare course resource API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared by every request. Each service sits behind an `Arc` so cloning per
/// request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Users, resources, universities and views.
    pub repo: RepositoryState,
    /// Destination of view-tracking calls.
    pub tracker: TrackerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TrackerState {
    fn from_ref(app_state: &AppState) -> TrackerState {
        app_state.tracker.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for RoutePaths {
    fn from_ref(app_state: &AppState) -> RoutePaths {
        app_state.config.routes.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated JSON routes. Extracting `AuthUser` rejects with 401
/// when there is no session and 503 when the session could not be checked. The
/// resolved session is cached in the request, so the handler does not look it up again.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the JSON API, the HTML pages and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Page guards run inside each page handler, not as a layer, so they can
        // redirect instead of rejecting.
        .merge(page_routes::page_routes(&state.config.routes))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with the `x-request-id` set by the layer above
/// so all log lines of a request correlate.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
