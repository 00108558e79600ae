//! Server-rendered pages.
//!
//! Every page handler runs its route guard first and only builds markup inside the
//! guard's render closure. Content that waits on asynchronous input sits inside a
//! deferred `Boundary` with a matching skeleton.

pub mod boundary;
pub mod markup;
pub mod widgets;

use axum::{
    Form,
    extract::{FromRef, FromRequestParts, OriginalUri, Path, Query, State},
    http::{HeaderValue, StatusCode, Uri, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{self, SessionContext},
    config::{AppConfig, RoutePaths},
    error::AppError,
    guard::{self, Access},
    handlers,
    models::{LoginRequest, RegisterUserRequest, User},
    repository::RepositoryState,
    tracking::{ResourceId, ViewTracker},
};
use boundary::{Boundary, PENDING_REFRESH_SECS, Resolved};
use markup::{Markup, document};

/// PageError
///
/// The page-level error boundary: renders an `AppError` as an HTML error page with
/// the same status the JSON API would use.
#[derive(Debug)]
pub struct PageError(pub AppError);

impl From<AppError> for PageError {
    fn from(e: AppError) -> Self {
        PageError(e)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let message = self.0.public_message();
        let title = status.canonical_reason().unwrap_or("Error");
        (status, document(title, widgets::error_panel(status.as_u16(), &message))).into_response()
    }
}

/// PageSession
///
/// `SessionContext` for page handlers, rejecting with the HTML error boundary
/// instead of a JSON body.
pub struct PageSession(pub SessionContext);

impl<S> FromRequestParts<S> for PageSession
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = PageError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        SessionContext::from_request_parts(parts, state)
            .await
            .map(PageSession)
            .map_err(PageError)
    }
}

/// Assembles a full page from resolved boundaries, adding a `Refresh` header when any
/// of them served its skeleton.
fn page(title: &str, parts: Vec<Resolved>) -> Response {
    let pending = parts.iter().any(|r| r.pending);
    let body: Markup = parts.into_iter().map(|r| r.markup).collect();
    let mut response = document(title, body).into_response();
    if pending {
        response.headers_mut().insert(
            header::REFRESH,
            HeaderValue::from(PENDING_REFRESH_SECS),
        );
    }
    response
}

fn requested_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

// --- Login ---

/// Query parameters read by the login form.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
    pub error: Option<String>,
}

/// login_page
///
/// [PublicOnly] Signed-in viewers are redirected to the dashboard before any form
/// markup exists. Otherwise the form is rendered inside a boundary because it reads
/// the query string.
pub async fn login_page(
    State(state): State<AppState>,
    PageSession(session): PageSession,
    OriginalUri(uri): OriginalUri,
) -> Result<Response, PageError> {
    let paths = state.config.routes.clone();
    let requested = requested_path(&uri);
    guard::guarded(
        Access::PublicOnly,
        &session,
        &paths,
        &requested,
        |_| async move {
            let paths = &state.config.routes;
            let form = Boundary::new("login-form", widgets::form_skeleton(), state.config.deferred_timeout)
                .resolve(async {
                    let Query(query) = Query::<LoginQuery>::try_from_uri(&uri)
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    let next = query.next.as_deref().map(|n| guard::safe_next(Some(n), paths));
                    Ok::<_, AppError>(widgets::login_form(paths, next.as_deref(), query.error.as_deref()))
                })
                .await?;
            Ok::<_, PageError>(page("Sign in", vec![form]))
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub next: Option<String>,
}

/// login_submit
///
/// Form login. On success sets the session cookie and redirects (303) to `next` if it
/// is a safe relative path, otherwise the dashboard. Bad credentials bounce back to
/// the login page with `error=invalid`.
pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let paths = &state.config.routes;
    let request = LoginRequest {
        email: form.email,
        password: form.password,
    };

    match auth::login(&state.repo, &request).await {
        Ok(user) => {
            let token = auth::issue_token(user.id, &state.config)?;
            let jar = jar.add(auth::session_cookie(token, &state.config));
            let to = guard::safe_next(form.next.as_deref(), paths);
            tracing::info!(user_id = %user.id, "signed in");
            Ok((jar, Redirect::to(&to)).into_response())
        }
        Err(AppError::BadCredentials | AppError::Validation(_)) => {
            let mut pairs = vec![("error", "invalid")];
            if let Some(next) = form.next.as_deref() {
                pairs.push(("next", next));
            }
            Ok(Redirect::to(&with_query(&paths.login, &pairs)).into_response())
        }
        Err(e) => Err(PageError(e)),
    }
}

// --- Register ---

#[derive(Debug, Default, Deserialize)]
pub struct RegisterQuery {
    pub error: Option<String>,
}

/// register_page
///
/// [PublicOnly] Registration form. The university picker loads inside a boundary.
pub async fn register_page(
    State(state): State<AppState>,
    PageSession(session): PageSession,
    OriginalUri(uri): OriginalUri,
) -> Result<Response, PageError> {
    let paths = state.config.routes.clone();
    let requested = requested_path(&uri);
    guard::guarded(
        Access::PublicOnly,
        &session,
        &paths,
        &requested,
        |_| async move {
            let paths = &state.config.routes;
            let form = Boundary::new("register-form", widgets::form_skeleton(), state.config.deferred_timeout)
                .resolve(async {
                    let Query(query) = Query::<RegisterQuery>::try_from_uri(&uri)
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    let universities = state.repo.list_universities().await?;
                    Ok::<_, AppError>(widgets::register_form(paths, &universities, query.error.as_deref()))
                })
                .await?;
            Ok::<_, PageError>(page("Register", vec![form]))
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    // Empty string when "Not listed" is picked.
    #[serde(default)]
    pub university_id: String,
}

/// register_submit
///
/// Form registration. Signs the new user in and redirects (303) to the dashboard.
pub async fn register_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response, PageError> {
    let paths = &state.config.routes;
    let request = RegisterUserRequest {
        email: form.email,
        password: form.password,
        university_id: form.university_id.trim().parse().ok(),
    };

    match auth::register(&state.repo, request).await {
        Ok(user) => {
            let token = auth::issue_token(user.id, &state.config)?;
            let jar = jar.add(auth::session_cookie(token, &state.config));
            tracing::info!(user_id = %user.id, "registered");
            Ok((jar, Redirect::to(&paths.dashboard)).into_response())
        }
        Err(AppError::AlreadyExists) => {
            Ok(Redirect::to(&with_query(&paths.register, &[("error", "taken")])).into_response())
        }
        Err(AppError::Validation(_)) => {
            Ok(Redirect::to(&with_query(&paths.register, &[("error", "validation")])).into_response())
        }
        Err(e) => Err(PageError(e)),
    }
}

/// logout
///
/// Clears the session cookie and redirects (303) to the login page.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = jar.remove(auth::expired_session_cookie(&state.config));
    (jar, Redirect::to(&state.config.routes.login)).into_response()
}

// --- Dashboard ---

/// dashboard_page
///
/// [Protected] Profile widget and resource widgets, each in its own boundary.
pub async fn dashboard_page(
    State(state): State<AppState>,
    PageSession(session): PageSession,
    OriginalUri(uri): OriginalUri,
) -> Result<Response, PageError> {
    let paths = state.config.routes.clone();
    let requested = requested_path(&uri);
    guard::guarded(
        Access::Protected,
        &session,
        &paths,
        &requested,
        |user| async move {
            let user = user.ok_or(AppError::Unauthorized)?;
            let timeout = state.config.deferred_timeout;
            let paths = &state.config.routes;

            let profile = Boundary::new("profile", widgets::profile_skeleton(), timeout).resolve(async {
                let profile = handlers::load_profile(&state.repo, &user).await?;
                Ok::<_, AppError>(widgets::profile_widget(&profile))
            });
            let mine = Boundary::new("my-resources", widgets::resource_list_skeleton(3), timeout).resolve(async {
                let resources = state.repo.get_resources_by_uploader(user.id).await?;
                Ok::<_, AppError>(widgets::resource_list_widget("My uploads", &resources, paths))
            });
            let recent = Boundary::new("recent-resources", widgets::resource_list_skeleton(5), timeout).resolve(async {
                let resources = handlers::recent_resources(&state.repo, handlers::RECENT_RESOURCES).await?;
                Ok::<_, AppError>(widgets::resource_list_widget("Recently shared", &resources, paths))
            });

            let (profile, mine, recent) = tokio::try_join!(profile, mine, recent)?;
            Ok::<_, PageError>(page("Dashboard", vec![profile, mine, recent]))
        },
    )
    .await
}

/// resource_page
///
/// [Protected] Resource details. The view tracker is mounted after the content is
/// built; it adds no markup and its call is not awaited.
pub async fn resource_page(
    State(state): State<AppState>,
    PageSession(session): PageSession,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<String>,
) -> Result<Response, PageError> {
    let paths = state.config.routes.clone();
    let requested = requested_path(&uri);
    guard::guarded(
        Access::Protected,
        &session,
        &paths,
        &requested,
        |user| async move {
            let user: User = user.ok_or(AppError::Unauthorized)?;
            // Parsed after the guard so a malformed id still redirects anonymous viewers.
            let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
            let mut content = Boundary::new("resource", widgets::resource_skeleton(), state.config.deferred_timeout)
                .resolve(async {
                    let detail = handlers::load_resource_detail(&state.repo, id).await?;
                    let university = match detail.resource.university_id {
                        Some(uid) => state.repo.get_university(uid).await?,
                        None => None,
                    };
                    Ok::<_, AppError>(widgets::resource_detail(&detail, university.as_ref()))
                })
                .await?;

            // Pending skeletons do not count as a view; the refresh will.
            if !content.pending {
                let mut tracker = ViewTracker::mount(state.tracker.clone(), Some(user.id));
                content.markup.push(tracker.render(&ResourceId::from(id)));
            }
            Ok::<_, PageError>(page("Resource", vec![content]))
        },
    )
    .await
}

/// Fallback for unknown page paths.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        document("Not Found", widgets::error_panel(404, "Page not found")),
    )
}

/// Root path: send the viewer to the dashboard, whose guard takes it from there.
pub async fn index(State(paths): State<RoutePaths>) -> Redirect {
    Redirect::temporary(&paths.dashboard)
}
