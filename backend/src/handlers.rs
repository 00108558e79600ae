use crate::{
    AppState,
    auth::{self, AuthUser, SessionContext},
    error::AppError,
    models::{
        self, AuthResponse, CreateResourceRequest, DashboardView, LoginRequest,
        RegisterUserRequest, Resource, ResourceDetail, ResourceFilter, University, User,
        UserProfile,
    },
    repository::RepositoryState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;
use validator::Validate;

// --- Loaders shared with the HTML pages ---

/// Builds the profile widget payload, resolving the user's university if set.
pub async fn load_profile(repo: &RepositoryState, user: &User) -> Result<UserProfile, AppError> {
    let university = match user.university_id {
        Some(id) => repo.get_university(id).await?,
        None => None,
    };
    Ok(UserProfile {
        id: user.id,
        email: user.email.clone(),
        role: user.role.clone(),
        university,
    })
}

/// Newest uploads across all courses.
pub async fn recent_resources(repo: &RepositoryState, limit: i64) -> Result<Vec<Resource>, AppError> {
    let filter = ResourceFilter {
        limit: Some(limit),
        ..ResourceFilter::default()
    };
    Ok(repo.list_resources(&filter).await?)
}

/// A resource with its view count, or `AppError::NotFound`.
pub async fn load_resource_detail(repo: &RepositoryState, id: Uuid) -> Result<ResourceDetail, AppError> {
    let resource = repo.get_resource(id).await?.ok_or(AppError::NotFound)?;
    let view_count = repo.count_views(id).await?;
    Ok(ResourceDetail {
        resource,
        view_count,
    })
}

// --- Auth ---

/// register_user
///
/// [Public Route] Creates a local account and signs it in. The session token is set
/// as a cookie and also returned in the body for non-browser clients.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = AuthResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    let user = auth::register(&state.repo, payload).await?;
    let token = auth::issue_token(user.id, &state.config)?;
    let jar = jar.add(auth::session_cookie(token.clone(), &state.config));
    tracing::info!(user_id = %user.id, "registered");
    Ok((StatusCode::CREATED, jar, Json(AuthResponse { user, token })))
}

/// login
///
/// [Public Route] Exchanges credentials for a session.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let user = auth::login(&state.repo, &payload).await?;
    let token = auth::issue_token(user.id, &state.config)?;
    let jar = jar.add(auth::session_cookie(token.clone(), &state.config));
    tracing::info!(user_id = %user.id, "signed in");
    Ok((jar, Json(AuthResponse { user, token })))
}

/// logout
///
/// [Public Route] Clears the session cookie. Tokens are stateless, so a copied bearer
/// token stays valid until it expires.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Signed out"))
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (StatusCode, CookieJar) {
    (
        StatusCode::NO_CONTENT,
        jar.remove(auth::expired_session_cookie(&state.config)),
    )
}

// --- Profile & dashboard ---

/// get_me
///
/// [Authenticated Route] The caller's profile.
#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = User::from(auth_user);
    Ok(Json(load_profile(&state.repo, &user).await?))
}

/// get_my_resources
///
/// [Authenticated Route] Resources uploaded by the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/me/resources",
    responses((status = 200, description = "My resources", body = [Resource]))
)]
pub async fn get_my_resources(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Resource>>, AppError> {
    Ok(Json(state.repo.get_resources_by_uploader(id).await?))
}

/// Uploads shown in the dashboard's "recent" widget.
pub const RECENT_RESOURCES: i64 = 10;

/// get_dashboard
///
/// [Authenticated Route] Data for every dashboard widget in one response.
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses((status = 200, description = "Dashboard", body = DashboardView))
)]
pub async fn get_dashboard(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DashboardView>, AppError> {
    let user = User::from(auth_user);
    let (profile, my_resources, recent_resources) = tokio::try_join!(
        load_profile(&state.repo, &user),
        async { Ok::<_, AppError>(state.repo.get_resources_by_uploader(user.id).await?) },
        recent_resources(&state.repo, RECENT_RESOURCES),
    )?;
    Ok(Json(DashboardView {
        profile,
        my_resources,
        recent_resources,
    }))
}

// --- Resources ---

/// list_resources
///
/// [Public Route] Lists resources filtered by course, semester, university slug and
/// free-text search.
#[utoipa::path(
    get,
    path = "/api/resources",
    params(ResourceFilter),
    responses((status = 200, description = "Matching resources", body = [Resource]))
)]
pub async fn list_resources(
    State(state): State<AppState>,
    Query(filter): Query<ResourceFilter>,
) -> Result<Json<Vec<Resource>>, AppError> {
    if let Some(slug) = filter.university.as_deref() {
        if !models::is_valid_slug(slug) {
            return Err(AppError::BadRequest(format!("malformed university slug `{slug}`")));
        }
    }
    Ok(Json(state.repo.list_resources(&filter).await?))
}

/// get_resource
///
/// [Public Route] One resource with its view count. Reading it does not count as a
/// view; clients report views through `POST /api/resources/{id}/views`.
#[utoipa::path(
    get,
    path = "/api/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 200, description = "Found", body = ResourceDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResourceDetail>, AppError> {
    Ok(Json(load_resource_detail(&state.repo, id).await?))
}

/// create_resource
///
/// [Authenticated Route] Registers the metadata of a file the client already uploaded
/// to external storage. The caller becomes the uploader.
#[utoipa::path(
    post,
    path = "/api/resources",
    request_body = CreateResourceRequest,
    responses(
        (status = 201, description = "Created", body = Resource),
        (status = 400, description = "Invalid payload")
    )
)]
pub async fn create_resource(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateResourceRequest>,
) -> Result<(StatusCode, Json<Resource>), AppError> {
    payload.validate()?;
    if let Some(university_id) = payload.university_id {
        if state.repo.get_university(university_id).await?.is_none() {
            return Err(AppError::BadRequest(format!("unknown university {university_id}")));
        }
    }
    let resource = state.repo.create_resource(payload, id).await?;
    tracing::info!(resource_id = %resource.resource_id, uploader_id = %id, "resource registered");
    Ok((StatusCode::CREATED, Json(resource)))
}

/// track_resource_view
///
/// [Public Route] The view-tracking action. Appends one view, attributed to the
/// caller when signed in. Calls are not de-duplicated: repeated calls count again.
#[utoipa::path(
    post,
    path = "/api/resources/{id}/views",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "View recorded"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn track_resource_view(
    session: SessionContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.repo.record_view(id, session.viewer_id()).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

// --- Universities ---

/// list_universities
///
/// [Public Route] All universities, alphabetically.
#[utoipa::path(
    get,
    path = "/api/universities",
    responses((status = 200, description = "Universities", body = [University]))
)]
pub async fn list_universities(State(state): State<AppState>) -> Result<Json<Vec<University>>, AppError> {
    Ok(Json(state.repo.list_universities().await?))
}

/// get_university
///
/// [Public Route] One university by slug. Malformed slugs are rejected before the
/// lookup.
#[utoipa::path(
    get,
    path = "/api/universities/{slug}",
    params(("slug" = String, Path, description = "University slug")),
    responses(
        (status = 200, description = "Found", body = University),
        (status = 400, description = "Malformed slug"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_university(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<University>, AppError> {
    if !models::is_valid_slug(&slug) {
        return Err(AppError::BadRequest(format!("malformed university slug `{slug}`")));
    }
    state
        .repo
        .get_university_by_slug(&slug)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}
