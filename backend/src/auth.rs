use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::{AppError, SessionValidationError},
    models::{LoginRequest, RegisterUserRequest, User},
    repository::RepositoryState,
};
use validator::Validate;

/// Claims
///
/// Payload of the session token. Signed with `AppConfig::jwt_secret` (HS256).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    /// Expiration time (seconds since epoch).
    pub exp: usize,
    /// Issued at (seconds since epoch).
    pub iat: usize,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Signs a session token for `user_id` valid for `config.session_ttl_secs`.
pub fn issue_token(user_id: Uuid, config: &AppConfig) -> Result<String, AppError> {
    let now = now_secs();
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + config.session_ttl_secs) as usize,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))
}

/// Builds the session cookie carrying `token`. `Secure` is set outside local development.
pub fn session_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((config.session_cookie.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.env == Env::Production)
        .build()
}

/// A cookie that clears the session when added to the jar via `remove`.
pub fn expired_session_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((config.session_cookie.clone(), "")).path("/").build()
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Pulls the raw token from the session cookie, falling back to `Authorization: Bearer`.
fn read_token(parts: &Parts, config: &AppConfig) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(&config.session_cookie) {
        return Some(cookie.value().to_string());
    }
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// validate_session
///
/// Resolves the viewer of a request. This is a read with no side effects and is safe
/// to call on every render.
///
/// - No token, a malformed token, a bad signature or an expired token: `Ok(None)`.
/// - A valid token for a user that no longer exists: `Ok(None)`.
/// - The user store failing: `Err`. Callers must not read that as "anonymous".
///
/// In `Env::Local` an `x-user-id` header naming an existing user is accepted in place
/// of a token.
pub async fn validate_session(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<Option<User>, SessionValidationError> {
    if config.env == Env::Local {
        let bypass = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok());
        if let Some(user_id) = bypass {
            if let Some(user) = repo.get_user(user_id).await? {
                return Ok(Some(user));
            }
        }
    }

    let Some(token) = read_token(parts, config) else {
        return Ok(None);
    };

    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let claims = match decode::<Claims>(&token, &key, &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                _ => tracing::debug!("rejected session token: {e}"),
            }
            return Ok(None);
        }
    };

    Ok(repo.get_user(claims.sub).await?)
}

/// SessionContext
///
/// The explicit session value handed to guards and handlers: either a user or none.
/// Resolved once per request and cached in the request extensions, so the auth
/// middleware and the handler behind it share one lookup.
///
/// Rejection: `AppError::Session` (503) when the session store failed.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub user: Option<User>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn viewer_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<SessionContext>() {
            return Ok(ctx.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let user = validate_session(parts, &repo, &config).await?;
        let ctx = SessionContext { user };
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated JSON API request.
///
/// Rejection: 401 when there is no valid session, 503 when the session could not be
/// checked at all.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub university_id: Option<i32>,
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        AuthUser {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            university_id: user.university_id,
        }
    }
}

impl From<AuthUser> for User {
    fn from(auth: AuthUser) -> Self {
        User {
            id: auth.id,
            email: auth.email,
            role: auth.role,
            university_id: auth.university_id,
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = SessionContext::from_request_parts(parts, state).await?;
        session
            .user
            .as_ref()
            .map(AuthUser::from)
            .ok_or(AppError::Unauthorized)
    }
}

// --- Account flows shared by the JSON API and the HTML forms ---

/// login
///
/// Verifies credentials. Unknown email and wrong password both yield
/// `AppError::BadCredentials`.
pub async fn login(repo: &RepositoryState, req: &LoginRequest) -> Result<User, AppError> {
    req.validate()?;
    let Some(creds) = repo.find_credentials(req.email.trim()).await? else {
        return Err(AppError::BadCredentials);
    };
    if !verify_password(&req.password, &creds.password_hash)? {
        return Err(AppError::BadCredentials);
    }
    Ok(creds.into())
}

/// register
///
/// Validates the payload, hashes the password and creates the account. A taken email
/// yields `AppError::AlreadyExists`; an unknown university id is a bad request.
pub async fn register(repo: &RepositoryState, req: RegisterUserRequest) -> Result<User, AppError> {
    req.validate()?;
    if let Some(university_id) = req.university_id {
        if repo.get_university(university_id).await?.is_none() {
            return Err(AppError::BadRequest(format!("unknown university {university_id}")));
        }
    }
    let hash = hash_password(&req.password)?;
    let user = repo
        .create_user(req.email.trim(), &hash, req.university_id)
        .await?;
    Ok(user)
}
