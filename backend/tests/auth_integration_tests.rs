mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, Uri, header, request::Parts},
};
use common::{InMemoryRepo, RecordingSink, TEST_JWT_SECRET, create_test_state};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{
    sync::atomic::Ordering,
    time::{SystemTime, UNIX_EPOCH},
};
use unishare::{
    AppState,
    auth::{self, AuthUser, Claims, SessionContext},
    config::Env,
    error::AppError,
    models::{LoginRequest, RegisterUserRequest},
    repository::RepositoryState,
};
use uuid::Uuid;

// --- Helper Functions ---

fn create_token(user_id: Uuid, secret: &str, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
}

fn production_state(repo: std::sync::Arc<InMemoryRepo>) -> AppState {
    let mut state = create_test_state(repo, RecordingSink::new());
    state.config.env = Env::Production;
    state
}

// --- Session extraction ---

#[tokio::test]
async fn test_session_from_valid_bearer_token() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("ada@uni.edu");
    let state = production_state(repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, 3600));

    let session = SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert_eq!(session.user, Some(user.clone()));
    assert_eq!(session.viewer_id(), Some(user.id));
}

#[tokio::test]
async fn test_session_from_cookie_takes_precedence() {
    let repo = InMemoryRepo::new();
    let cookie_user = repo.add_user("cookie@uni.edu");
    let bearer_user = repo.add_user("bearer@uni.edu");
    let state = production_state(repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::COOKIE,
        header::HeaderValue::from_str(&format!(
            "theme=dark; session={}",
            create_token(cookie_user.id, TEST_JWT_SECRET, 3600)
        ))
        .unwrap(),
    );
    with_bearer(&mut parts, &create_token(bearer_user.id, TEST_JWT_SECRET, 3600));

    let session = SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert_eq!(session.viewer_id(), Some(cookie_user.id));
}

#[tokio::test]
async fn test_missing_token_is_anonymous_not_an_error() {
    let state = production_state(InMemoryRepo::new());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let session = SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert!(session.user.is_none());

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_expired_token_is_anonymous() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("late@uni.edu");
    let state = production_state(repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Well past the default 60s leeway.
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, -3600));

    let session = SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert!(session.user.is_none());
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_anonymous() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("forged@uni.edu");
    let state = production_state(repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, "some-other-secret", 3600));

    let session = SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert!(session.user.is_none());
}

#[tokio::test]
async fn test_token_for_deleted_user_is_anonymous() {
    let state = production_state(InMemoryRepo::new());
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(Uuid::new_v4(), TEST_JWT_SECRET, 3600));

    let session = SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert!(session.user.is_none());
}

#[tokio::test]
async fn test_store_failure_propagates_instead_of_anonymous() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("ada@uni.edu");
    repo.fail_user_lookups.store(true, Ordering::SeqCst);
    let state = production_state(repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, 3600));

    let session = SessionContext::from_request_parts(&mut parts, &state).await;
    let err = session.unwrap_err();
    assert!(matches!(err, AppError::Session(_)));
    assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(auth_user, Err(AppError::Session(_))));
}

#[tokio::test]
async fn test_session_is_resolved_once_per_request() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("ada@uni.edu");
    let state = production_state(repo.clone());

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token(user.id, TEST_JWT_SECRET, 3600));
    SessionContext::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    // A second extraction must come from the request cache, not the failing store.
    repo.fail_user_lookups.store(true, Ordering::SeqCst);
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(auth_user.id, user.id);
}

#[tokio::test]
async fn test_local_bypass_success() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("local@dev.com");
    let state = create_test_state(repo, RecordingSink::new());
    assert_eq!(state.config.env, Env::Local);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.email, "local@dev.com");
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("local@dev.com");
    let state = production_state(repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(auth_user, Err(AppError::Unauthorized)));
}

#[tokio::test]
async fn test_issued_token_round_trips_through_validation() {
    let repo = InMemoryRepo::new();
    let user = repo.add_user("ada@uni.edu");
    let state = production_state(repo);

    let token = auth::issue_token(user.id, &state.config).unwrap();
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let found = auth::validate_session(&parts, &state.repo, &state.config)
        .await
        .unwrap();
    assert_eq!(found, Some(user));
}

#[test]
fn test_session_cookie_flags_follow_environment() {
    let mut config = common::test_config();
    let local = auth::session_cookie("t".to_string(), &config);
    assert_eq!(local.name(), "session");
    assert_eq!(local.http_only(), Some(true));
    assert_eq!(local.path(), Some("/"));
    assert_ne!(local.secure(), Some(true));

    config.env = Env::Production;
    let prod = auth::session_cookie("t".to_string(), &config);
    assert_eq!(prod.secure(), Some(true));
}

// --- Account flows ---

#[tokio::test]
async fn test_register_then_login() {
    let repo: RepositoryState = InMemoryRepo::new();
    let created = auth::register(
        &repo,
        RegisterUserRequest {
            email: "new@uni.edu".to_string(),
            password: "correct horse".to_string(),
            university_id: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(created.role, "student");

    let signed_in = auth::login(
        &repo,
        &LoginRequest {
            email: "NEW@uni.edu".to_string(),
            password: "correct horse".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(signed_in.id, created.id);
}

#[tokio::test]
async fn test_login_rejects_wrong_password_and_unknown_email_alike() {
    let repo = InMemoryRepo::new();
    repo.add_user_with_password("ada@uni.edu", "correct horse");
    let repo: RepositoryState = repo;

    let wrong_password = auth::login(
        &repo,
        &LoginRequest {
            email: "ada@uni.edu".to_string(),
            password: "battery staple".to_string(),
        },
    )
    .await;
    assert!(matches!(wrong_password, Err(AppError::BadCredentials)));

    let unknown = auth::login(
        &repo,
        &LoginRequest {
            email: "nobody@uni.edu".to_string(),
            password: "correct horse".to_string(),
        },
    )
    .await;
    assert!(matches!(unknown, Err(AppError::BadCredentials)));
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let repo = InMemoryRepo::new();
    repo.add_user("ada@uni.edu");
    let repo: RepositoryState = repo;

    let result = auth::register(
        &repo,
        RegisterUserRequest {
            email: "ada@uni.edu".to_string(),
            password: "long enough".to_string(),
            university_id: None,
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::AlreadyExists)));
}

#[tokio::test]
async fn test_register_unknown_university_is_bad_request() {
    let repo: RepositoryState = InMemoryRepo::new();
    let result = auth::register(
        &repo,
        RegisterUserRequest {
            email: "ada@uni.edu".to_string(),
            password: "long enough".to_string(),
            university_id: Some(42),
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_register_short_password_fails_validation() {
    let repo: RepositoryState = InMemoryRepo::new();
    let result = auth::register(
        &repo,
        RegisterUserRequest {
            email: "ada@uni.edu".to_string(),
            password: "short".to_string(),
            university_id: None,
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn test_password_hash_verifies_only_the_original() {
    let hash = auth::hash_password("correct horse").unwrap();
    assert!(auth::verify_password("correct horse", &hash).unwrap());
    assert!(!auth::verify_password("Correct horse", &hash).unwrap());
    assert!(auth::verify_password("anything", "not-a-phc-string").is_err());
}
