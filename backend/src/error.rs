use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// RepoError
///
/// Failures of the persistence layer. Absence of a row is not an error; repository
/// methods return `Option` for that.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
}

/// SessionValidationError
///
/// The session check itself failed, as opposed to finding no user. Guards propagate
/// this instead of treating the viewer as anonymous.
#[derive(Debug, Error)]
pub enum SessionValidationError {
    #[error("session store unavailable: {0}")]
    Store(#[from] RepoError),
}

/// TrackingError
///
/// Failure of the view-tracking collaborator. Swallowed by the view tracker.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("view could not be recorded: {0}")]
    Store(#[from] RepoError),
    #[error("tracking endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tracking endpoint rejected the view with status {0}")]
    Rejected(u16),
}

/// AppError
///
/// Handler-facing error. Renders as `{ "error": "..." }` with a mapped status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("requested object doesn't exist")]
    NotFound,
    #[error("bad auth credentials")]
    BadCredentials,
    #[error("authentication required")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("requested object already exists")]
    AlreadyExists,
    #[error(transparent)]
    Session(#[from] SessionValidationError),
    #[error(transparent)]
    Repo(RepoError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict(_) => AppError::AlreadyExists,
            e => AppError::Repo(e),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Repo(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Session(e) => {
                error!("session validation failed: {e}");
                "Session could not be verified, try again shortly".to_string()
            }
            Self::Repo(e) => {
                error!("received internal error for user request: {e}");
                "Something went wrong".to_string()
            }
            Self::Internal(e) => {
                error!("received internal error for user request: {e}");
                "Something went wrong".to_string()
            }
            e => e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({ "error": self.public_message() }).to_string();
        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}
