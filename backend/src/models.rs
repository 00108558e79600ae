use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The account record stored in the `users` table. The password hash never leaves
/// the repository layer; see `UserCredentials`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    // 'student' or 'moderator'. Displayed on the profile widget.
    pub role: String,
    // Home university, if the user picked one at registration.
    pub university_id: Option<i32>,
}

/// UserCredentials
///
/// Internal row used only by the login flow to verify a password.
#[derive(Debug, Clone, FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub university_id: Option<i32>,
    pub password_hash: String,
}

impl From<UserCredentials> for User {
    fn from(c: UserCredentials) -> Self {
        User {
            id: c.id,
            email: c.email,
            role: c.role,
            university_id: c.university_id,
        }
    }
}

/// Resource
///
/// A shared course resource from the `resources` table. `resource_id` and
/// `uploader_id` are always present; every other descriptive field is optional.
/// The file itself lives in external storage and is referenced by `file_url`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Resource {
    pub resource_id: Uuid,
    pub uploader_id: Uuid,
    pub course_code: String,
    pub semester: String,
    pub university_id: Option<i32>,
    pub title: String,
    pub description: Option<String>,
    pub file_url: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    // Free-form classification, e.g. "notes", "past-paper", "slides".
    pub resource_type: Option<String>,
    #[ts(type = "string")]
    pub uploaded_at: DateTime<Utc>,
}

/// ResourceDetail
///
/// A resource enriched with its recorded view count.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ResourceDetail {
    #[serde(flatten)]
    pub resource: Resource,
    pub view_count: i64,
}

/// University
///
/// Reference data from the `universities` table. `slug` is unique and URL-safe.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct University {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub is_official: Option<bool>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input for `POST /api/auth/register` and the registration form. The password is
/// hashed before it reaches the repository and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "Password must be between 8 and 128 characters"))]
    pub password: String,
    #[serde(default)]
    pub university_id: Option<i32>,
}

/// LoginRequest
///
/// Input for `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// CreateResourceRequest
///
/// Registers the metadata of a file that was already uploaded to external storage.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateResourceRequest {
    #[validate(length(min = 1, max = 32, message = "Course code must be between 1 and 32 characters"))]
    pub course_code: String,
    #[validate(length(min = 1, max = 32, message = "Semester must be between 1 and 32 characters"))]
    pub semester: String,
    #[serde(default)]
    pub university_id: Option<i32>,
    #[validate(length(min = 1, max = 255, message = "Title must be between 1 and 255 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    #[validate(url(message = "file_url must be an absolute URL"))]
    pub file_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub resource_type: Option<String>,
}

/// ResourceFilter
///
/// Query parameters accepted by the resource listing (`GET /api/resources`).
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResourceFilter {
    /// Exact course code, e.g. "CS3012".
    pub course_code: Option<String>,
    /// Exact semester label, e.g. "2025-spring".
    pub semester: Option<String>,
    /// University slug.
    pub university: Option<String>,
    /// Case-insensitive match against title and description.
    pub search: Option<String>,
    /// Page size, capped at `MAX_PAGE_SIZE`.
    pub limit: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

impl ResourceFilter {
    pub fn page_size(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

// --- Output Schemas ---

/// UserProfile
///
/// The profile widget payload (`GET /api/me`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub university: Option<University>,
}

/// DashboardView
///
/// Everything the dashboard widgets need in one payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DashboardView {
    pub profile: UserProfile,
    pub my_resources: Vec<Resource>,
    pub recent_resources: Vec<Resource>,
}

/// AuthResponse
///
/// Returned by the JSON login/register endpoints alongside the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// --- Slugs ---

/// Returns true if `slug` is lowercase ASCII alphanumerics separated by single dashes.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
