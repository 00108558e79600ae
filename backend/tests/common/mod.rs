#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use chrono::{Duration as ChronoDuration, Utc};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tower::ServiceExt;
use unishare::{
    AppState, create_router,
    auth,
    config::AppConfig,
    error::{RepoError, TrackingError},
    models::{CreateResourceRequest, Resource, ResourceFilter, University, User, UserCredentials},
    repository::Repository,
    tracking::{ResourceId, ViewSink},
};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

// --- In-memory Repository ---

/// Repository double shared by the integration tests. Flip `fail_user_lookups` to
/// simulate the session store being down, or set `resource_delay` to make resource
/// loads slow.
#[derive(Default)]
pub struct InMemoryRepo {
    pub users: Mutex<Vec<UserCredentials>>,
    pub resources: Mutex<Vec<Resource>>,
    pub universities: Mutex<Vec<University>>,
    pub views: Mutex<Vec<(Uuid, Option<Uuid>)>>,
    pub fail_user_lookups: AtomicBool,
    pub resource_delay: Mutex<Option<Duration>>,
}

impl InMemoryRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds a user whose password is not needed by the test.
    pub fn add_user(&self, email: &str) -> User {
        self.insert_user(email, "not-a-real-hash".to_string())
    }

    /// Seeds a user that can sign in with `password`.
    pub fn add_user_with_password(&self, email: &str, password: &str) -> User {
        let hash = auth::hash_password(password).unwrap();
        self.insert_user(email, hash)
    }

    fn insert_user(&self, email: &str, password_hash: String) -> User {
        let creds = UserCredentials {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: "student".to_string(),
            university_id: None,
            password_hash,
        };
        self.users.lock().unwrap().push(creds.clone());
        creds.into()
    }

    pub fn add_university(&self, id: i32, name: &str, slug: &str) -> University {
        let university = University {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            ..University::default()
        };
        self.universities.lock().unwrap().push(university.clone());
        university
    }

    /// Seeds a resource. Each call is one minute newer than the previous one.
    pub fn add_resource(&self, uploader_id: Uuid, course_code: &str, title: &str) -> Resource {
        let mut resources = self.resources.lock().unwrap();
        let resource = Resource {
            resource_id: Uuid::new_v4(),
            uploader_id,
            course_code: course_code.to_string(),
            semester: "2025-spring".to_string(),
            title: title.to_string(),
            file_url: "https://files.example.com/notes.pdf".to_string(),
            uploaded_at: Utc::now() + ChronoDuration::minutes(resources.len() as i64),
            ..Resource::default()
        };
        resources.push(resource.clone());
        resource
    }

    pub fn view_count(&self, resource_id: Uuid) -> usize {
        self.views
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == resource_id)
            .count()
    }

    fn store_down() -> RepoError {
        RepoError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        if self.fail_user_lookups.load(Ordering::SeqCst) {
            return Err(Self::store_down());
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .map(User::from))
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        university_id: Option<i32>,
    ) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(RepoError::Conflict("email".to_string()));
        }
        let creds = UserCredentials {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: "student".to_string(),
            university_id,
            password_hash: password_hash.to_string(),
        };
        users.push(creds.clone());
        Ok(creds.into())
    }

    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, RepoError> {
        let university_id = match &filter.university {
            Some(slug) => {
                let universities = self.universities.lock().unwrap();
                match universities.iter().find(|u| &u.slug == slug) {
                    Some(u) => Some(u.id),
                    None => return Ok(vec![]),
                }
            }
            None => None,
        };
        let search = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut matching: Vec<Resource> = self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.course_code.as_ref().is_none_or(|c| &r.course_code == c))
            .filter(|r| filter.semester.as_ref().is_none_or(|s| &r.semester == s))
            .filter(|r| university_id.is_none_or(|id| r.university_id == Some(id)))
            .filter(|r| {
                search.as_ref().is_none_or(|s| {
                    r.title.to_lowercase().contains(s)
                        || r.description.as_deref().is_some_and(|d| d.to_lowercase().contains(s))
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        matching.truncate(filter.page_size() as usize);
        Ok(matching)
    }

    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>, RepoError> {
        let delay = *self.resource_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.resource_id == id)
            .cloned())
    }

    async fn get_resources_by_uploader(&self, uploader_id: Uuid) -> Result<Vec<Resource>, RepoError> {
        let mut mine: Vec<Resource> = self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.uploader_id == uploader_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(mine)
    }

    async fn create_resource(
        &self,
        req: CreateResourceRequest,
        uploader_id: Uuid,
    ) -> Result<Resource, RepoError> {
        let resource = Resource {
            resource_id: Uuid::new_v4(),
            uploader_id,
            course_code: req.course_code,
            semester: req.semester,
            university_id: req.university_id,
            title: req.title,
            description: req.description,
            file_url: req.file_url,
            mime_type: req.mime_type,
            file_size: req.file_size,
            resource_type: req.resource_type,
            uploaded_at: Utc::now(),
        };
        self.resources.lock().unwrap().push(resource.clone());
        Ok(resource)
    }

    async fn record_view(&self, resource_id: Uuid, viewer_id: Option<Uuid>) -> Result<bool, RepoError> {
        let exists = self
            .resources
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.resource_id == resource_id);
        if exists {
            self.views.lock().unwrap().push((resource_id, viewer_id));
        }
        Ok(exists)
    }

    async fn count_views(&self, resource_id: Uuid) -> Result<i64, RepoError> {
        Ok(self.view_count(resource_id) as i64)
    }

    async fn list_universities(&self) -> Result<Vec<University>, RepoError> {
        let mut all = self.universities.lock().unwrap().clone();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_university(&self, id: i32) -> Result<Option<University>, RepoError> {
        Ok(self
            .universities
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn get_university_by_slug(&self, slug: &str) -> Result<Option<University>, RepoError> {
        Ok(self
            .universities
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.slug == slug)
            .cloned())
    }
}

// --- Recording View Sink ---

/// Records every tracking call. With `failing` set, each call is recorded and then
/// rejected.
#[derive(Default)]
pub struct RecordingSink {
    pub calls: Mutex<Vec<(String, Option<Uuid>)>>,
    pub failing: bool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Self::default()
        })
    }

    pub fn ids(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl ViewSink for RecordingSink {
    async fn track_view(&self, resource_id: &ResourceId, viewer_id: Option<Uuid>) -> Result<(), TrackingError> {
        self.calls
            .lock()
            .unwrap()
            .push((resource_id.as_str().to_string(), viewer_id));
        if self.failing {
            Err(TrackingError::Rejected(500))
        } else {
            Ok(())
        }
    }
}

// --- State & Requests ---

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn create_test_state(repo: Arc<InMemoryRepo>, sink: Arc<RecordingSink>) -> AppState {
    AppState {
        repo,
        tracker: sink,
        config: test_config(),
    }
}

pub fn app(state: AppState) -> Router {
    create_router(state)
}

pub fn token_for(user: &User, config: &AppConfig) -> String {
    auth::issue_token(user.id, config).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// GET with the session cookie set.
pub fn get_as(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("session={token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

pub fn location(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
}

/// The `name=value` pair of the session cookie set by a response.
pub fn session_from(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session=") && !v.starts_with("session=;"))
        .and_then(|v| v.split(';').next())
        .and_then(|pair| pair.strip_prefix("session="))
        .map(str::to_string)
}

/// Polls until `check` holds, for work that runs on a spawned task.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
