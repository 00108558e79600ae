use crate::{
    error::RepoError,
    models::{CreateResourceRequest, Resource, ResourceFilter, University, User, UserCredentials},
};
use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Abstract contract for all persistence operations. Handlers, extractors and the
/// repository-backed view sink only ever see `Arc<dyn Repository>`, so tests swap in
/// an in-memory implementation.
///
/// Lookups return `Ok(None)` for a missing row and `Err` only when the store itself
/// failed. The session check depends on that distinction.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    // Login lookup; the only method that exposes a password hash.
    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError>;
    // Fails with `RepoError::Conflict` if the email is taken.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        university_id: Option<i32>,
    ) -> Result<User, RepoError>;

    // --- Resources ---
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, RepoError>;
    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>, RepoError>;
    async fn get_resources_by_uploader(&self, uploader_id: Uuid) -> Result<Vec<Resource>, RepoError>;
    async fn create_resource(
        &self,
        req: CreateResourceRequest,
        uploader_id: Uuid,
    ) -> Result<Resource, RepoError>;

    // --- Views ---
    // Appends one view row. Returns false if the resource does not exist.
    // No de-duplication: every call counts.
    async fn record_view(&self, resource_id: Uuid, viewer_id: Option<Uuid>) -> Result<bool, RepoError>;
    async fn count_views(&self, resource_id: Uuid) -> Result<i64, RepoError>;

    // --- Universities ---
    async fn list_universities(&self) -> Result<Vec<University>, RepoError>;
    async fn get_university(&self, id: i32) -> Result<Option<University>, RepoError>;
    async fn get_university_by_slug(&self, slug: &str) -> Result<Option<University>, RepoError>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL. Queries are built at runtime so the crate
/// compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RESOURCE_COLUMNS: &str = "r.resource_id, r.uploader_id, r.course_code, r.semester, \
     r.university_id, r.title, r.description, r.file_url, r.mime_type, r.file_size, \
     r.resource_type, r.uploaded_at";

const UNIVERSITY_COLUMNS: &str =
    "id, name, slug, description, location, website, logo_url, is_official";

fn conflict_or(e: sqlx::Error, what: &str) -> RepoError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict(what.to_string()),
        _ => RepoError::Database(e),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, role, university_id FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let creds = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, email, role, university_id, password_hash FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }

    /// create_user
    ///
    /// New accounts always start with the 'student' role.
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        university_id: Option<i32>,
    ) -> Result<User, RepoError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, role, university_id)
            VALUES ($1, $2, $3, 'student', $4)
            RETURNING id, email, role, university_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(university_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "email"))
    }

    /// list_resources
    ///
    /// Filtered listing built with `QueryBuilder` so every user-supplied value is a
    /// bound parameter. Newest uploads first.
    async fn list_resources(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, RepoError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r \
             LEFT JOIN universities u ON u.id = r.university_id WHERE 1 = 1"
        ));

        if let Some(code) = &filter.course_code {
            builder.push(" AND r.course_code = ");
            builder.push_bind(code.clone());
        }
        if let Some(semester) = &filter.semester {
            builder.push(" AND r.semester = ");
            builder.push_bind(semester.clone());
        }
        if let Some(slug) = &filter.university {
            builder.push(" AND u.slug = ");
            builder.push_bind(slug.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search);
            builder.push(" AND (r.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR r.description ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY r.uploaded_at DESC LIMIT ");
        builder.push_bind(filter.page_size());

        let resources = builder
            .build_query_as::<Resource>()
            .fetch_all(&self.pool)
            .await?;
        Ok(resources)
    }

    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>, RepoError> {
        let resource = sqlx::query_as::<_, Resource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r WHERE r.resource_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(resource)
    }

    async fn get_resources_by_uploader(&self, uploader_id: Uuid) -> Result<Vec<Resource>, RepoError> {
        let resources = sqlx::query_as::<_, Resource>(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r WHERE r.uploader_id = $1 ORDER BY r.uploaded_at DESC"
        ))
        .bind(uploader_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(resources)
    }

    async fn create_resource(
        &self,
        req: CreateResourceRequest,
        uploader_id: Uuid,
    ) -> Result<Resource, RepoError> {
        let resource = sqlx::query_as::<_, Resource>(
            r#"
            INSERT INTO resources AS r (resource_id, uploader_id, course_code, semester, university_id,
                                        title, description, file_url, mime_type, file_size, resource_type, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            RETURNING r.resource_id, r.uploader_id, r.course_code, r.semester, r.university_id, r.title,
                      r.description, r.file_url, r.mime_type, r.file_size, r.resource_type, r.uploaded_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(uploader_id)
        .bind(req.course_code)
        .bind(req.semester)
        .bind(req.university_id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.file_url)
        .bind(req.mime_type)
        .bind(req.file_size)
        .bind(req.resource_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(resource)
    }

    /// record_view
    ///
    /// Conditional insert: the `WHERE EXISTS` keeps views for unknown ids out of the
    /// table without a separate round trip.
    async fn record_view(&self, resource_id: Uuid, viewer_id: Option<Uuid>) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO resource_views (resource_id, viewer_id, viewed_at)
            SELECT $1, $2, NOW()
            WHERE EXISTS (SELECT 1 FROM resources WHERE resource_id = $1)
            "#,
        )
        .bind(resource_id)
        .bind(viewer_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_views(&self, resource_id: Uuid) -> Result<i64, RepoError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM resource_views WHERE resource_id = $1")
                .bind(resource_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_universities(&self) -> Result<Vec<University>, RepoError> {
        let universities = sqlx::query_as::<_, University>(&format!(
            "SELECT {UNIVERSITY_COLUMNS} FROM universities ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(universities)
    }

    async fn get_university(&self, id: i32) -> Result<Option<University>, RepoError> {
        let university = sqlx::query_as::<_, University>(&format!(
            "SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(university)
    }

    async fn get_university_by_slug(&self, slug: &str) -> Result<Option<University>, RepoError> {
        let university = sqlx::query_as::<_, University>(&format!(
            "SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(university)
    }
}
