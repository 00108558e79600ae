//! Resource view tracking.
//!
//! `ViewSink` is the tracking action: it records that a resource was viewed.
//! `ViewTracker` is the invisible component a page mounts: it dispatches one
//! fire-and-forget call per distinct resource identifier and renders nothing.

use async_trait::async_trait;
use std::{fmt, sync::Arc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{error::TrackingError, pages::markup::Markup, repository::RepositoryState};

/// ResourceId
///
/// Non-empty identifier of the resource being viewed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Returns `None` for an empty or all-whitespace identifier.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() { None } else { Some(Self(id)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for ResourceId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ViewSink
///
/// The tracking collaborator. Implementations own retries and de-duplication, if
/// they want either; callers never await or inspect the outcome beyond logging.
#[async_trait]
pub trait ViewSink: Send + Sync {
    async fn track_view(&self, resource_id: &ResourceId, viewer_id: Option<Uuid>) -> Result<(), TrackingError>;
}

/// TrackerState
///
/// Shared handle to the configured sink, stored in `AppState`.
pub type TrackerState = Arc<dyn ViewSink>;

/// RepositoryViewSink
///
/// Records views straight into the database. Unknown ids are dropped with a debug
/// log; every other call appends a row.
pub struct RepositoryViewSink {
    repo: RepositoryState,
}

impl RepositoryViewSink {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ViewSink for RepositoryViewSink {
    async fn track_view(&self, resource_id: &ResourceId, viewer_id: Option<Uuid>) -> Result<(), TrackingError> {
        let Ok(id) = Uuid::parse_str(resource_id.as_str()) else {
            tracing::debug!(%resource_id, "ignoring view for non-uuid resource id");
            return Ok(());
        };
        if !self.repo.record_view(id, viewer_id).await? {
            tracing::debug!(%resource_id, "ignoring view for unknown resource");
        }
        Ok(())
    }
}

/// HttpViewSink
///
/// Posts views to a remote tracking endpoint (`{base}/api/resources/{id}/views`),
/// e.g. a separate analytics deployment of this service. The viewer is not
/// forwarded; the remote side only counts anonymous views.
pub struct HttpViewSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpViewSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ViewSink for HttpViewSink {
    async fn track_view(&self, resource_id: &ResourceId, _viewer_id: Option<Uuid>) -> Result<(), TrackingError> {
        let url = format!("{}/api/resources/{}/views", self.base_url, resource_id);
        let response = self
            .client
            .post(url)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TrackingError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// ViewTracker
///
/// A view-tracking subscription keyed by resource identifier. Each `observe` with
/// an identifier different from the last one dispatches exactly one call to the
/// sink; repeating the same identifier dispatches nothing. A fresh tracker (a new
/// mount) starts with no identifier, so remounting tracks again.
///
/// Calls run on a spawned task. Their failure is logged and dropped, never retried,
/// and never reaches the page.
pub struct ViewTracker {
    sink: TrackerState,
    viewer_id: Option<Uuid>,
    current: Option<ResourceId>,
}

impl ViewTracker {
    pub fn mount(sink: TrackerState, viewer_id: Option<Uuid>) -> Self {
        Self {
            sink,
            viewer_id,
            current: None,
        }
    }

    /// The identifier most recently dispatched, if any.
    pub fn current(&self) -> Option<&ResourceId> {
        self.current.as_ref()
    }

    /// observe
    ///
    /// Applies `resource_id` to the subscription. Returns the handle of the dispatched
    /// call, or `None` when the identifier did not change. The handle is only useful
    /// to tests; pages drop it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn observe(&mut self, resource_id: &ResourceId) -> Option<JoinHandle<()>> {
        if self.current.as_ref() == Some(resource_id) {
            return None;
        }
        self.current = Some(resource_id.clone());

        let sink = self.sink.clone();
        let viewer_id = self.viewer_id;
        let resource_id = resource_id.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = sink.track_view(&resource_id, viewer_id).await {
                tracing::warn!(%resource_id, "view tracking failed: {e}");
            }
        }))
    }

    /// render
    ///
    /// Observes `resource_id` and returns the component's markup, which is always empty.
    pub fn render(&mut self, resource_id: &ResourceId) -> Markup {
        let _ = self.observe(resource_id);
        Markup::empty()
    }
}
