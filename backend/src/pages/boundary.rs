use std::{future::Future, time::Duration};

use super::markup::Markup;
use crate::error::AppError;

/// Boundary
///
/// A deferred-content region. It owns a skeleton shaped like the content it stands in
/// for and resolves to exactly one of the two: the finished content, or (if the content
/// is not ready within `timeout`) the skeleton. Errors from the content propagate
/// unchanged to the page error boundary.
pub struct Boundary {
    name: &'static str,
    fallback: Markup,
    timeout: Duration,
}

/// Resolved
///
/// What a boundary produced. `pending` is true when the skeleton was served; the page
/// then asks the browser to refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub markup: Markup,
    pub pending: bool,
}

impl Boundary {
    pub fn new(name: &'static str, fallback: Markup, timeout: Duration) -> Self {
        Self {
            name,
            fallback,
            timeout,
        }
    }

    pub async fn resolve<F>(self, content: F) -> Result<Resolved, AppError>
    where
        F: Future<Output = Result<Markup, AppError>>,
    {
        match tokio::time::timeout(self.timeout, content).await {
            Ok(Ok(markup)) => Ok(Resolved {
                markup: self.wrap(markup, "ready"),
                pending: false,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!(
                    boundary = self.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "deferred content timed out, serving skeleton"
                );
                let fallback = self.fallback.clone();
                Ok(Resolved {
                    markup: self.wrap(fallback, "pending"),
                    pending: true,
                })
            }
        }
    }

    fn wrap(&self, inner: Markup, state: &str) -> Markup {
        Markup::raw(format!(
            "<section data-boundary=\"{}\" data-state=\"{}\">{}</section>",
            self.name, state, inner
        ))
    }
}

/// Seconds the browser waits before re-requesting a page that served a skeleton.
pub const PENDING_REFRESH_SECS: u64 = 2;
