//! Page-level route guard.
//!
//! A guard decides, before anything is rendered, whether the viewer may see a page.
//! The page body is produced by a closure the guard only calls once access is
//! granted, so a redirect never carries partial content.

use axum::response::{IntoResponse, Redirect, Response};
use std::future::Future;

use crate::{auth::SessionContext, config::RoutePaths, models::User};

/// Access
///
/// Who a page is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Login and register: signed-in viewers are sent to the dashboard.
    PublicOnly,
    /// Dashboard pages: anonymous viewers are sent to login.
    Protected,
}

/// GuardDecision
///
/// Terminal state of a guard check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Render(Option<User>),
    Redirect(String),
}

/// Decides access for `session` on a page requested at `requested`.
///
/// Protected redirects carry the requested path as `next` so the login form can
/// return the viewer there.
pub fn decide(
    access: Access,
    session: &SessionContext,
    paths: &RoutePaths,
    requested: &str,
) -> GuardDecision {
    match (access, &session.user) {
        (Access::PublicOnly, Some(_)) => GuardDecision::Redirect(paths.dashboard.clone()),
        (Access::Protected, None) => GuardDecision::Redirect(login_redirect(paths, requested)),
        (_, user) => GuardDecision::Render(user.clone()),
    }
}

fn login_redirect(paths: &RoutePaths, requested: &str) -> String {
    if requested.is_empty() || requested == paths.dashboard {
        paths.login.clone()
    } else {
        format!("{}?next={}", paths.login, urlencoding::encode(requested))
    }
}

/// Returns `next` when it is a same-site relative path, otherwise the dashboard.
///
/// Rejects absolute and protocol-relative URLs (`//host`, `/\host`) so a crafted
/// login link cannot bounce the viewer off-site. Anything outside printable ASCII
/// is rejected as well, since it cannot be sent back in a `Location` header.
pub fn safe_next(next: Option<&str>, paths: &RoutePaths) -> String {
    match next {
        Some(n)
            if n.starts_with('/')
                && !n.starts_with("//")
                && !n.starts_with("/\\")
                && n.chars().all(|c| c.is_ascii_graphic())
                && n != paths.login
                && n != paths.register =>
        {
            n.to_string()
        }
        _ => paths.dashboard.clone(),
    }
}

/// guarded
///
/// Runs the guard for a page and, only if access is granted, awaits `render` with
/// the viewer. Redirects are 307 so the browser repeats the original GET.
///
/// `render` errors are returned untouched for the page error boundary.
pub async fn guarded<F, Fut, R, E>(
    access: Access,
    session: &SessionContext,
    paths: &RoutePaths,
    requested: &str,
    render: F,
) -> Result<Response, E>
where
    F: FnOnce(Option<User>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    R: IntoResponse,
{
    match decide(access, session, paths, requested) {
        GuardDecision::Redirect(to) => {
            tracing::debug!(?access, requested, redirect = %to, "guard redirected");
            Ok(Redirect::temporary(&to).into_response())
        }
        GuardDecision::Render(user) => render(user).await.map(IntoResponse::into_response),
    }
}
