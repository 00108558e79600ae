/// Router Module Index
///
/// JSON API routes are split by who may call them; access control is applied at
/// the router level so an endpoint cannot be exposed by accident. HTML pages live
/// in their own router because their guards redirect instead of rejecting.

/// JSON routes open to anyone. Handlers may still read an optional session.
pub mod public;

/// JSON routes behind the `AuthUser` middleware.
pub mod authenticated;

/// Server-rendered pages: login, register and the guarded dashboard.
pub mod pages;
