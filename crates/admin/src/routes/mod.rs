//! HTTP route handlers for admin.
//!
//! ```text
//! GET  /health             - Liveness
//! GET  /health/ready       - Database readiness
//! POST /api/auth/login     - Password login, sets admin cookies
//! POST /api/auth/logout    - Expire admin cookies
//! GET  /api/me             - Current admin (token + live admin check)
//! ```

pub mod auth;

use axum::Router;

use crate::state::AppState;

/// Create all admin routes.
pub fn routes() -> Router<AppState> {
    Router::new().merge(auth::router())
}
