//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness
//! GET  /health/ready                 - Database readiness
//!
//! # Auth
//! POST /api/auth/signup              - Create unverified account, email code
//! POST /api/auth/signup/resend       - Resend signup code
//! POST /api/auth/signup/verify       - Verify signup code
//! POST /api/auth/login               - Password login (lockout guarded)
//! POST /api/auth/logout              - Clear session
//! POST /api/auth/password/forgot     - Email a reset code
//! POST /api/auth/password/reset      - Reset password with code
//!
//! # Account (requires auth)
//! GET  /api/account                  - Current user's profile
//!
//! # Coupons
//! POST /api/coupons/validate         - Price a coupon against an order amount
//! ```

pub mod account;
pub mod auth;
pub mod coupons;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/signup/resend", post(auth::resend_signup_code))
        .route("/signup/verify", post(auth::verify_signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password/forgot", post(auth::forgot_password))
        .route("/password/reset", post(auth::reset_password))
}

/// Create all API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/api/auth", auth_routes())
        .route("/api/account", get(account::show))
        .route("/api/coupons/validate", post(coupons::validate))
}
