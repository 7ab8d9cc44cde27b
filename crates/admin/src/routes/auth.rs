//! Authentication route handlers for admin.
//!
//! Password login through the shared lockout guard. A successful login sets
//! the `admin_token` and `admin_id` cookies; there is no server-side session.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use emporium_core::auth::AuthError;

use crate::db::AdminUserRepository;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAdminAuth, clear_cookies, session_cookies};
use crate::models::AdminProfile;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/me", get(me))
}

/// `POST /api/auth/login`
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AdminProfile>)> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(AuthError::RequestRequired("username").into());
    }
    if body.password.is_empty() {
        return Err(AuthError::RequestRequired("password").into());
    }

    let repo = AdminUserRepository::new(state.pool());
    let admin = repo
        .get_by_username(username)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid username or password".to_string()))?;

    let now = state.clock().now();
    state
        .guard()
        .verify(&repo, &admin.credential(), &body.password, now)
        .await?;

    let token = state.signer().issue(now);
    let jar = session_cookies(jar, token, admin.id, state.config().is_secure());

    set_sentry_user(admin.id.as_i32(), &admin.username);
    tracing::info!(admin_id = %admin.id, "Admin logged in");

    Ok((jar, Json(admin.into())))
}

/// `POST /api/auth/logout`
async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    clear_sentry_user();
    (
        clear_cookies(jar),
        Json(MessageResponse {
            message: "Signed out",
        }),
    )
}

/// `GET /api/me`
async fn me(RequireAdminAuth(admin): RequireAdminAuth) -> Json<AdminProfile> {
    Json(admin.into())
}
