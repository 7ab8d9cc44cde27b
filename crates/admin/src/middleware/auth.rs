//! Admin authentication extractor and cookie helpers.

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use emporium_core::AdminUserId;

use crate::db::AdminUserRepository;
use crate::error::AppError;
use crate::models::AdminUser;
use crate::state::AppState;

/// Signed session token cookie.
pub const ADMIN_TOKEN_COOKIE: &str = "admin_token";

/// Companion cookie naming the admin the token was issued to.
pub const ADMIN_ID_COOKIE: &str = "admin_id";

/// Cookie lifetime.
const SESSION_HOURS: i64 = 4;

/// Extractor that requires an authenticated admin.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAdminAuth(admin): RequireAdminAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", admin.username)
/// }
/// ```
pub struct RequireAdminAuth(pub AdminUser);

impl FromRequestParts<AppState> for RequireAdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Unauthorized("Admin login required".to_string());
        let jar = CookieJar::from_headers(&parts.headers);

        let token = jar.get(ADMIN_TOKEN_COOKIE).ok_or_else(unauthorized)?;
        if !state.signer().verify(token.value()) {
            tracing::debug!("rejected admin token");
            return Err(unauthorized());
        }

        let id = jar
            .get(ADMIN_ID_COOKIE)
            .and_then(|c| c.value().parse::<i32>().ok())
            .map(AdminUserId::new)
            .ok_or_else(unauthorized)?;

        let admin = AdminUserRepository::new(state.pool())
            .get_by_id(id)
            .await?
            .ok_or_else(unauthorized)?;

        Ok(Self(admin))
    }
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(SESSION_HOURS))
        .path("/")
        .build()
}

/// Add the token and id cookies for a freshly authenticated admin.
#[must_use]
pub fn session_cookies(jar: CookieJar, token: String, id: AdminUserId, secure: bool) -> CookieJar {
    jar.add(session_cookie(ADMIN_TOKEN_COOKIE, token, secure))
        .add(session_cookie(ADMIN_ID_COOKIE, id.to_string(), secure))
}

/// Expire both session cookies.
#[must_use]
pub fn clear_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ADMIN_TOKEN_COOKIE).path("/"))
        .remove(Cookie::build(ADMIN_ID_COOKIE).path("/"))
}
