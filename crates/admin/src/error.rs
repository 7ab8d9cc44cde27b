//! Unified error handling for admin.
//!
//! Responses are JSON `{"error": <code>, "message": <text>}`. Lockout and
//! wrong-password responses add `retry_after_minutes` or `remaining_attempts`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use emporium_core::auth::AuthError;

use crate::db::RepositoryError;

/// Application-level error type for the admin API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Password check or token handling failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Internal(_) => true,
            Self::Auth(err) => err.is_internal(),
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        }

        let (status, body) = match &self {
            Self::Auth(AuthError::Locked {
                retry_after_minutes,
            }) => (
                StatusCode::LOCKED,
                json!({
                    "error": "locked",
                    "message": format!("Account locked. Try again in {retry_after_minutes} minutes."),
                    "retry_after_minutes": retry_after_minutes,
                }),
            ),
            Self::Auth(AuthError::InvalidPassword { remaining_attempts }) => (
                StatusCode::UNAUTHORIZED,
                json!({
                    "error": "invalid_password",
                    "message": format!("Invalid credentials. {remaining_attempts} attempts remaining before lockout."),
                    "remaining_attempts": remaining_attempts,
                }),
            ),
            Self::Auth(AuthError::RequestRequired(field)) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "request_required",
                    "message": format!("{field} is required"),
                }),
            ),
            Self::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "unauthorized", "message": msg }),
            ),
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "bad_request", "message": msg }),
            ),
            // Don't expose internal error details to clients
            Self::Database(_) | Self::Internal(_) | Self::Auth(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal", "message": "Internal server error" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for an admin.
pub fn set_sentry_user(admin_user_id: i32, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(admin_user_id.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}
