//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Error bodies are JSON: `{"error": <code>, "message": <text>}` plus the
//! number the client needs to act on, for example `remaining_seconds` on a
//! resend cooldown or `remaining_attempts` on a wrong code.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use emporium_core::auth::AuthError;
use emporium_core::coupon::CouponError;

use crate::db::RepositoryError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Coupon could not be applied.
    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// User is not authenticated.
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
    /// Whether this is a server-side failure that should be reported.
    const fn is_server_error(&self) -> bool {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => true,
            Self::Auth(err) => err.is_internal(),
            _ => false,
        }
    }

    /// Status code, error code, client-safe message, and extra fields.
    #[allow(clippy::too_many_lines)]
    fn parts(&self) -> (StatusCode, &'static str, String, Map<String, Value>) {
        let mut extra = Map::new();

        let (status, code, message) = match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal server error".to_string(),
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::Auth(err) => match err {
                AuthError::RequestRequired(field) => (
                    StatusCode::BAD_REQUEST,
                    "request_required",
                    format!("{field} is required"),
                ),
                AuthError::InvalidEmail(_) => (
                    StatusCode::BAD_REQUEST,
                    "invalid_email",
                    "Invalid email address".to_string(),
                ),
                AuthError::WeakPassword(msg) => {
                    (StatusCode::BAD_REQUEST, "weak_password", msg.clone())
                }
                AuthError::TooManyRequests { remaining_seconds } => {
                    extra.insert("remaining_seconds".into(), json!(remaining_seconds));
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        "too_many_requests",
                        format!("Please wait {remaining_seconds} seconds before requesting another code"),
                    )
                }
                AuthError::NotFound => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "No matching account or pending code. Request a new code.".to_string(),
                ),
                AuthError::Expired => (
                    StatusCode::GONE,
                    "expired",
                    "This code has expired. Request a new code.".to_string(),
                ),
                AuthError::Exhausted => (
                    StatusCode::GONE,
                    "exhausted",
                    "Too many incorrect attempts. Request a new code.".to_string(),
                ),
                AuthError::Mismatch { remaining_attempts } => {
                    extra.insert("remaining_attempts".into(), json!(remaining_attempts));
                    (
                        StatusCode::BAD_REQUEST,
                        "mismatch",
                        format!("Incorrect code. {remaining_attempts} attempts remaining."),
                    )
                }
                AuthError::Locked {
                    retry_after_minutes,
                } => {
                    extra.insert("retry_after_minutes".into(), json!(retry_after_minutes));
                    (
                        StatusCode::LOCKED,
                        "locked",
                        format!(
                            "Too many failed logins. Try again in {retry_after_minutes} minutes."
                        ),
                    )
                }
                AuthError::InvalidPassword { remaining_attempts } => {
                    extra.insert("remaining_attempts".into(), json!(remaining_attempts));
                    (
                        StatusCode::UNAUTHORIZED,
                        "invalid_password",
                        format!(
                            "Invalid credentials. {remaining_attempts} attempts remaining before lockout."
                        ),
                    )
                }
                AuthError::Unverified => (
                    StatusCode::FORBIDDEN,
                    "unverified",
                    "Verify your email address before signing in".to_string(),
                ),
                AuthError::AlreadyRegistered => (
                    StatusCode::CONFLICT,
                    "already_registered",
                    "An account with this email already exists".to_string(),
                ),
                AuthError::Dispatch(_) => (
                    StatusCode::BAD_GATEWAY,
                    "dispatch_failed",
                    "We could not send the email. Please try again.".to_string(),
                ),
                AuthError::Store(_) | AuthError::PasswordHash => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                ),
            },
            Self::Coupon(err) => {
                let code = match err {
                    CouponError::NotFound => "coupon_not_found",
                    CouponError::Inactive => "coupon_inactive",
                    CouponError::NotStarted => "coupon_not_started",
                    CouponError::Expired => "coupon_expired",
                    CouponError::UsageLimitReached => "coupon_usage_limit",
                    CouponError::BelowMinimum { minimum } => {
                        extra.insert("minimum".into(), json!(minimum.to_string()));
                        "coupon_below_minimum"
                    }
                    CouponError::InvalidOrderAmount => "invalid_order_amount",
                    CouponError::OrderAmountTooLarge => "order_amount_too_large",
                };
                let status = if matches!(err, CouponError::NotFound) {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::UNPROCESSABLE_ENTITY
                };
                (status, code, err.to_string())
            }
        };

        (status, code, message, extra)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let (status, code, message, extra) = self.parts();

        let mut body = Map::new();
        body.insert("error".into(), json!(code));
        body.insert("message".into(), json!(message));
        body.extend(extra);

        let mut response = (status, Json(Value::Object(body))).into_response();

        if let Self::Auth(AuthError::TooManyRequests { remaining_seconds }) = &self
            && let Ok(value) = HeaderValue::from_str(&remaining_seconds.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use emporium_core::auth::{DispatchError, StoreError};
    use rust_decimal::Decimal;

    fn body_of(err: AppError) -> (StatusCode, Value) {
        let (status, code, message, extra) = err.parts();
        let mut body = Map::new();
        body.insert("error".into(), json!(code));
        body.insert("message".into(), json!(message));
        body.extend(extra);
        (status, Value::Object(body))
    }

    #[test]
    fn test_cooldown_carries_wait_time() {
        let (status, body) = body_of(AppError::Auth(AuthError::TooManyRequests {
            remaining_seconds: 42,
        }));
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "too_many_requests");
        assert_eq!(body["remaining_seconds"], 42);
    }

    #[test]
    fn test_retry_after_header() {
        let response = AppError::Auth(AuthError::TooManyRequests {
            remaining_seconds: 42,
        })
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_mismatch_and_lockout_carry_counts() {
        let (status, body) = body_of(AppError::Auth(AuthError::Mismatch {
            remaining_attempts: 3,
        }));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["remaining_attempts"], 3);

        let (status, body) = body_of(AppError::Auth(AuthError::Locked {
            retry_after_minutes: 15,
        }));
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(body["retry_after_minutes"], 15);

        let (status, body) = body_of(AppError::Auth(AuthError::InvalidPassword {
            remaining_attempts: 1,
        }));
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["remaining_attempts"], 1);
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let (status, body) = body_of(AppError::Auth(AuthError::Dispatch(DispatchError(
            "535 authentication failed for relay.mailhost.test".into(),
        ))));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(!body.to_string().contains("relay.mailhost.test"));

        let (status, body) = body_of(AppError::Auth(AuthError::Store(StoreError::Backend(
            "connection refused".into(),
        ))));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("connection refused"));
    }

    #[test]
    fn test_coupon_minimum_is_named() {
        let (status, body) = body_of(AppError::Coupon(CouponError::BelowMinimum {
            minimum: Decimal::from(1500),
        }));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["minimum"], "1500");
    }

    #[test]
    fn test_oversized_order_amount_is_a_client_error() {
        let (status, body) = body_of(AppError::Coupon(CouponError::OrderAmountTooLarge));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "order_amount_too_large");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            body_of(AppError::Unauthorized("test".into())).0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            body_of(AppError::Auth(AuthError::Unverified)).0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            body_of(AppError::Auth(AuthError::AlreadyRegistered)).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            body_of(AppError::Coupon(CouponError::NotFound)).0,
            StatusCode::NOT_FOUND
        );
    }
}
