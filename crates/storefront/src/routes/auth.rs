//! Customer authentication API.
//!
//! Signup is a two-step flow: `signup` stores an unverified account and emails
//! a six-digit code, `signup/verify` consumes it. Login refuses unverified
//! accounts and runs through the lockout guard. Password reset reuses the same
//! code machinery under the `forgot-password` purpose.
//!
//! Request fields default to empty strings so that a missing field surfaces as
//! `request_required` from the account service rather than a body rejection.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use emporium_core::auth::{AccountService, CodeDispatcher, CodeSent};

use crate::db::{OtpRepository, UserRepository};
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::{CurrentUser, UserProfile};
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub password: String,
}

/// Returned whenever a code was emailed.
#[derive(Debug, Serialize)]
pub struct CodeSentResponse {
    pub email: String,
    pub next_resend_seconds: i64,
}

impl From<CodeSent> for CodeSentResponse {
    fn from(sent: CodeSent) -> Self {
        Self {
            email: sent.email.into_inner(),
            next_resend_seconds: sent.next_resend_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

// =============================================================================
// Service wiring
// =============================================================================

/// Per-request repositories the account service borrows.
struct Repos<'a> {
    users: UserRepository<'a>,
    otp: OtpRepository<'a>,
}

impl<'a> Repos<'a> {
    fn new(state: &'a AppState) -> Self {
        Self {
            users: UserRepository::new(state.pool()),
            otp: OtpRepository::new(state.pool()),
        }
    }

    fn service(
        &'a self,
        state: &'a AppState,
    ) -> AccountService<'a, UserRepository<'a>, OtpRepository<'a>, dyn CodeDispatcher + 'a> {
        AccountService::new(&self.users, &self.otp, state.dispatcher(), state.clock())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /api/auth/signup`
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<CodeSentResponse>)> {
    let repos = Repos::new(&state);
    let sent = repos
        .service(&state)
        .signup(&body.email, body.name.as_deref(), &body.password)
        .await?;

    Ok((StatusCode::CREATED, Json(sent.into())))
}

/// `POST /api/auth/signup/resend`
pub async fn resend_signup_code(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<CodeSentResponse>> {
    let repos = Repos::new(&state);
    let sent = repos.service(&state).resend_signup_code(&body.email).await?;

    Ok(Json(sent.into()))
}

/// `POST /api/auth/signup/verify`
///
/// Verifying does not log the user in; they sign in with their password next.
pub async fn verify_signup(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<UserProfile>> {
    let repos = Repos::new(&state);
    let account = repos
        .service(&state)
        .verify_signup(&body.email, &body.code)
        .await?;

    Ok(Json(account.into()))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserProfile>> {
    let repos = Repos::new(&state);
    let account = repos
        .service(&state)
        .login(&body.email, &body.password)
        .await?;

    let current = CurrentUser {
        id: account.id,
        email: account.email.clone(),
    };
    set_current_user(&session, &current).await?;
    set_sentry_user(&current.id, Some(current.email.as_str()));

    tracing::info!(user_id = %current.id, "User logged in");
    Ok(Json(account.into()))
}

/// `POST /api/auth/logout`
pub async fn logout(session: Session) -> Result<Json<MessageResponse>> {
    clear_current_user(&session).await?;
    clear_sentry_user();

    Ok(Json(MessageResponse {
        message: "Signed out",
    }))
}

/// `POST /api/auth/password/forgot`
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> Result<Json<CodeSentResponse>> {
    let repos = Repos::new(&state);
    let sent = repos
        .service(&state)
        .request_password_reset(&body.email)
        .await?;

    Ok(Json(sent.into()))
}

/// `POST /api/auth/password/reset`
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>> {
    let repos = Repos::new(&state);
    repos
        .service(&state)
        .reset_password(&body.email, &body.code, &body.password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password updated. Sign in with your new password.",
    }))
}
