//! Account route handlers.
//!
//! These routes require authentication.

use axum::{Json, extract::State};

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::UserProfile;
use crate::state::AppState;

/// `GET /api/account`
///
/// Reads the profile fresh from the database so a deleted account stops
/// resolving even while its session cookie is still valid.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<UserProfile>> {
    let account = UserRepository::new(state.pool())
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Sign in to continue".to_string()))?;

    Ok(Json(account.into()))
}
