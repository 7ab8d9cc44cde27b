//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! emp-cli admin create -u ops -p 'correct horse battery staple'
//! ```
//!
//! # Environment Variables
//!
//! - `ADMIN_DATABASE_URL` - `PostgreSQL` connection string for admin database

use emporium_admin::db::AdminUserRepository;
use emporium_core::AdminUserId;
use emporium_core::auth::{hash_password, validate_password};

use super::{CommandError, admin_pool};

/// Validate a username: non-blank, no surrounding whitespace.
fn validate_username(username: &str) -> Result<&str, CommandError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(CommandError::InvalidArgument(
            "username must not be blank".to_string(),
        ));
    }
    if trimmed != username {
        return Err(CommandError::InvalidArgument(
            "username must not start or end with whitespace".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Create a new admin user.
///
/// # Errors
///
/// Returns an error if the username is blank, the password is too short,
/// or the username is already taken.
pub async fn create_user(username: &str, password: &str) -> Result<AdminUserId, CommandError> {
    let username = validate_username(username)?;
    validate_password(password)?;
    let password_hash = hash_password(password)?;

    let pool = admin_pool().await?;
    let id = AdminUserRepository::new(&pool)
        .create(username, &password_hash)
        .await?;

    tracing::info!(admin_id = %id, username, "Admin user created");
    Ok(id)
}
