//! Admin user repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use emporium_core::AdminUserId;
use emporium_core::auth::{LockState, LockoutStore, StoreError};

use super::RepositoryError;
use crate::models::AdminUser;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AdminUserRow {
    id: i32,
    username: String,
    password_hash: String,
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<AdminUserRow> for AdminUser {
    fn from(row: AdminUserRow) -> Self {
        Self {
            id: AdminUserId::new(row.id),
            username: row.username,
            password_hash: row.password_hash,
            lock: LockState {
                failed_attempts: row.failed_attempts,
                locked_until: row.locked_until,
            },
            created_at: row.created_at,
        }
    }
}

const ADMIN_COLUMNS: &str =
    "id, username, password_hash, failed_attempts, locked_until, created_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for admin user database operations.
pub struct AdminUserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AdminUserRepository<'a> {
    /// Create a new admin user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an admin user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: AdminUserId) -> Result<Option<AdminUser>, RepositoryError> {
        let row = sqlx::query_as::<_, AdminUserRow>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin.admin_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get an admin user by username.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminUser>, RepositoryError> {
        let row = sqlx::query_as::<_, AdminUserRow>(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin.admin_user WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Create a new admin user with an already-hashed password.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username is taken.
    #[instrument(skip(self, password_hash))]
    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<AdminUserId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO admin.admin_user (username, password_hash)
            VALUES ($1, $2)
            RETURNING id
            ",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(format!("username {username} already exists"));
            }
            RepositoryError::Database(e)
        })?;

        Ok(AdminUserId::new(id))
    }

    /// Persist lockout counters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_lock_state(
        &self,
        id: AdminUserId,
        state: &LockState,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE admin.admin_user
            SET failed_attempts = $2, locked_until = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(state.failed_attempts)
        .bind(state.locked_until)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LockoutStore for AdminUserRepository<'_> {
    type Id = AdminUserId;

    async fn save_lock_state(&self, id: &AdminUserId, state: &LockState) -> Result<(), StoreError> {
        Ok(self.update_lock_state(*id, state).await?)
    }
}
