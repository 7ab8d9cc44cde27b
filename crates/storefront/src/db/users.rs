//! User repository for database operations.
//!
//! Backs the account flows in `emporium_core::auth` through the
//! [`AccountStore`] and [`LockoutStore`] traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use emporium_core::auth::{Account, AccountStore, LockState, LockoutStore, NewAccount, StoreError};
use emporium_core::{Email, UserId};

use super::{RepositoryError, conflict_or_database};

const USER_COLUMNS: &str = "id, email, name, password_hash, email_verified, \
                            failed_attempts, locked_until, created_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    name: Option<String>,
    password_hash: String,
    email_verified: bool,
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for Account<UserId> {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            name: row.name,
            verified: row.email_verified,
            password_hash: row.password_hash,
            lock: LockState {
                failed_attempts: row.failed_attempts,
                locked_until: row.locked_until,
            },
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<Account<UserId>>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<Account<UserId>>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM storefront.user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Create a user pending email verification.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, account: &NewAccount) -> Result<UserId, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.user (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(account.email.as_str())
        .bind(account.name.as_deref())
        .bind(&account.password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "email"))?;

        Ok(UserId::new(id))
    }

    /// Overwrite the name and password hash of a user that has not verified yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no unverified user has this ID.
    pub async fn update_pending(
        &self,
        id: UserId,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.user
            SET name = $2, password_hash = $3, updated_at = NOW()
            WHERE id = $1 AND email_verified = FALSE
            ",
        )
        .bind(id)
        .bind(name)
        .bind(password_hash)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark a user's email as verified.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_verified(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE storefront.user SET email_verified = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Replace the password hash and clear lockout state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_password(
        &self,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE storefront.user
            SET password_hash = $2, failed_attempts = 0, locked_until = NULL, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Persist lockout counters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_lock_state(
        &self,
        id: UserId,
        state: &LockState,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE storefront.user
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
impl LockoutStore for UserRepository<'_> {
    type Id = UserId;

    async fn save_lock_state(&self, id: &UserId, state: &LockState) -> Result<(), StoreError> {
        Ok(self.update_lock_state(*id, state).await?)
    }
}

#[async_trait]
impl AccountStore for UserRepository<'_> {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Account<UserId>>, StoreError> {
        Ok(self.get_by_email(email).await?)
    }

    async fn create_unverified(&self, account: &NewAccount) -> Result<UserId, StoreError> {
        Ok(self.create(account).await?)
    }

    async fn update_pending_credentials(
        &self,
        id: &UserId,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        Ok(self.update_pending(*id, name, password_hash).await?)
    }

    async fn mark_verified(&self, id: &UserId) -> Result<(), StoreError> {
        Ok(self.set_verified(*id).await?)
    }

    async fn set_password(&self, id: &UserId, password_hash: &str) -> Result<(), StoreError> {
        Ok(self.update_password(*id, password_hash).await?)
    }
}
