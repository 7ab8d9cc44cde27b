//! OTP code repository.
//!
//! The `(identity, purpose)` primary key gives one live row per pair. Writes
//! are conditional on `last_sent_at`, so two overlapping resends cannot both
//! succeed; the loser re-reads and sees the new cooldown.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use emporium_core::auth::{OtpKey, OtpRecord, OtpStore, StoreError};
use emporium_core::{Email, OtpPurpose};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct OtpRow {
    identity: String,
    purpose: String,
    code: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
    last_sent_at: DateTime<Utc>,
    resend_count: i32,
}

impl TryFrom<OtpRow> for OtpRecord {
    type Error = RepositoryError;

    fn try_from(row: OtpRow) -> Result<Self, Self::Error> {
        let identity = Email::parse(&row.identity).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid otp identity in database: {e}"))
        })?;
        let purpose = row
            .purpose
            .parse::<OtpPurpose>()
            .map_err(RepositoryError::DataCorruption)?;

        Ok(Self {
            identity,
            purpose,
            code: row.code,
            expires_at: row.expires_at,
            attempts: row.attempts,
            last_sent_at: row.last_sent_at,
            resend_count: row.resend_count,
        })
    }
}

/// Repository for `storefront.otp_code`.
pub struct OtpRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OtpRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the live code for a key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, key: &OtpKey) -> Result<Option<OtpRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, OtpRow>(
            r"
            SELECT identity, purpose, code, expires_at, attempts, last_sent_at, resend_count
            FROM storefront.otp_code
            WHERE identity = $1 AND purpose = $2
            ",
        )
        .bind(key.identity.as_str())
        .bind(key.purpose.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert a code only if none exists for its key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn insert_new(&self, record: &OtpRecord) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO storefront.otp_code
                (identity, purpose, code, expires_at, attempts, last_sent_at, resend_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (identity, purpose) DO NOTHING
            ",
        )
        .bind(record.identity.as_str())
        .bind(record.purpose.as_str())
        .bind(&record.code)
        .bind(record.expires_at)
        .bind(record.attempts)
        .bind(record.last_sent_at)
        .bind(record.resend_count)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Replace a code if the stored row was last sent at `expected_last_sent_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn replace_if_unchanged(
        &self,
        record: &OtpRecord,
        expected_last_sent_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.otp_code
            SET code = $3, expires_at = $4, attempts = $5, last_sent_at = $6, resend_count = $7
            WHERE identity = $1 AND purpose = $2 AND last_sent_at = $8
            ",
        )
        .bind(record.identity.as_str())
        .bind(record.purpose.as_str())
        .bind(&record.code)
        .bind(record.expires_at)
        .bind(record.attempts)
        .bind(record.last_sent_at)
        .bind(record.resend_count)
        .bind(expected_last_sent_at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Bump the failed-attempt counter in one statement.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn bump_attempts(&self, key: &OtpKey) -> Result<Option<i32>, RepositoryError> {
        let attempts = sqlx::query_scalar::<_, i32>(
            r"
            UPDATE storefront.otp_code
            SET attempts = attempts + 1
            WHERE identity = $1 AND purpose = $2
            RETURNING attempts
            ",
        )
        .bind(key.identity.as_str())
        .bind(key.purpose.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(attempts)
    }

    /// Delete the code for a key.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove(&self, key: &OtpKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM storefront.otp_code WHERE identity = $1 AND purpose = $2")
            .bind(key.identity.as_str())
            .bind(key.purpose.as_str())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete every code that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM storefront.otp_code WHERE expires_at < $1")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OtpStore for OtpRepository<'_> {
    async fn find(&self, key: &OtpKey) -> Result<Option<OtpRecord>, StoreError> {
        Ok(self.get(key).await?)
    }

    async fn insert_or_replace(
        &self,
        record: &OtpRecord,
        expected_last_sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let written = match expected_last_sent_at {
            None => self.insert_new(record).await?,
            Some(expected) => self.replace_if_unchanged(record, expected).await?,
        };
        Ok(written)
    }

    async fn increment_attempts(&self, key: &OtpKey) -> Result<Option<i32>, StoreError> {
        Ok(self.bump_attempts(key).await?)
    }

    async fn delete(&self, key: &OtpKey) -> Result<(), StoreError> {
        Ok(self.remove(key).await?)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.remove_expired(now).await?)
    }
}
