//! Verification code maintenance.
//!
//! `PostgreSQL` has no TTL index, so expired codes are swept explicitly.
//! Run `emp-cli otp purge` from cron.

use chrono::Utc;
use emporium_storefront::db::OtpRepository;

use super::{CommandError, storefront_pool};

/// Delete every expired verification code.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn purge() -> Result<u64, CommandError> {
    let pool = storefront_pool().await?;
    let removed = OtpRepository::new(&pool).remove_expired(Utc::now()).await?;

    tracing::info!(removed, "Expired verification codes purged");
    Ok(removed)
}
