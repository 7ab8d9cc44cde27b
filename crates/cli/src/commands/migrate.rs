//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! emp-cli migrate storefront
//! emp-cli migrate admin
//! emp-cli migrate all
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for storefront
//! - `ADMIN_DATABASE_URL` - `PostgreSQL` connection string for admin
//!
//! Migration files live in `crates/storefront/migrations/` and
//! `crates/admin/migrations/` and are embedded at build time.

use super::{CommandError, admin_pool, storefront_pool};

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn storefront() -> Result<(), CommandError> {
    let pool = storefront_pool().await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete");
    Ok(())
}

/// Run admin database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn admin() -> Result<(), CommandError> {
    let pool = admin_pool().await?;

    tracing::info!("Running admin migrations...");
    sqlx::migrate!("../admin/migrations").run(&pool).await?;

    tracing::info!("Admin migrations complete");
    Ok(())
}
