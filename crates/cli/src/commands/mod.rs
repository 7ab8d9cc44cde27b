//! Subcommand implementations.

pub mod admin;
pub mod coupon;
pub mod migrate;
pub mod otp;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors shared by every command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Auth(#[from] emporium_core::auth::AuthError),

    #[error("Admin database: {0}")]
    AdminRepository(#[from] emporium_admin::db::RepositoryError),

    #[error("Storefront database: {0}")]
    StorefrontRepository(#[from] emporium_storefront::db::RepositoryError),
}

/// Database URL from `primary`, falling back to `DATABASE_URL`.
fn database_url(primary: &'static str) -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();
    std::env::var(primary)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar(primary))
}

/// Connect to the storefront database.
async fn storefront_pool() -> Result<PgPool, CommandError> {
    let url = database_url("STOREFRONT_DATABASE_URL")?;
    tracing::info!("Connecting to storefront database...");
    Ok(emporium_storefront::db::create_pool(&url).await?)
}

/// Connect to the admin database.
async fn admin_pool() -> Result<PgPool, CommandError> {
    let url = database_url("ADMIN_DATABASE_URL")?;
    tracing::info!("Connecting to admin database...");
    Ok(emporium_admin::db::create_pool(&url).await?)
}
