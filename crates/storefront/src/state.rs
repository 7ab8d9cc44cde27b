//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use emporium_core::auth::{Clock, CodeDispatcher, SystemClock};

use crate::config::StorefrontConfig;
use crate::services::EmailService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration. The email
/// dispatcher and clock are built once at startup and injected here.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    dispatcher: Arc<dyn CodeDispatcher>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create application state with the SMTP dispatcher and the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP relay configuration is invalid.
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
    ) -> Result<Self, lettre::transport::smtp::Error> {
        let email = EmailService::new(&config.email)?;
        Ok(Self::with_collaborators(
            config,
            pool,
            Arc::new(email),
            Arc::new(SystemClock),
        ))
    }

    /// Create application state with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: StorefrontConfig,
        pool: PgPool,
        dispatcher: Arc<dyn CodeDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                dispatcher,
                clock,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the email dispatcher for one-time passcodes.
    #[must_use]
    pub fn dispatcher(&self) -> &dyn CodeDispatcher {
        self.inner.dispatcher.as_ref()
    }

    /// Get the clock used for expiry, cooldown, and lockout decisions.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }
}
