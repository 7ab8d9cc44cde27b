//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use emporium_core::auth::{Clock, LockoutGuard, SystemClock, TokenError, TokenSigner};

use crate::config::AdminConfig;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. The token signer is built once from
/// `ADMIN_TOKEN_SECRET` at startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    pool: PgPool,
    signer: TokenSigner,
    guard: LockoutGuard,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create application state with the system clock.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::EmptySecret` if the token secret is empty.
    pub fn new(config: AdminConfig, pool: PgPool) -> Result<Self, TokenError> {
        Self::with_clock(config, pool, Arc::new(SystemClock))
    }

    /// Create application state with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::EmptySecret` if the token secret is empty.
    pub fn with_clock(
        config: AdminConfig,
        pool: PgPool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let signer = TokenSigner::new(config.token_secret.clone())?;
        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                signer,
                guard: LockoutGuard::default(),
                clock,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Signs and verifies `admin_token` cookies.
    #[must_use]
    pub fn signer(&self) -> &TokenSigner {
        &self.inner.signer
    }

    #[must_use]
    pub fn guard(&self) -> &LockoutGuard {
        &self.inner.guard
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }
}
