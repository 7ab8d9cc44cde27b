//! Cross-crate scenario tests for Emporium.
//!
//! The scenarios in `tests/` drive the account, lockout, token, and coupon
//! engines through the in-memory stores and a manual clock, then check what
//! the storefront and admin layers make of the outcomes. No database or
//! running server is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p emporium-integration-tests
//! ```

use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use emporium_core::auth::memory::{
    ManualClock, MemoryAccountStore, MemoryOtpStore, RecordingDispatcher,
};
use emporium_core::auth::{AccountService, AuthError};

/// Fixed starting instant for every scenario.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// In-memory collaborators for the account flows.
#[derive(Debug)]
pub struct Harness {
    pub accounts: MemoryAccountStore,
    pub otp: MemoryOtpStore,
    pub mail: Arc<RecordingDispatcher>,
    pub clock: ManualClock,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            accounts: MemoryAccountStore::default(),
            otp: MemoryOtpStore::default(),
            mail: Arc::new(RecordingDispatcher::default()),
            clock: ManualClock::at(epoch()),
        }
    }
}

impl Harness {
    /// The account service over this harness.
    #[must_use]
    pub fn service(
        &self,
    ) -> AccountService<'_, MemoryAccountStore, MemoryOtpStore, RecordingDispatcher> {
        AccountService::new(&self.accounts, &self.otp, self.mail.as_ref(), &self.clock)
    }

    /// The most recent code mailed to `email`.
    ///
    /// # Panics
    ///
    /// Panics if `email` does not parse or nothing was sent to it.
    #[must_use]
    pub fn last_code(&self, email: &str) -> String {
        let email = emporium_core::Email::parse(email).expect("valid email");
        self.mail.last_code(&email).expect("a code was sent")
    }
}

/// Render an auth error the way the storefront API does.
///
/// # Panics
///
/// Panics if the body is not JSON.
pub async fn storefront_error(err: AuthError) -> (axum::http::StatusCode, Value) {
    let response = emporium_storefront::error::AppError::from(err).into_response();
    json_body(response).await
}

/// Render an auth error the way the admin API does.
///
/// # Panics
///
/// Panics if the body is not JSON.
pub async fn admin_error(err: AuthError) -> (axum::http::StatusCode, Value) {
    let response = emporium_admin::error::AppError::from(err).into_response();
    json_body(response).await
}

async fn json_body(response: Response) -> (axum::http::StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let body = serde_json::from_slice(&bytes).expect("json body");
    (status, body)
}
