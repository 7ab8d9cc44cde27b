//! Authentication error types.
//!
//! Expected outcomes (wrong code, cooldown, locked account) are variants of
//! [`AuthError`] rather than panics or opaque failures, and each one carries
//! the number a client needs to act on it. Only [`AuthError::Store`],
//! [`AuthError::Dispatch`], and [`AuthError::PasswordHash`] represent
//! infrastructure failures.

use thiserror::Error;

use crate::EmailError;

/// Errors raised by a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed (connection, query, poisoned lock).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persisted data could not be interpreted.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// The email dispatch collaborator reported a failure.
///
/// The message is for logs only and must not reach the end caller.
#[derive(Debug, Error)]
#[error("code dispatch failed: {0}")]
pub struct DispatchError(pub String);

/// Errors that can occur during OTP, login, and password-reset operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required request field was missing or blank.
    #[error("{0} is required")]
    RequestRequired(&'static str),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password below the minimum strength, checked before any store access.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Resend requested before the cooldown elapsed.
    #[error("too many requests, retry in {remaining_seconds}s")]
    TooManyRequests {
        /// Seconds until another code may be sent.
        remaining_seconds: i64,
    },

    /// No OTP record, or no identity, for the request.
    #[error("not found")]
    NotFound,

    /// The OTP passed its expiry.
    #[error("code expired")]
    Expired,

    /// The OTP used up its verification attempts.
    #[error("too many incorrect attempts")]
    Exhausted,

    /// The submitted OTP did not match.
    #[error("incorrect code, {remaining_attempts} attempts remaining")]
    Mismatch {
        /// Verification attempts left before the code is discarded.
        remaining_attempts: i32,
    },

    /// Password login is suspended for this identity.
    #[error("account locked, retry in {retry_after_minutes} minutes")]
    Locked {
        /// Whole minutes (rounded up) until the lock lifts.
        retry_after_minutes: i64,
    },

    /// The password did not match.
    #[error("invalid password, {remaining_attempts} attempts remaining")]
    InvalidPassword {
        /// Failed attempts left before the account locks.
        remaining_attempts: i32,
    },

    /// The account has not completed signup verification.
    #[error("email not verified")]
    Unverified,

    /// A verified account already exists for this email.
    #[error("account already exists")]
    AlreadyRegistered,

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Email delivery failure.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Password hashing failed.
    #[error("password hashing error")]
    PasswordHash,
}

impl AuthError {
    /// Whether this error is an infrastructure failure rather than an expected
    /// outcome of the request.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Dispatch(_) | Self::PasswordHash)
    }
}
