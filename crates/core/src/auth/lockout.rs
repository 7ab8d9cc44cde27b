//! Password verification with failed-attempt lockout.
//!
//! One [`LockoutGuard`] serves both storefront users and admins; the identity
//! store is the only thing that differs, and it is supplied per call.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use super::{AuthError, StoreError, verify_password};

/// Lockout counters persisted alongside a credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockState {
    /// Time left on an active lock, if any.
    #[must_use]
    pub fn remaining_lock(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Whether there is nothing to clear after a successful check.
    #[must_use]
    pub const fn is_clear(&self) -> bool {
        self.failed_attempts == 0 && self.locked_until.is_none()
    }
}

/// A password hash and its lock state, as loaded from an identity store.
#[derive(Debug, Clone)]
pub struct GuardedCredential<Id> {
    pub id: Id,
    pub password_hash: String,
    pub lock: LockState,
}

/// Write access to an identity store's lock state.
#[async_trait]
pub trait LockoutStore: Send + Sync {
    /// Identity key within the store.
    type Id: Send + Sync + std::fmt::Debug;

    /// Persist the counters for one identity.
    async fn save_lock_state(&self, id: &Self::Id, state: &LockState) -> Result<(), StoreError>;
}

/// Whole minutes, rounded up, with a floor of one.
fn ceil_minutes(duration: Duration) -> i64 {
    let seconds = duration.num_seconds() + i64::from(duration.subsec_nanos() > 0);
    ((seconds + 59) / 60).max(1)
}

/// Checks passwords and applies the failed-attempt lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutGuard {
    /// Consecutive failures that trigger a lock.
    pub max_attempts: i32,
    /// How long a lock lasts.
    pub lock_duration: Duration,
}

impl Default for LockoutGuard {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lock_duration: Duration::minutes(15),
        }
    }
}

impl LockoutGuard {
    /// Verify `password` against a stored credential.
    ///
    /// An active lock is reported before the password is looked at, so a
    /// correct password during the lock still returns `Locked`. The failure
    /// that reaches `max_attempts` sets the lock and resets the counter to 0.
    /// A success clears both counters.
    ///
    /// Counter updates are a read-modify-write on `credential.lock`; two
    /// concurrent failures may persist the same count.
    ///
    /// # Errors
    ///
    /// Returns `Locked`, `InvalidPassword`, or an infrastructure error.
    #[instrument(skip(self, store, credential, password), fields(id = ?credential.id))]
    pub async fn verify<S>(
        &self,
        store: &S,
        credential: &GuardedCredential<S::Id>,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError>
    where
        S: LockoutStore + ?Sized,
    {
        if let Some(remaining) = credential.lock.remaining_lock(now) {
            return Err(AuthError::Locked {
                retry_after_minutes: ceil_minutes(remaining),
            });
        }

        if verify_password(password, &credential.password_hash)? {
            if !credential.lock.is_clear() {
                store
                    .save_lock_state(&credential.id, &LockState::default())
                    .await?;
            }
            return Ok(());
        }

        let failed_attempts = credential.lock.failed_attempts + 1;

        if failed_attempts >= self.max_attempts {
            let state = LockState {
                failed_attempts: 0,
                locked_until: Some(now + self.lock_duration),
            };
            store.save_lock_state(&credential.id, &state).await?;
            warn!("identity locked after repeated failed logins");
            return Err(AuthError::Locked {
                retry_after_minutes: ceil_minutes(self.lock_duration),
            });
        }

        let state = LockState {
            failed_attempts,
            locked_until: credential.lock.locked_until,
        };
        store.save_lock_state(&credential.id, &state).await?;
        info!(failed_attempts, "failed login");

        Err(AuthError::InvalidPassword {
            remaining_attempts: self.max_attempts - failed_attempts,
        })
    }
}
