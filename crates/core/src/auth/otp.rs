//! One-time passcode lifecycle.
//!
//! Each `(identity, purpose)` pair has at most one live [`OtpRecord`]. A record
//! is created on first send, refreshed in place on resend, and deleted on
//! successful verification, expiry, or exhaustion of its attempts.
//!
//! ```text
//! NONE ──request──▶ PENDING ──verify ok──────▶ VERIFIED  (deleted)
//!                     │  ▲    ──past expiry───▶ EXPIRED   (deleted)
//!            resend ──┘  │    ──5th mismatch──▶ EXHAUSTED (deleted)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, error, instrument, warn};

use super::{AuthError, DispatchError, StoreError};
use crate::{Email, OtpPurpose};

/// Number of times a lost conditional write is retried before giving up.
const MAX_WRITE_RETRIES: u32 = 3;

/// Identifies an OTP record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OtpKey {
    pub identity: Email,
    pub purpose: OtpPurpose,
}

impl OtpKey {
    #[must_use]
    pub const fn new(identity: Email, purpose: OtpPurpose) -> Self {
        Self { identity, purpose }
    }
}

/// A persisted one-time passcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub identity: Email,
    pub purpose: OtpPurpose,
    /// Six-digit numeric code.
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// Failed verification attempts against the current code.
    pub attempts: i32,
    pub last_sent_at: DateTime<Utc>,
    /// Number of resends since the record was created.
    pub resend_count: i32,
}

impl OtpRecord {
    #[must_use]
    pub fn key(&self) -> OtpKey {
        OtpKey::new(self.identity.clone(), self.purpose)
    }
}

/// Timing and attempt limits for the OTP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpPolicy {
    /// How long a code stays valid after it is sent.
    pub ttl: Duration,
    /// Wrong submissions allowed before the code is discarded.
    pub max_attempts: i32,
    /// Wait before the first resend.
    pub first_resend_cooldown: Duration,
    /// Wait before every later resend.
    pub resend_cooldown: Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(15),
            max_attempts: 5,
            first_resend_cooldown: Duration::seconds(60),
            resend_cooldown: Duration::seconds(300),
        }
    }
}

impl OtpPolicy {
    /// Cooldown that applies to a record that has been resent `resend_count` times.
    #[must_use]
    pub const fn cooldown_for(&self, resend_count: i32) -> Duration {
        if resend_count == 0 {
            self.first_resend_cooldown
        } else {
            self.resend_cooldown
        }
    }
}

/// Result of issuing a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    /// Seconds the caller must wait before another resend is accepted.
    pub next_resend_seconds: i64,
}

/// Persistence for OTP records.
///
/// Implementations must make [`insert_or_replace`](Self::insert_or_replace)
/// and [`increment_attempts`](Self::increment_attempts) atomic per key.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Look up the live record for a key.
    async fn find(&self, key: &OtpKey) -> Result<Option<OtpRecord>, StoreError>;

    /// Conditionally write a record.
    ///
    /// With `expected_last_sent_at = None` the write succeeds only if no record
    /// exists for the key. With `Some(t)` it succeeds only if the stored record
    /// still has `last_sent_at == t`. Returns `false` when the condition fails.
    async fn insert_or_replace(
        &self,
        record: &OtpRecord,
        expected_last_sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Atomically add one to `attempts`, returning the new count, or `None` if
    /// the record no longer exists.
    async fn increment_attempts(&self, key: &OtpKey) -> Result<Option<i32>, StoreError>;

    /// Remove the record for a key, if any.
    async fn delete(&self, key: &OtpKey) -> Result<(), StoreError>;

    /// Remove every record whose `expires_at` is before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Delivers codes to their recipients.
#[async_trait]
pub trait CodeDispatcher: Send + Sync {
    /// Send `code` to `to` for the given purpose.
    async fn send_verification_email(
        &self,
        to: &Email,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), DispatchError>;
}

/// Generate a uniformly random six-digit code.
#[must_use]
pub fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000_u32).to_string()
}

/// Whole seconds, rounded up, with a floor of one.
fn ceil_seconds(duration: Duration) -> i64 {
    let millis = duration.num_milliseconds();
    ((millis + 999) / 1000).max(1)
}

/// Drives the OTP state machine against a store and a dispatcher.
pub struct OtpManager<'a, S: ?Sized, D: ?Sized> {
    store: &'a S,
    dispatcher: &'a D,
    policy: OtpPolicy,
}

impl<'a, S, D> OtpManager<'a, S, D>
where
    S: OtpStore + ?Sized,
    D: CodeDispatcher + ?Sized,
{
    /// Create a manager with the default policy.
    #[must_use]
    pub fn new(store: &'a S, dispatcher: &'a D) -> Self {
        Self::with_policy(store, dispatcher, OtpPolicy::default())
    }

    #[must_use]
    pub const fn with_policy(store: &'a S, dispatcher: &'a D, policy: OtpPolicy) -> Self {
        Self {
            store,
            dispatcher,
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Issue a code and send it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TooManyRequests` during the resend cooldown, and
    /// `AuthError::Dispatch` if delivery fails. On a dispatch failure the new
    /// record is kept so the user can ask for a resend.
    pub async fn request_code(
        &self,
        key: &OtpKey,
        now: DateTime<Utc>,
    ) -> Result<IssuedCode, AuthError> {
        let issued = self.issue(key, now).await?;
        self.dispatch(key, &issued.code).await?;
        Ok(issued)
    }

    /// Create or refresh the record for `key` without sending anything.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TooManyRequests` during the resend cooldown, or
    /// `AuthError::Store` if the conditional write keeps losing races.
    #[instrument(skip(self), fields(identity = %key.identity, purpose = %key.purpose))]
    pub async fn issue(&self, key: &OtpKey, now: DateTime<Utc>) -> Result<IssuedCode, AuthError> {
        for attempt in 0..=MAX_WRITE_RETRIES {
            let code = generate_code();
            let current = self.store.find(key).await?;

            let (record, expected, next_resend) = match current {
                None => (
                    OtpRecord {
                        identity: key.identity.clone(),
                        purpose: key.purpose,
                        code: code.clone(),
                        expires_at: now + self.policy.ttl,
                        attempts: 0,
                        last_sent_at: now,
                        resend_count: 0,
                    },
                    None,
                    self.policy.first_resend_cooldown,
                ),
                Some(current) => {
                    let cooldown = self.policy.cooldown_for(current.resend_count);
                    let elapsed = now - current.last_sent_at;
                    if elapsed < cooldown {
                        return Err(AuthError::TooManyRequests {
                            remaining_seconds: ceil_seconds(cooldown - elapsed),
                        });
                    }

                    (
                        OtpRecord {
                            code: code.clone(),
                            expires_at: now + self.policy.ttl,
                            attempts: 0,
                            last_sent_at: now,
                            resend_count: current.resend_count + 1,
                            ..current.clone()
                        },
                        Some(current.last_sent_at),
                        self.policy.resend_cooldown,
                    )
                }
            };

            if self.store.insert_or_replace(&record, expected).await? {
                debug!(resend_count = record.resend_count, "otp issued");
                return Ok(IssuedCode {
                    code,
                    next_resend_seconds: next_resend.num_seconds(),
                });
            }

            debug!(attempt, "otp record changed concurrently, retrying");
        }

        warn!("gave up issuing otp after repeated write conflicts");
        Err(StoreError::Conflict("otp record changed concurrently".to_string()).into())
    }

    /// Send an issued code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Dispatch` if the dispatcher fails. Transport detail
    /// is logged here and must not be shown to the end caller.
    pub async fn dispatch(&self, key: &OtpKey, code: &str) -> Result<(), AuthError> {
        self.dispatcher
            .send_verification_email(&key.identity, code, key.purpose)
            .await
            .map_err(|e| {
                error!(
                    identity = %key.identity,
                    purpose = %key.purpose,
                    error = %e,
                    "failed to dispatch verification code"
                );
                AuthError::Dispatch(e)
            })
    }

    /// Check a submitted code.
    ///
    /// The record is deleted on success, on expiry, and once attempts are
    /// exhausted. The mismatch that reaches the attempt limit reports
    /// `Exhausted` rather than `Mismatch { remaining_attempts: 0 }`.
    ///
    /// The submitted code must match exactly. Callers trim user input at the
    /// request boundary if they want to.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Expired`, `Exhausted`, or `Mismatch` as described above.
    #[instrument(skip(self, submitted), fields(identity = %key.identity, purpose = %key.purpose))]
    pub async fn verify_code(
        &self,
        key: &OtpKey,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let Some(record) = self.store.find(key).await? else {
            return Err(AuthError::NotFound);
        };

        if now > record.expires_at {
            self.store.delete(key).await?;
            return Err(AuthError::Expired);
        }

        if record.attempts >= self.policy.max_attempts {
            self.store.delete(key).await?;
            return Err(AuthError::Exhausted);
        }

        if submitted != record.code {
            let Some(attempts) = self.store.increment_attempts(key).await? else {
                return Err(AuthError::NotFound);
            };

            if attempts >= self.policy.max_attempts {
                self.store.delete(key).await?;
                debug!("otp exhausted");
                return Err(AuthError::Exhausted);
            }

            return Err(AuthError::Mismatch {
                remaining_attempts: self.policy.max_attempts - attempts,
            });
        }

        self.store.delete(key).await?;
        debug!("otp verified");
        Ok(())
    }

    /// Sweep expired records.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Store` if the store fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        Ok(self.store.purge_expired(now).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::auth::memory::{MemoryOtpStore, RecordingDispatcher};
    use chrono::TimeZone;

    /// Loses conditional writes on demand. A `rival` record, if set, is
    /// written just before the first lost write, as a concurrent request would.
    #[derive(Default)]
    struct RacingStore {
        inner: MemoryOtpStore,
        losses: Mutex<u32>,
        writes: Mutex<u32>,
        rival: Mutex<Option<OtpRecord>>,
    }

    impl RacingStore {
        fn losing(losses: u32) -> Self {
            Self {
                losses: Mutex::new(losses),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl OtpStore for RacingStore {
        async fn find(&self, key: &OtpKey) -> Result<Option<OtpRecord>, StoreError> {
            self.inner.find(key).await
        }

        async fn insert_or_replace(
            &self,
            record: &OtpRecord,
            expected_last_sent_at: Option<DateTime<Utc>>,
        ) -> Result<bool, StoreError> {
            *self.writes.lock().unwrap() += 1;
            let lose = {
                let mut losses = self.losses.lock().unwrap();
                let lose = *losses > 0;
                *losses = losses.saturating_sub(1);
                lose
            };
            if !lose {
                return self.inner.insert_or_replace(record, expected_last_sent_at).await;
            }

            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                assert!(
                    self.inner
                        .insert_or_replace(&rival, expected_last_sent_at)
                        .await?
                );
            }
            Ok(false)
        }

        async fn increment_attempts(&self, key: &OtpKey) -> Result<Option<i32>, StoreError> {
            self.inner.increment_attempts(key).await
        }

        async fn delete(&self, key: &OtpKey) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.purge_expired(now).await
        }
    }

    fn key() -> OtpKey {
        OtpKey::new(Email::parse("a@x.com").unwrap(), OtpPurpose::Signup)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_ceil_seconds() {
        assert_eq!(ceil_seconds(Duration::milliseconds(59_001)), 60);
        assert_eq!(ceil_seconds(Duration::seconds(45)), 45);
        assert_eq!(ceil_seconds(Duration::milliseconds(1)), 1);
    }

    #[tokio::test]
    async fn test_first_request_creates_record() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let issued = manager.request_code(&key(), t0()).await.unwrap();
        assert_eq!(issued.next_resend_seconds, 60);

        let record = store.find(&key()).await.unwrap().unwrap();
        assert_eq!(record.code, issued.code);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.resend_count, 0);
        assert_eq!(record.expires_at, t0() + Duration::minutes(15));
        assert_eq!(dispatcher.last_code(&key().identity), Some(issued.code));
    }

    #[tokio::test]
    async fn test_first_resend_cooldown() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        manager.request_code(&key(), t0()).await.unwrap();
        let err = manager
            .request_code(&key(), t0() + Duration::seconds(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::TooManyRequests {
                remaining_seconds: 40
            }
        ));
        assert_eq!(dispatcher.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_escalating_resend_cooldown() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        manager.request_code(&key(), t0()).await.unwrap();

        let second_at = t0() + Duration::seconds(60);
        let resent = manager.request_code(&key(), second_at).await.unwrap();
        assert_eq!(resent.next_resend_seconds, 300);

        let err = manager
            .request_code(&key(), second_at + Duration::seconds(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::TooManyRequests {
                remaining_seconds: 200
            }
        ));

        manager
            .request_code(&key(), second_at + Duration::seconds(300))
            .await
            .unwrap();
        let record = store.find(&key()).await.unwrap().unwrap();
        assert_eq!(record.resend_count, 2);
    }

    #[tokio::test]
    async fn test_resend_resets_attempts_and_expiry() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        manager.request_code(&key(), t0()).await.unwrap();
        let _ = manager.verify_code(&key(), "000000", t0()).await;
        let _ = manager.verify_code(&key(), "000001", t0()).await;

        let later = t0() + Duration::seconds(90);
        manager.request_code(&key(), later).await.unwrap();
        let record = store.find(&key()).await.unwrap().unwrap();
        assert_eq!(record.attempts, 0);
        assert_eq!(record.expires_at, later + Duration::minutes(15));
        assert_eq!(record.last_sent_at, later);
    }

    #[tokio::test]
    async fn test_verify_succeeds_once() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let issued = manager.request_code(&key(), t0()).await.unwrap();
        manager.verify_code(&key(), &issued.code, t0()).await.unwrap();

        let err = manager
            .verify_code(&key(), &issued.code, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn test_verify_after_expiry_deletes_record() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let issued = manager.request_code(&key(), t0()).await.unwrap();
        let late = t0() + Duration::minutes(15) + Duration::seconds(1);
        let err = manager
            .verify_code(&key(), &issued.code, late)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Expired));
        assert!(store.find(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_five_wrong_codes_exhaust() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let issued = manager.request_code(&key(), t0()).await.unwrap();
        let wrong = if issued.code == "999999" {
            "999998"
        } else {
            "999999"
        };

        for expected_remaining in [4, 3, 2, 1] {
            let err = manager.verify_code(&key(), wrong, t0()).await.unwrap_err();
            match err {
                AuthError::Mismatch { remaining_attempts } => {
                    assert_eq!(remaining_attempts, expected_remaining);
                }
                other => panic!("expected mismatch, got {other:?}"),
            }
        }

        let err = manager.verify_code(&key(), wrong, t0()).await.unwrap_err();
        assert!(matches!(err, AuthError::Exhausted));
        assert!(store.find(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_already_at_threshold_is_exhausted() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let record = OtpRecord {
            identity: key().identity,
            purpose: key().purpose,
            code: "123456".to_string(),
            expires_at: t0() + Duration::minutes(10),
            attempts: 5,
            last_sent_at: t0(),
            resend_count: 0,
        };
        assert!(store.insert_or_replace(&record, None).await.unwrap());

        let err = manager
            .verify_code(&key(), "123456", t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Exhausted));
        assert!(store.find(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_record() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::failing();
        let manager = OtpManager::new(&store, &dispatcher);

        let err = manager.request_code(&key(), t0()).await.unwrap_err();
        assert!(matches!(err, AuthError::Dispatch(_)));
        assert!(store.find(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lost_write_rereads_and_applies_new_cooldown() {
        let store = RacingStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let first = manager.issue(&key(), t0()).await.unwrap();

        // A concurrent resend lands between our read and our write.
        let resend_at = t0() + Duration::seconds(60);
        let current = store.find(&key()).await.unwrap().unwrap();
        *store.rival.lock().unwrap() = Some(OtpRecord {
            code: "424242".to_string(),
            last_sent_at: resend_at,
            resend_count: 1,
            ..current
        });
        *store.losses.lock().unwrap() = 1;

        let err = manager.issue(&key(), resend_at).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::TooManyRequests {
                remaining_seconds: 300
            }
        ));
        assert_eq!(*store.writes.lock().unwrap(), 2);

        let record = store.find(&key()).await.unwrap().unwrap();
        assert_eq!(record.code, "424242");
        assert_ne!(record.code, first.code);
    }

    #[tokio::test]
    async fn test_lost_write_retries_then_succeeds() {
        let store = RacingStore::losing(2);
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let issued = manager.request_code(&key(), t0()).await.unwrap();
        assert_eq!(*store.writes.lock().unwrap(), 3);
        let record = store.find(&key()).await.unwrap().unwrap();
        assert_eq!(record.code, issued.code);
        assert_eq!(dispatcher.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_write_conflicts() {
        let store = RacingStore::losing(u32::MAX);
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let err = manager.request_code(&key(), t0()).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(StoreError::Conflict(_))));
        assert_eq!(*store.writes.lock().unwrap(), MAX_WRITE_RETRIES + 1);
        assert_eq!(dispatcher.sent_count(), 0);
        assert!(store.find(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_padded_code_does_not_match() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        let issued = manager.request_code(&key(), t0()).await.unwrap();
        let err = manager
            .verify_code(&key(), &format!(" {}", issued.code), t0())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Mismatch {
                remaining_attempts: 4
            }
        ));
        manager.verify_code(&key(), &issued.code, t0()).await.unwrap();
    }

    #[tokio::test]
    async fn test_purposes_are_independent() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        manager.request_code(&key(), t0()).await.unwrap();
        let reset_key = OtpKey::new(key().identity, OtpPurpose::ForgotPassword);
        manager.request_code(&reset_key, t0()).await.unwrap();
        assert_eq!(dispatcher.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryOtpStore::default();
        let dispatcher = RecordingDispatcher::default();
        let manager = OtpManager::new(&store, &dispatcher);

        manager.request_code(&key(), t0()).await.unwrap();
        assert_eq!(manager.purge_expired(t0()).await.unwrap(), 0);
        assert_eq!(
            manager
                .purge_expired(t0() + Duration::minutes(16))
                .await
                .unwrap(),
            1
        );
    }
}
