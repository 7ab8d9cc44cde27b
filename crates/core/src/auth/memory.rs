//! In-memory implementations of the auth collaborators.
//!
//! Used by unit and scenario tests, and by anything that wants the account
//! flows without a database. Every store serializes access through a mutex,
//! which gives the per-key atomicity the traits require.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{
    Account, AccountStore, Clock, CodeDispatcher, DispatchError, LockState, LockoutStore,
    NewAccount, OtpKey, OtpRecord, OtpStore, StoreError,
};
use crate::{Email, OtpPurpose, UserId};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
}

/// OTP records keyed by `(identity, purpose)`.
#[derive(Debug, Default)]
pub struct MemoryOtpStore {
    records: Mutex<HashMap<OtpKey, OtpRecord>>,
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn find(&self, key: &OtpKey) -> Result<Option<OtpRecord>, StoreError> {
        Ok(lock(&self.records)?.get(key).cloned())
    }

    async fn insert_or_replace(
        &self,
        record: &OtpRecord,
        expected_last_sent_at: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut records = lock(&self.records)?;
        let key = record.key();
        let current = records.get(&key).map(|r| r.last_sent_at);

        if current != expected_last_sent_at {
            return Ok(false);
        }

        records.insert(key, record.clone());
        Ok(true)
    }

    async fn increment_attempts(&self, key: &OtpKey) -> Result<Option<i32>, StoreError> {
        Ok(lock(&self.records)?.get_mut(key).map(|record| {
            record.attempts += 1;
            record.attempts
        }))
    }

    async fn delete(&self, key: &OtpKey) -> Result<(), StoreError> {
        lock(&self.records)?.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|_, record| record.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}

#[derive(Debug, Default)]
struct AccountTable {
    next_id: i32,
    rows: HashMap<UserId, Account<UserId>>,
}

/// Accounts keyed by [`UserId`].
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    table: Mutex<AccountTable>,
}

impl MemoryAccountStore {
    /// Number of stored accounts.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LockoutStore for MemoryAccountStore {
    type Id = UserId;

    async fn save_lock_state(&self, id: &UserId, state: &LockState) -> Result<(), StoreError> {
        if let Some(account) = lock(&self.table)?.rows.get_mut(id) {
            account.lock = *state;
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Account<UserId>>, StoreError> {
        Ok(lock(&self.table)?
            .rows
            .values()
            .find(|account| &account.email == email)
            .cloned())
    }

    async fn create_unverified(&self, account: &NewAccount) -> Result<UserId, StoreError> {
        let mut table = lock(&self.table)?;

        if table.rows.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!(
                "email already registered: {}",
                account.email
            )));
        }

        table.next_id += 1;
        let id = UserId::new(table.next_id);
        table.rows.insert(
            id,
            Account {
                id,
                email: account.email.clone(),
                name: account.name.clone(),
                verified: false,
                password_hash: account.password_hash.clone(),
                lock: LockState::default(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn update_pending_credentials(
        &self,
        id: &UserId,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        if let Some(account) = lock(&self.table)?.rows.get_mut(id) {
            account.name = name.map(ToString::to_string);
            account.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn mark_verified(&self, id: &UserId) -> Result<(), StoreError> {
        if let Some(account) = lock(&self.table)?.rows.get_mut(id) {
            account.verified = true;
        }
        Ok(())
    }

    async fn set_password(&self, id: &UserId, password_hash: &str) -> Result<(), StoreError> {
        if let Some(account) = lock(&self.table)?.rows.get_mut(id) {
            account.password_hash = password_hash.to_string();
            account.lock = LockState::default();
        }
        Ok(())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }
}

impl Clock for ManualClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A sent code, as captured by [`RecordingDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub to: Email,
    pub code: String,
    pub purpose: OtpPurpose,
}

/// Records every code instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentCode>>,
    fail: bool,
}

impl RecordingDispatcher {
    /// A dispatcher whose every send fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Codes sent so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().unwrap().clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent().len()
    }

    /// The most recent code sent to `to`.
    #[must_use]
    pub fn last_code(&self, to: &Email) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|sent| &sent.to == to)
            .map(|sent| sent.code)
    }
}

#[async_trait]
impl CodeDispatcher for RecordingDispatcher {
    async fn send_verification_email(
        &self,
        to: &Email,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), DispatchError> {
        if self.fail {
            return Err(DispatchError("relay refused connection".to_string()));
        }

        self.sent
            .lock()
            .map_err(|_| DispatchError("recorder lock poisoned".to_string()))?
            .push(SentCode {
                to: to.clone(),
                code: code.to_string(),
                purpose,
            });
        Ok(())
    }
}
