//! Account flows built on the OTP lifecycle and the lockout guard.
//!
//! Signup creates an unverified account and emails a code; verification
//! marks it verified. Login is refused until then. Password reset is a single
//! step that takes the emailed code together with the new password.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{
    AuthError, Clock, CodeDispatcher, GuardedCredential, LockState, LockoutGuard, LockoutStore,
    OtpKey, OtpManager, OtpStore, StoreError, hash_password, validate_password,
};
use crate::{Email, OtpPurpose};

/// A stored account.
#[derive(Debug, Clone)]
pub struct Account<Id> {
    pub id: Id,
    pub email: Email,
    pub name: Option<String>,
    pub verified: bool,
    pub password_hash: String,
    pub lock: LockState,
    pub created_at: DateTime<Utc>,
}

impl<Id: Clone> Account<Id> {
    /// The password hash and lock counters, for the lockout guard.
    #[must_use]
    pub fn credential(&self) -> GuardedCredential<Id> {
        GuardedCredential {
            id: self.id.clone(),
            password_hash: self.password_hash.clone(),
            lock: self.lock,
        }
    }
}

/// Data for an account that has not verified its email yet.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: Email,
    pub name: Option<String>,
    pub password_hash: String,
}

/// Returned whenever a code has been emailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeSent {
    pub email: Email,
    pub next_resend_seconds: i64,
}

/// Persistence for accounts.
#[async_trait]
pub trait AccountStore: LockoutStore {
    async fn find_by_email(&self, email: &Email) -> Result<Option<Account<Self::Id>>, StoreError>;

    /// Insert an unverified account. Fails with `StoreError::Conflict` if the
    /// email is taken.
    async fn create_unverified(&self, account: &NewAccount) -> Result<Self::Id, StoreError>;

    /// Overwrite the name and password hash of an account that is still
    /// pending verification.
    async fn update_pending_credentials(
        &self,
        id: &Self::Id,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    async fn mark_verified(&self, id: &Self::Id) -> Result<(), StoreError>;

    /// Replace the password hash and clear any lockout state.
    async fn set_password(&self, id: &Self::Id, password_hash: &str) -> Result<(), StoreError>;
}

/// Reject blank input. The value is returned untrimmed so passwords keep
/// their exact bytes.
fn required<'s>(value: &'s str, field: &'static str) -> Result<&'s str, AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::RequestRequired(field));
    }
    Ok(value)
}

fn parse_email(value: &str) -> Result<Email, AuthError> {
    Ok(Email::parse(required(value, "email")?)?)
}

/// Account operations for one request.
pub struct AccountService<'a, S: ?Sized, O: ?Sized, D: ?Sized> {
    accounts: &'a S,
    otp: OtpManager<'a, O, D>,
    guard: LockoutGuard,
    clock: &'a dyn Clock,
}

impl<'a, S, O, D> AccountService<'a, S, O, D>
where
    S: AccountStore + ?Sized,
    S::Id: Clone,
    O: OtpStore + ?Sized,
    D: CodeDispatcher + ?Sized,
{
    #[must_use]
    pub fn new(accounts: &'a S, otp_store: &'a O, dispatcher: &'a D, clock: &'a dyn Clock) -> Self {
        Self {
            accounts,
            otp: OtpManager::new(otp_store, dispatcher),
            guard: LockoutGuard::default(),
            clock,
        }
    }

    /// Start signup for `email`.
    ///
    /// For an email that already belongs to an unverified account this acts
    /// as a resend that also replaces the stored name and password hash with
    /// the newly submitted ones. That overwrite is intentional: it lets a user
    /// correct a mistyped password before verifying. The cooldown is checked
    /// before anything is overwritten. A signup that loses the insert race to
    /// a concurrent one for the same email is handled the same way.
    ///
    /// # Errors
    ///
    /// `RequestRequired`, `InvalidEmail`, and `WeakPassword` are raised before
    /// any store access. `AlreadyRegistered` if the account is verified.
    /// `TooManyRequests` during the resend cooldown.
    #[instrument(skip(self, name, password))]
    pub async fn signup(
        &self,
        email: &str,
        name: Option<&str>,
        password: &str,
    ) -> Result<CodeSent, AuthError> {
        let email = parse_email(email)?;
        let password = required(password, "password")?;
        validate_password(password)?;
        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let now = self.clock.now();
        let key = OtpKey::new(email.clone(), OtpPurpose::Signup);
        let password_hash = hash_password(password)?;

        let existing = match self.accounts.find_by_email(&email).await? {
            Some(account) => Some(account),
            None => {
                let new_account = NewAccount {
                    email: email.clone(),
                    name: name.map(ToString::to_string),
                    password_hash: password_hash.clone(),
                };
                match self.accounts.create_unverified(&new_account).await {
                    Ok(_) => {
                        info!("account created, pending verification");
                        None
                    }
                    // A concurrent signup inserted the row first.
                    Err(StoreError::Conflict(_)) => {
                        debug!("account created concurrently, treating signup as a repeat");
                        let account =
                            self.accounts.find_by_email(&email).await?.ok_or_else(|| {
                                StoreError::Conflict("account vanished after conflict".to_string())
                            })?;
                        Some(account)
                    }
                    Err(other) => return Err(other.into()),
                }
            }
        };

        let issued = match existing {
            Some(account) if account.verified => return Err(AuthError::AlreadyRegistered),
            Some(account) => {
                let issued = self.otp.issue(&key, now).await?;
                self.accounts
                    .update_pending_credentials(&account.id, name, &password_hash)
                    .await?;
                issued
            }
            None => self.otp.issue(&key, now).await?,
        };

        self.otp.dispatch(&key, &issued.code).await?;

        Ok(CodeSent {
            email,
            next_resend_seconds: issued.next_resend_seconds,
        })
    }

    /// Resend the signup code for an unverified account.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no account, `AlreadyRegistered` if it is
    /// verified, `TooManyRequests` during the cooldown.
    #[instrument(skip(self))]
    pub async fn resend_signup_code(&self, email: &str) -> Result<CodeSent, AuthError> {
        let email = parse_email(email)?;

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;
        if account.verified {
            return Err(AuthError::AlreadyRegistered);
        }

        let key = OtpKey::new(email.clone(), OtpPurpose::Signup);
        let issued = self.otp.request_code(&key, self.clock.now()).await?;

        Ok(CodeSent {
            email,
            next_resend_seconds: issued.next_resend_seconds,
        })
    }

    /// Complete signup with the emailed code.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no account or no pending code, otherwise the
    /// OTP verification errors.
    #[instrument(skip(self, code))]
    pub async fn verify_signup(&self, email: &str, code: &str) -> Result<Account<S::Id>, AuthError> {
        let email = parse_email(email)?;
        let code = required(code, "code")?;

        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        let key = OtpKey::new(email, OtpPurpose::Signup);
        self.otp.verify_code(&key, code, self.clock.now()).await?;

        if !account.verified {
            self.accounts.mark_verified(&account.id).await?;
            account.verified = true;
            info!("account verified");
        }

        Ok(account)
    }

    /// Password login.
    ///
    /// The lock is checked first, then the password, then verification
    /// status, so an unverified account still accrues failed attempts.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Locked`, `InvalidPassword`, or `Unverified`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Account<S::Id>, AuthError> {
        let email = parse_email(email)?;
        let password = required(password, "password")?;

        let mut account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        self.guard
            .verify(
                self.accounts,
                &account.credential(),
                password,
                self.clock.now(),
            )
            .await?;
        account.lock = LockState::default();

        if !account.verified {
            return Err(AuthError::Unverified);
        }

        info!("user logged in");
        Ok(account)
    }

    /// Email a password-reset code to a verified account.
    ///
    /// # Errors
    ///
    /// `NotFound` if there is no account, `Unverified` if signup was never
    /// completed, `TooManyRequests` during the cooldown.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<CodeSent, AuthError> {
        let email = parse_email(email)?;

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;
        if !account.verified {
            return Err(AuthError::Unverified);
        }

        let key = OtpKey::new(email.clone(), OtpPurpose::ForgotPassword);
        let issued = self.otp.request_code(&key, self.clock.now()).await?;

        Ok(CodeSent {
            email,
            next_resend_seconds: issued.next_resend_seconds,
        })
    }

    /// Set a new password using an emailed reset code.
    ///
    /// The new password is validated before the code is checked, so a weak
    /// password does not consume a verification attempt.
    ///
    /// # Errors
    ///
    /// `WeakPassword`, `NotFound`, or the OTP verification errors.
    #[instrument(skip(self, code, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let email = parse_email(email)?;
        let code = required(code, "code")?;
        let new_password = required(new_password, "password")?;
        validate_password(new_password)?;

        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::NotFound)?;

        let key = OtpKey::new(email, OtpPurpose::ForgotPassword);
        self.otp.verify_code(&key, code, self.clock.now()).await?;

        let password_hash = hash_password(new_password)?;
        self.accounts
            .set_password(&account.id, &password_hash)
            .await?;
        info!("password reset");

        Ok(())
    }
}
