//! Credential and one-time-passcode security core.
//!
//! Everything here is deterministic given its inputs: persistence goes through
//! the [`OtpStore`], [`LockoutStore`], and [`AccountStore`] traits, email
//! delivery through [`CodeDispatcher`], and the current time through [`Clock`].
//!
//! # Concurrency
//!
//! Requests overlap only through the shared store. OTP issuance uses a
//! conditional write (see [`OtpStore::insert_or_replace`]) and retries the
//! read-cooldown-write sequence when it loses a race. Lockout counters are
//! best-effort: two concurrent failed logins can both read the same counter and
//! write the same incremented value, delaying the lock by an attempt. That race
//! is tolerated; the lockout throttles guessing, it is not a hard boundary.

pub mod accounts;
pub mod clock;
pub mod compare;
pub mod error;
pub mod lockout;
pub mod memory;
pub mod otp;
pub mod password;
pub mod token;

pub use accounts::{Account, AccountService, AccountStore, CodeSent, NewAccount};
pub use clock::{Clock, SystemClock};
pub use compare::constant_time_eq;
pub use error::{AuthError, DispatchError, StoreError};
pub use lockout::{GuardedCredential, LockState, LockoutGuard, LockoutStore};
pub use otp::{CodeDispatcher, IssuedCode, OtpKey, OtpManager, OtpPolicy, OtpRecord, OtpStore};
pub use password::{hash_password, validate_password, verify_password};
pub use token::{TokenError, TokenSigner};
