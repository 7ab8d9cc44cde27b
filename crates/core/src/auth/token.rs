//! Stateless signed admin session tokens.
//!
//! A token is `payload.signature` where `payload = "v1:{issued_at_millis}:{nonce}"`
//! and `signature` is the hex-encoded HMAC-SHA256 of the payload. Validity is
//! fully determined by the signature; there is no server-side token table.
//!
//! The payload carries its issue time but [`TokenSigner::verify`] does not
//! enforce an expiry. Lifetime is bounded by the cookie max-age and by the
//! admin-identity existence check performed alongside verification.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use super::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

const VERSION_PREFIX: &str = "v1:";

/// Token signer construction errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The signing secret is empty.
    #[error("token signing secret is empty")]
    EmptySecret,
}

/// Issues and verifies admin session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenSigner {
    /// Create a signer.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::EmptySecret` if the secret is empty. An empty key
    /// would still produce signatures, so it is rejected here as a
    /// configuration error rather than allowed to pass silently.
    pub fn new(secret: SecretString) -> Result<Self, TokenError> {
        if secret.expose_secret().is_empty() {
            return Err(TokenError::EmptySecret);
        }
        Ok(Self { secret })
    }

    /// Issue a new token stamped with `now`.
    #[must_use]
    pub fn issue(&self, now: DateTime<Utc>) -> String {
        let payload = format!(
            "{VERSION_PREFIX}{}:{}",
            now.timestamp_millis(),
            Uuid::new_v4()
        );
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    /// Check a presented token.
    ///
    /// Returns `false` for anything malformed: no `.` separator, a payload
    /// without the version prefix, or a signature that does not match.
    #[must_use]
    pub fn verify(&self, token: &str) -> bool {
        let Some((payload, signature)) = token.rsplit_once('.') else {
            return false;
        };

        if !payload.starts_with(VERSION_PREFIX) {
            return false;
        }

        let expected = self.sign(payload);
        constant_time_eq(&expected, signature)
    }

    fn sign(&self, payload: &str) -> String {
        // HMAC accepts keys of any length, so construction cannot fail.
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) else {
            return String::new();
        };
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
