//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use emporium_core::auth::Account;
use emporium_core::{Email, UserId};

/// The account fields a customer may see about themselves.
///
/// Excludes the password hash and lockout counters.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: Email,
    pub name: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Account<UserId>> for UserProfile {
    fn from(account: Account<UserId>) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            email_verified: account.verified,
            created_at: account.created_at,
        }
    }
}
