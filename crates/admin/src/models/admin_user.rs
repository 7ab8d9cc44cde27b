//! Admin user domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use emporium_core::AdminUserId;
use emporium_core::auth::{GuardedCredential, LockState};

/// An administrator account.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: AdminUserId,
    pub username: String,
    pub password_hash: String,
    pub lock: LockState,
    pub created_at: DateTime<Utc>,
}

impl AdminUser {
    /// The password hash and lock counters the lockout guard checks.
    #[must_use]
    pub fn credential(&self) -> GuardedCredential<AdminUserId> {
        GuardedCredential {
            id: self.id,
            password_hash: self.password_hash.clone(),
            lock: self.lock,
        }
    }
}

/// What `/api/me` and the login response expose about an admin.
#[derive(Debug, Clone, Serialize)]
pub struct AdminProfile {
    pub id: AdminUserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<AdminUser> for AdminProfile {
    fn from(admin: AdminUser) -> Self {
        Self {
            id: admin.id,
            username: admin.username,
            created_at: admin.created_at,
        }
    }
}
