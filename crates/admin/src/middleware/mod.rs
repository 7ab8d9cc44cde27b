//! HTTP middleware and extractors for admin.
//!
//! Admin sessions are two cookies rather than a server-side session:
//! `admin_token` (an HMAC-signed opaque token) and `admin_id` (the admin it
//! was issued to). Both must be present, the token must verify, and the admin
//! must still exist. Deleting the admin row therefore ends every session.

pub mod auth;

pub use auth::{ADMIN_ID_COOKIE, ADMIN_TOKEN_COOKIE, RequireAdminAuth, clear_cookies, session_cookies};
