//! Business logic services for storefront.
//!
//! # Services
//!
//! - `email` - SMTP delivery of one-time passcodes
//!
//! Account flows themselves live in `emporium_core::auth::AccountService`;
//! this crate supplies its Postgres stores and the email dispatcher.

pub mod email;

pub use email::EmailService;
