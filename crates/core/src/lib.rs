//! Emporium Core - Shared types and the credential security core.
//!
//! This crate provides common types used across all Emporium components:
//! - `storefront` - Public-facing e-commerce API
//! - `admin` - Administration API (single shared-secret admin session)
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains types, traits, and deterministic logic - no network
//! I/O, no database access, no HTTP clients. Persistence and email delivery are
//! reached through the store and dispatcher traits in [`auth`], which the
//! binaries implement against `PostgreSQL` and SMTP.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, and enums
//! - [`auth`] - OTP lifecycle, lockout guard, signed admin tokens, password hashing
//! - [`coupon`] - Coupon discount engine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod coupon;
pub mod types;

pub use types::*;
