//! Customer account scenarios: signup, verification, lockout, and reset,
//! plus how the storefront API reports each failure.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::Duration;

use emporium_core::Email;
use emporium_core::auth::AuthError;
use emporium_core::auth::AccountStore;
use emporium_integration_tests::{Harness, storefront_error};

const EMAIL: &str = "a@x.com";
const PASSWORD: &str = "first-password";

async fn verified_account(h: &Harness) {
    h.service().signup(EMAIL, Some("Ada"), PASSWORD).await.unwrap();
    let code = h.last_code(EMAIL);
    h.service().verify_signup(EMAIL, &code).await.unwrap();
}

#[tokio::test]
async fn test_signup_verify_then_login() {
    let h = Harness::default();

    let sent = h.service().signup(" A@X.com ", Some("Ada"), PASSWORD).await.unwrap();
    assert_eq!(sent.email.as_str(), EMAIL);
    assert_eq!(sent.next_resend_seconds, 60);

    let err = h.service().login(EMAIL, PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::Unverified));

    let code = h.last_code(EMAIL);
    assert_eq!(code.len(), 6);
    let account = h.service().verify_signup(EMAIL, &code).await.unwrap();
    assert!(account.verified);

    // The code is single use.
    let err = h.service().verify_signup(EMAIL, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound));

    let account = h.service().login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(account.name.as_deref(), Some("Ada"));
}

#[tokio::test]
async fn test_verified_email_cannot_sign_up_again() {
    let h = Harness::default();
    verified_account(&h).await;

    let err = h
        .service()
        .signup(EMAIL, Some("Mallory"), "another-password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AlreadyRegistered));
    assert_eq!(h.accounts.len(), 1);

    let (status, body) = storefront_error(err).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_registered");
}

#[tokio::test]
async fn test_repeat_signup_replaces_pending_credentials() {
    let h = Harness::default();
    h.service().signup(EMAIL, Some("Ada"), "typo-password").await.unwrap();

    // Inside the first cooldown nothing is overwritten.
    h.clock.advance(Duration::seconds(20));
    let err = h
        .service()
        .signup(EMAIL, Some("Ada L."), PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TooManyRequests { remaining_seconds: 40 }));

    let (status, body) = storefront_error(err).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["remaining_seconds"], 40);

    h.clock.advance(Duration::seconds(40));
    let sent = h.service().signup(EMAIL, Some("Ada L."), PASSWORD).await.unwrap();
    assert_eq!(sent.next_resend_seconds, 300);
    assert_eq!(h.accounts.len(), 1);
    assert_eq!(h.mail.sent_count(), 2);

    let code = h.last_code(EMAIL);
    h.service().verify_signup(EMAIL, &code).await.unwrap();

    assert!(h.service().login(EMAIL, "typo-password").await.is_err());
    let account = h.service().login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(account.name.as_deref(), Some("Ada L."));
}

#[tokio::test]
async fn test_resend_cooldown_escalates() {
    let h = Harness::default();
    h.service().signup(EMAIL, None, PASSWORD).await.unwrap();

    h.clock.advance(Duration::seconds(15));
    let err = h.service().resend_signup_code(EMAIL).await.unwrap_err();
    assert!(matches!(err, AuthError::TooManyRequests { remaining_seconds: 45 }));

    h.clock.advance(Duration::seconds(45));
    let sent = h.service().resend_signup_code(EMAIL).await.unwrap();
    assert_eq!(sent.next_resend_seconds, 300);

    h.clock.advance(Duration::seconds(100));
    let err = h.service().resend_signup_code(EMAIL).await.unwrap_err();
    assert!(matches!(err, AuthError::TooManyRequests { remaining_seconds: 200 }));

    h.clock.advance(Duration::seconds(200));
    h.service().resend_signup_code(EMAIL).await.unwrap();
    assert_eq!(h.mail.sent_count(), 3);
}

#[tokio::test]
async fn test_wrong_codes_exhaust_the_record() {
    let h = Harness::default();
    h.service().signup(EMAIL, None, PASSWORD).await.unwrap();
    let code = h.last_code(EMAIL);
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for remaining in (1..=4).rev() {
        let err = h.service().verify_signup(EMAIL, wrong).await.unwrap_err();
        assert!(
            matches!(err, AuthError::Mismatch { remaining_attempts } if remaining_attempts == remaining)
        );
    }

    let err = h.service().verify_signup(EMAIL, wrong).await.unwrap_err();
    assert!(matches!(err, AuthError::Exhausted));

    let (status, body) = storefront_error(err).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "exhausted");

    // The record is gone, so even the right code no longer works.
    let err = h.service().verify_signup(EMAIL, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}

#[tokio::test]
async fn test_code_expires_after_fifteen_minutes() {
    let h = Harness::default();
    h.service().signup(EMAIL, None, PASSWORD).await.unwrap();
    let code = h.last_code(EMAIL);

    h.clock.advance(Duration::minutes(15) + Duration::seconds(1));
    let err = h.service().verify_signup(EMAIL, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::Expired));

    let err = h.service().verify_signup(EMAIL, &code).await.unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}

#[tokio::test]
async fn test_lockout_after_five_failures_then_recovery() {
    let h = Harness::default();
    verified_account(&h).await;

    for remaining in (1..=4).rev() {
        let err = h.service().login(EMAIL, "wrong-password").await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidPassword { remaining_attempts } if remaining_attempts == remaining)
        );
    }
    let err = h.service().login(EMAIL, "wrong-password").await.unwrap_err();
    assert!(matches!(err, AuthError::Locked { retry_after_minutes: 15 }));

    // The lock carries the penalty; the counter is back to zero.
    let email = Email::parse(EMAIL).unwrap();
    let stored = h.accounts.find_by_email(&email).await.unwrap().unwrap();
    assert_eq!(stored.lock.failed_attempts, 0);
    assert!(stored.lock.locked_until.is_some());

    // Even the right password is refused while locked.
    h.clock.advance(Duration::minutes(10));
    let err = h.service().login(EMAIL, PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::Locked { retry_after_minutes: 5 }));

    let (status, body) = storefront_error(err).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["retry_after_minutes"], 5);

    h.clock.advance(Duration::minutes(5));
    h.service().login(EMAIL, PASSWORD).await.unwrap();

    let stored = h.accounts.find_by_email(&email).await.unwrap().unwrap();
    assert!(stored.lock.is_clear());
}

#[tokio::test]
async fn test_password_reset_replaces_password_and_clears_lock() {
    let h = Harness::default();
    verified_account(&h).await;
    for _ in 0..5 {
        let _ = h.service().login(EMAIL, "wrong-password").await;
    }

    let sent = h.service().request_password_reset(EMAIL).await.unwrap();
    assert_eq!(sent.next_resend_seconds, 60);

    // A weak password is refused before the code is checked.
    let err = h
        .service()
        .reset_password(EMAIL, "not-a-code", "x")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::WeakPassword(_)));

    let code = h.last_code(EMAIL);
    h.service()
        .reset_password(EMAIL, &code, "second-password")
        .await
        .unwrap();

    assert!(h.service().login(EMAIL, PASSWORD).await.is_err());
    h.service().login(EMAIL, "second-password").await.unwrap();
}

#[tokio::test]
async fn test_reset_requires_verified_account() {
    let h = Harness::default();
    h.service().signup(EMAIL, None, PASSWORD).await.unwrap();

    let err = h.service().request_password_reset(EMAIL).await.unwrap_err();
    assert!(matches!(err, AuthError::Unverified));

    let err = h
        .service()
        .request_password_reset("nobody@x.com")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound));
}

#[tokio::test]
async fn test_failed_dispatch_keeps_record_and_hides_detail() {
    let h = Harness {
        mail: std::sync::Arc::new(emporium_core::auth::memory::RecordingDispatcher::failing()),
        ..Harness::default()
    };

    let err = h.service().signup(EMAIL, None, PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::Dispatch(_)));

    // The record survives, so the resend cooldown applies.
    let resend = h.service().resend_signup_code(EMAIL).await.unwrap_err();
    assert!(matches!(resend, AuthError::TooManyRequests { .. }));

    let (status, body) = storefront_error(err).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.to_string().contains("relay refused connection"));
}
