//! Admin session scenarios: lockout over an admin identity store, then the
//! signed token and companion cookies issued on success.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum_extra::extract::cookie::{CookieJar, SameSite};
use chrono::Duration;
use secrecy::SecretString;

use emporium_admin::middleware::{ADMIN_ID_COOKIE, ADMIN_TOKEN_COOKIE, clear_cookies, session_cookies};
use emporium_core::AdminUserId;
use emporium_core::auth::{
    AuthError, GuardedCredential, LockState, LockoutGuard, LockoutStore, StoreError, TokenSigner,
    hash_password,
};
use emporium_integration_tests::{admin_error, epoch};

const SECRET: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%";

/// Admin lock state keyed by id, standing in for `admin.admin_user`.
#[derive(Default)]
struct AdminLocks {
    states: Mutex<HashMap<AdminUserId, LockState>>,
}

impl AdminLocks {
    fn credential(&self, id: AdminUserId, password_hash: &str) -> GuardedCredential<AdminUserId> {
        GuardedCredential {
            id,
            password_hash: password_hash.to_string(),
            lock: self.states.lock().unwrap().get(&id).copied().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LockoutStore for AdminLocks {
    type Id = AdminUserId;

    async fn save_lock_state(&self, id: &AdminUserId, state: &LockState) -> Result<(), StoreError> {
        self.states.lock().unwrap().insert(*id, *state);
        Ok(())
    }
}

fn signer(secret: &str) -> TokenSigner {
    TokenSigner::new(SecretString::from(secret)).unwrap()
}

/// Turn the `Set-Cookie` output of a jar into the `Cookie` header a browser
/// would send back.
fn echo_cookies(jar: CookieJar) -> HeaderMap {
    let pairs: Vec<String> = jar
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(&pairs.join("; ")).unwrap(),
    );
    headers
}

#[tokio::test]
async fn test_admin_lockout_then_token_issue() {
    let store = AdminLocks::default();
    let guard = LockoutGuard::default();
    let id = AdminUserId::new(1);
    let hash = hash_password("operator-password").unwrap();
    let mut now = epoch();

    for _ in 0..4 {
        let err = guard
            .verify(&store, &store.credential(id, &hash), "guess", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidPassword { .. }));
    }
    let err = guard
        .verify(&store, &store.credential(id, &hash), "guess", now)
        .await
        .unwrap_err();

    let (status, body) = admin_error(err).await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["retry_after_minutes"], 15);

    now += Duration::minutes(15);
    guard
        .verify(&store, &store.credential(id, &hash), "operator-password", now)
        .await
        .unwrap();
    assert!(store.credential(id, &hash).lock.is_clear());

    let signer = signer(SECRET);
    let token = signer.issue(now);
    let jar = session_cookies(CookieJar::new(), token, id, true);

    let token_cookie = jar.get(ADMIN_TOKEN_COOKIE).unwrap();
    assert_eq!(token_cookie.http_only(), Some(true));
    assert_eq!(token_cookie.secure(), Some(true));
    assert_eq!(token_cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(token_cookie.max_age(), Some(time::Duration::hours(4)));

    // What the browser sends back verifies, and names the admin.
    let returned = CookieJar::from_headers(&echo_cookies(jar));
    assert!(signer.verify(returned.get(ADMIN_TOKEN_COOKIE).unwrap().value()));
    assert_eq!(returned.get(ADMIN_ID_COOKIE).unwrap().value(), "1");
}

#[tokio::test]
async fn test_unknown_admin_failure_is_opaque() {
    let (status, body) = admin_error(AuthError::InvalidPassword {
        remaining_attempts: 2,
    })
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["remaining_attempts"], 2);

    let (status, body) = admin_error(AuthError::Store(StoreError::Backend(
        "admin db unreachable".to_string(),
    )))
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.to_string().contains("unreachable"));
}

#[test]
fn test_rotated_secret_invalidates_tokens() {
    let token = signer(SECRET).issue(epoch());
    let rotated = signer("Zq8#Lm2!Vx5@Tr9$Kp3&Wn6*Hs1^Bd4%");

    assert!(signer(SECRET).verify(&token));
    assert!(!rotated.verify(&token));
}

#[test]
fn test_tampered_tokens_are_rejected() {
    let signer = signer(SECRET);
    let token = signer.issue(epoch());
    let (payload, signature) = token.rsplit_once('.').unwrap();

    let later = payload.replacen("v1:", "v1:9", 1);
    assert!(!signer.verify(&format!("{later}.{signature}")));
    assert!(!signer.verify(payload));
    assert!(!signer.verify(&token[..token.len() - 1]));
    assert!(!signer.verify(&format!("v2{}", &token[2..])));
    assert!(!signer.verify(""));
}

#[test]
fn test_logout_expires_both_cookies() {
    let jar = session_cookies(
        CookieJar::new(),
        signer(SECRET).issue(epoch()),
        AdminUserId::new(3),
        false,
    );
    let cleared = clear_cookies(jar);

    assert!(cleared.get(ADMIN_TOKEN_COOKIE).is_none());
    assert!(cleared.get(ADMIN_ID_COOKIE).is_none());
}

#[test]
fn test_empty_secret_is_a_configuration_error() {
    assert!(TokenSigner::new(SecretString::from("")).is_err());
}
