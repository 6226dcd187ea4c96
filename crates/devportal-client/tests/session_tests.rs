//! Sign-in, sign-out and recovery from rejected sessions.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{DEVELOPER_JSON, fixture, signed_in};
use devportal_client::{IdentityProvider, PortalError, SignInOutcome, UnauthorizedPolicy};
use reqwest::Method;

const LOGIN: &str = "/api/auth/login";
const LOGOUT: &str = "/api/auth/logout";

// ── Sign-in ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sign_in_exchanges_identity_token() {
    let f = fixture(UnauthorizedPolicy::SignOut);
    assert!(!f.portal.is_signed_in());

    let outcome = f.portal.sign_in().await.unwrap();
    let SignInOutcome::Registered(me) = outcome else {
        panic!("expected a registered developer");
    };
    assert_eq!(me.email(), Some("dev@example.com"));
    assert!(f.portal.is_signed_in());

    let body = f.transport.last_body(&Method::POST, LOGIN).unwrap();
    assert_eq!(body, serde_json::json!({"idToken": "token-1"}));
}

#[tokio::test]
async fn test_unregistered_user_completes_registration() {
    let f = fixture(UnauthorizedPolicy::SignOut);
    f.transport
        .respond_once(Method::GET, "/api/me", 404, r#"{"error": "Developer not found"}"#);
    f.transport
        .respond(Method::POST, "/api/registerSelfAsDeveloper", 201, DEVELOPER_JSON);

    assert_eq!(f.portal.sign_in().await.unwrap(), SignInOutcome::NeedsRegistration);
    assert!(f.portal.is_signed_in());

    let me = f.portal.complete_registration().await.unwrap();
    assert_eq!(me.developer_id, "dev-1");
    assert_eq!(f.transport.count(&Method::GET, "/api/me"), 2);
}

#[tokio::test]
async fn test_failed_lookup_after_sign_in_signs_out() {
    let f = fixture(UnauthorizedPolicy::SignOut);
    f.transport.respond(Method::GET, "/api/me", 500, r#"{"error": "apigee down"}"#);

    let err = f.portal.sign_in().await.unwrap_err();
    assert_eq!(err.user_message(), "apigee down");
    assert!(!f.portal.is_signed_in());
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert_eq!(f.identity.sign_outs(), 1);
}

#[tokio::test]
async fn test_rejected_login_does_not_trigger_recovery() {
    let f = fixture(UnauthorizedPolicy::RefreshThenSignOut);
    f.transport
        .respond(Method::POST, LOGIN, 401, r#"{"error": "Invalid ID token"}"#);

    let err = f.portal.sign_in().await.unwrap_err();
    assert!(matches!(err, PortalError::Unauthorized { ref message } if message == "Invalid ID token"));
    assert_eq!(f.transport.count(&Method::POST, LOGIN), 1);
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 0);
    assert_eq!(f.identity.sign_outs(), 0);
}

// ── Sign-out ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sign_out_survives_backend_logout_failure() {
    let f = signed_in(UnauthorizedPolicy::SignOut).await;
    f.transport.respond(Method::POST, LOGOUT, 401, "");

    f.portal.sign_out().await.unwrap();
    assert!(!f.portal.is_signed_in());
    assert!(!f.portal.backend().cache().developer.contains(&()));
    assert_eq!(f.identity.sign_outs(), 1);
    assert_eq!(f.portal.session().sign_out_count(), 1);
    assert!(f.identity.current_user().is_none());
}

// ── 401 handling ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_401s_sign_out_exactly_once() {
    let f = signed_in(UnauthorizedPolicy::SignOut).await;
    f.transport.respond(Method::GET, "/api/apiproducts", 401, r#"{"error": "expired"}"#);
    f.transport.respond(Method::GET, "/api/myapps", 401, "");
    f.transport.respond(Method::GET, "/api/myapps/orders", 401, "");
    let backend = f.portal.backend();
    assert!(backend.cache().developer.contains(&()));

    let (a, b, c) = tokio::join!(
        backend.api_products(),
        backend.developer_app_names(),
        backend.developer_app("orders"),
    );
    assert!(matches!(a, Err(PortalError::Unauthorized { .. })));
    assert!(matches!(b, Err(PortalError::Unauthorized { .. })));
    assert!(matches!(c, Err(PortalError::Unauthorized { .. })));

    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert_eq!(f.identity.sign_outs(), 1);
    assert_eq!(f.portal.session().sign_out_count(), 1);
    assert!(!f.portal.is_signed_in());
    assert!(!backend.cache().developer.contains(&()));

    // a late 401 after sign-out does not sign out again
    backend.api_products().await.unwrap_err();
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
}

#[tokio::test]
async fn test_refresh_policy_replays_request_after_relogin() {
    let f = signed_in(UnauthorizedPolicy::RefreshThenSignOut).await;
    f.transport.respond_once(Method::GET, "/api/apiproducts", 401, "");
    f.transport.respond(
        Method::GET,
        "/api/apiproducts",
        200,
        r#"[{"id": "p1", "name": "Orders API", "description": "orders"}]"#,
    );

    let products = f.portal.backend().api_products().await.unwrap();
    assert_eq!(products[0].name, "Orders API");
    assert_eq!(f.transport.count(&Method::GET, "/api/apiproducts"), 2);
    assert_eq!(f.transport.count(&Method::POST, LOGIN), 2);
    assert_eq!(
        f.transport.last_body(&Method::POST, LOGIN).unwrap(),
        serde_json::json!({"idToken": "token-2"})
    );
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 0);
    assert!(f.portal.is_signed_in());
}

#[tokio::test]
async fn test_refresh_policy_signs_out_when_relogin_fails() {
    let f = signed_in(UnauthorizedPolicy::RefreshThenSignOut).await;
    f.transport.respond(Method::POST, LOGIN, 401, "");
    f.transport.respond(Method::GET, "/api/apiproducts", 401, "");

    let err = f.portal.backend().api_products().await.unwrap_err();
    assert!(matches!(err, PortalError::Unauthorized { .. }));
    assert_eq!(f.transport.count(&Method::GET, "/api/apiproducts"), 1);
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert!(!f.portal.is_signed_in());
}

#[tokio::test]
async fn test_refresh_policy_replays_only_once() {
    let f = signed_in(UnauthorizedPolicy::RefreshThenSignOut).await;
    f.transport.respond(Method::GET, "/api/apiproducts", 401, "");

    f.portal.backend().api_products().await.unwrap_err();
    assert_eq!(f.transport.count(&Method::GET, "/api/apiproducts"), 2);
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert_eq!(f.identity.sign_outs(), 1);
}

#[tokio::test]
async fn test_restored_session_is_recovered_on_401() {
    let f = fixture(UnauthorizedPolicy::SignOut);
    f.portal.resume();
    f.transport.respond(Method::GET, "/api/me", 401, "");

    f.portal.backend().developer_details().await.unwrap_err();
    assert_eq!(f.transport.count(&Method::POST, LOGIN), 0);
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert!(!f.portal.is_signed_in());
}

#[tokio::test]
async fn test_unauthorized_before_sign_in_signs_out_identity() {
    let f = fixture(UnauthorizedPolicy::SignOut);
    assert!(!f.portal.is_signed_in());
    f.transport.respond(Method::GET, "/api/me", 401, "");

    let err = f.portal.backend().developer_details().await.unwrap_err();
    assert!(matches!(err, PortalError::Unauthorized { .. }));
    assert_eq!(f.identity.sign_outs(), 1);
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert!(f.identity.current_user().is_none());

    // already signed out: a second 401 only clears the caches
    f.portal.backend().developer_details().await.unwrap_err();
    assert_eq!(f.identity.sign_outs(), 1);
    assert_eq!(f.transport.count(&Method::POST, LOGOUT), 1);
    assert_eq!(f.transport.count(&Method::GET, "/api/me"), 2);
}
