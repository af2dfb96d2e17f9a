//! Registration, login and session integration tests.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{create_test_config, TestApp, TEST_PASSWORD};
use identity_service::services::JwtService;
use serde_json::json;
use std::net::SocketAddr;

#[tokio::test]
async fn register_returns_201_without_credential_material() {
    let app = TestApp::spawn();

    let response = app.register("a@x.com", "password123").await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["user"]["email"], "a@x.com");
    assert!(response.body["user"]["id"].is_string());
    let raw = response.body.to_string();
    assert!(!raw.contains("argon2"));
    assert!(!raw.contains("password"));
}

#[tokio::test]
async fn register_duplicate_email_returns_409() {
    let app = TestApp::spawn();
    assert_eq!(
        app.register("a@x.com", "password123").await.status,
        StatusCode::CREATED
    );

    // Canonicalised before the uniqueness check.
    let response = app.register(" A@X.com ", "password456").await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.body["error"], "User already exists");
    assert_eq!(app.store.user_count().expect("count"), 1);
}

#[tokio::test]
async fn register_rejects_invalid_input_with_400() {
    let app = TestApp::spawn();

    let cases = [
        json!({ "email": "not-an-email", "password": "password123" }),
        json!({ "email": "a@x.com", "password": "short" }),
        json!({ "email": "a@x.com", "password": "x".repeat(2000) }),
        json!({ "email": "a@x.com" }),
    ];

    for body in cases {
        let response = app
            .request(Method::POST, "/v1/auth/register", None, Some(body.clone()))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "body: {}", body);
    }

    assert_eq!(app.store.user_count().expect("count"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_registration_admits_exactly_one() {
    let app = TestApp::spawn();

    let (a, b) = tokio::join!(
        app.register("race@x.com", "password123"),
        app.register("race@x.com", "password123"),
    );

    let mut statuses = [a.status, b.status];
    statuses.sort_by_key(|s| s.as_u16());
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::CONFLICT]);
    assert_eq!(app.store.user_count().expect("count"), 1);
}

#[tokio::test]
async fn login_returns_token_and_user() {
    let app = TestApp::spawn();
    app.register("a@x.com", "password123").await;

    let response = app.login("A@x.com", "password123").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["token_type"], "Bearer");
    assert_eq!(response.body["expires_in"], 86400);
    assert_eq!(response.body["user"]["email"], "a@x.com");

    // The token is the bare JWT string, not a nested object.
    assert!(response.body["token"].is_string(), "{}", response.body);
    let token = response.body["token"].as_str().expect("token");
    let claims = tokio_test::assert_ok!(app.state.jwt.validate(token));
    assert_eq!(claims.email, "a@x.com");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = TestApp::spawn();
    app.register("a@x.com", "password123").await;

    let wrong_password = app.login("a@x.com", "password124").await;
    let unknown_email = app.login("nobody@x.com", "password123").await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn me_requires_valid_token() {
    let app = TestApp::spawn();
    let token = app.signup("me@x.com").await;

    let response = app
        .request(Method::GET, "/v1/users/me", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], "me@x.com");

    let missing = app.request(Method::GET, "/v1/users/me", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let garbage = app
        .request(Method::GET, "/v1/users/me", Some("not.a.token"), None)
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_other_key_is_rejected() {
    let app = TestApp::spawn();
    let token = app.signup("me@x.com").await;
    let claims = app.state.jwt.validate(&token).expect("valid");

    let foreign = JwtService::from_secret(b"some-other-signing-key-0123456789", Duration::hours(24));
    let user = app
        .state
        .identity
        .current_user(claims.user_id().expect("uuid"))
        .await
        .expect("user");
    let forged = foreign.issue(&user).expect("issue").access_token;

    let response = app
        .request(Method::GET, "/v1/users/me", Some(&forged), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::spawn();
    let token = app.signup("me@x.com").await;
    let claims = app.state.jwt.validate(&token).expect("valid");
    let user = app
        .state
        .identity
        .current_user(claims.user_id().expect("uuid"))
        .await
        .expect("user");

    let stale = app
        .state
        .jwt
        .issue_at(&user, Utc::now() - Duration::hours(24) - Duration::seconds(1))
        .expect("issue")
        .access_token;

    let response = app
        .request(Method::GET, "/v1/users/me", Some(&stale), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "Invalid or expired token");
}

#[tokio::test]
async fn logout_is_advisory() {
    let app = TestApp::spawn();
    let token = app.signup("me@x.com").await;

    let response = app
        .request(Method::POST, "/v1/auth/logout", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Logged out");

    // Stateless session: still valid until expiry.
    let response = app
        .request(Method::GET, "/v1/users/me", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

fn rate_limited_app(trust_forwarded_for: bool) -> TestApp {
    let mut config = create_test_config();
    config.rate_limit.login_attempts = 5;
    config.rate_limit.register_attempts = 3;
    config.rate_limit.trust_forwarded_for = trust_forwarded_for;
    TestApp::with_config(config)
}

fn peer(addr: &str) -> SocketAddr {
    addr.parse().expect("socket addr")
}

#[tokio::test]
async fn login_is_rate_limited_per_peer() {
    let app = rate_limited_app(false);
    app.register("a@x.com", TEST_PASSWORD).await;

    let body = json!({ "email": "a@x.com", "password": "wrong-password" });
    let client = peer("203.0.113.7:51000");

    for _ in 0..5 {
        let response = app
            .request_from(client, Method::POST, "/v1/auth/login", None, Some(body.clone()), &[])
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let response = app
        .request_from(client, Method::POST, "/v1/auth/login", None, Some(body), &[])
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers.contains_key("retry-after"));

    // Other clients are unaffected.
    let response = app
        .request_from(
            peer("198.51.100.1:51000"),
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "a@x.com", "password": TEST_PASSWORD })),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_reset_quota() {
    let app = rate_limited_app(false);
    app.register("a@x.com", TEST_PASSWORD).await;

    let body = json!({ "email": "a@x.com", "password": "wrong-password" });
    let client = peer("203.0.113.7:51000");

    let mut limited = 0;
    for i in 0..20 {
        let forwarded = format!("10.1.0.{}", i);
        let response = app
            .request_from(
                client,
                Method::POST,
                "/v1/auth/login",
                None,
                Some(body.clone()),
                &[("x-forwarded-for", forwarded.as_str())],
            )
            .await;
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }

    assert_eq!(limited, 15);
}

#[tokio::test]
async fn forwarded_for_keys_limits_when_trusted() {
    let app = rate_limited_app(true);
    app.register("a@x.com", TEST_PASSWORD).await;

    let body = json!({ "email": "a@x.com", "password": "wrong-password" });
    let proxy = peer("10.0.0.1:443");
    let headers = [("x-forwarded-for", "203.0.113.7")];

    for _ in 0..5 {
        let response = app
            .request_from(proxy, Method::POST, "/v1/auth/login", None, Some(body.clone()), &headers)
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }
    let response = app
        .request_from(proxy, Method::POST, "/v1/auth/login", None, Some(body), &headers)
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    // A different client behind the same proxy keeps its own quota.
    let response = app
        .request_from(
            proxy,
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "a@x.com", "password": TEST_PASSWORD })),
            &[("x-forwarded-for", "198.51.100.1")],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn register_is_rate_limited() {
    let app = rate_limited_app(false);

    for i in 0..3 {
        let response = app.register(&format!("user{}@x.com", i), TEST_PASSWORD).await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let response = app.register("user3@x.com", TEST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(app.store.user_count().expect("count"), 3);
}
