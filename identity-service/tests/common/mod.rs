//! Test helper module for identity-service integration tests.
//!
//! Drives the real router in-process over the in-memory store, so no
//! PostgreSQL instance is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, IdentityConfig, JwtConfig, PasswordConfig, RateLimitConfig,
        SecurityConfig,
    },
    services::MockStore,
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SIGNING_KEY: &str = "integration-test-signing-key-0123456789";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Peer address attached to requests, as `into_make_service_with_connect_info` would.
pub fn test_peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

/// Test application: the full router over a `MockStore`.
pub struct TestApp {
    pub router: Router,
    pub store: MockStore,
    pub state: AppState,
}

/// A captured response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn create_test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: SecretString::new("postgres://unused".to_string()),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            signing_key: SecretString::new(TEST_SIGNING_KEY.to_string()),
            token_validity_hours: 24,
        },
        // Cheap Argon2 cost keeps the suite fast.
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        // Every test request comes from the same peer address, so the
        // default limits are loose; rate limit tests tighten them.
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 900,
            register_attempts: 1000,
            register_window_seconds: 3600,
            trust_forwarded_for: false,
        },
    }
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_config(create_test_config())
    }

    pub fn with_config(config: IdentityConfig) -> Self {
        let store = MockStore::new();
        let state =
            AppState::new(config, Arc::new(store.clone())).expect("Failed to build app state");
        let router = build_router(state.clone());

        Self {
            router,
            store,
            state,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.request_with_headers(method, uri, token, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request_from(test_peer(), method, uri, token, body, extra_headers)
            .await
    }

    /// Send a request as if it arrived on a connection from `peer`.
    pub async fn request_from(
        &self,
        peer: SocketAddr,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(peer));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn register(&self, email: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// Register and log in, returning the session token.
    pub async fn signup(&self, email: &str) -> String {
        let response = self.register(email, TEST_PASSWORD).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        let response = self.login(email, TEST_PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);

        response.body["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    /// Create an org as the token's user and return its id.
    pub async fn create_org(&self, token: &str, name: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/v1/orgs",
                Some(token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

        response.body["org"]["id"]
            .as_str()
            .expect("org id in response")
            .to_string()
    }
}
