pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::{
    AuthorizationService, CredentialStore, IdentityService, JwtService,
    MembershipTransactionManager, OrganizationService,
};
use crate::utils::PasswordHasher;

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn CredentialStore>,
    pub jwt: JwtService,
    pub identity: IdentityService,
    pub membership: MembershipTransactionManager,
    pub orgs: OrganizationService,
    pub login_rate_limit: IpRateLimit,
    pub register_rate_limit: IpRateLimit,
}

impl AppState {
    /// Wire every service over one store handle.
    pub fn new(config: IdentityConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(&config.password).map_err(AppError::ConfigError)?;
        let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;

        let identity = IdentityService::new(store.clone(), hasher, jwt.clone())?;
        let membership = MembershipTransactionManager::new(store.clone());
        let orgs = OrganizationService::new(store.clone(), AuthorizationService::new(store.clone()));

        let trust_forwarded_for = config.rate_limit.trust_forwarded_for;
        let login_rate_limit = IpRateLimit::new(
            create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            )?,
            trust_forwarded_for,
        );
        let register_rate_limit = IpRateLimit::new(
            create_ip_rate_limiter(
                config.rate_limit.register_attempts,
                config.rate_limit.register_window_seconds,
            )?,
            trust_forwarded_for,
        );

        Ok(Self {
            config,
            store,
            jwt,
            identity,
            membership,
            orgs,
            login_rate_limit,
            register_rate_limit,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limit.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.register_rate_limit.clone(),
            ip_rate_limit_middleware,
        ));

    let authenticated = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users/me", get(handlers::user::get_me))
        .route(
            "/orgs",
            get(handlers::org::list_orgs).post(handlers::org::create_org),
        )
        .route(
            "/orgs/:org_id",
            get(handlers::org::get_org)
                .patch(handlers::org::update_org)
                .delete(handlers::org::delete_org),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let v1 = Router::new()
        .merge(login_route)
        .merge(register_route)
        .merge(authenticated);

    let cors = cors_layer(&state.config.security.allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .nest("/v1", v1)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

/// Service health check, including store reachability.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "store": "up",
    })))
}
