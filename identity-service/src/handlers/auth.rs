//! Authentication handlers: registration, login and advisory logout.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    middleware::AuthUser,
    models::UserResponse,
    utils::{Password, ValidatedJson},
    AppState,
};

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Registration request. Format and minimum length are checked by the
/// identity service; the bounds here only cap request size.
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(max = 320, message = "Email is too long"))]
    pub email: String,

    #[validate(length(max = 1024, message = "Password is too long"))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(max = 320, message = "Email is too long"))]
    pub email: String,

    #[validate(length(max = 1024, message = "Password is too long"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
}

/// `token` is the bare JWT; clients send it back as a bearer credential.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Message response for simple operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let user = state
        .identity
        .register(&req.email, Password::new(req.password))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.sanitized(),
        }),
    ))
}

/// POST /v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let session = state
        .identity
        .login(&req.email, Password::new(req.password))
        .await?;

    Ok(Json(LoginResponse {
        token: session.token.access_token,
        token_type: session.token.token_type,
        expires_in: session.token.expires_in,
        user: session.user.sanitized(),
    }))
}

/// POST /v1/auth/logout
///
/// Sessions are stateless, so the presented token stays valid until it
/// expires; clients are expected to discard it.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
) -> Json<MessageResponse> {
    state.identity.logout(user.id);

    Json(MessageResponse {
        message: "Logged out".to_string(),
    })
}
