use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::{middleware::AuthUser, models::UserResponse, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: UserResponse,
}

/// GET /v1/users/me
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let user = state.identity.current_user(user.id).await?;

    Ok(Json(MeResponse {
        user: user.sanitized(),
    }))
}
