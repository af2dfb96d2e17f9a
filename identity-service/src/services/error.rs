use service_core::error::AppError;
use thiserror::Error;

use crate::models::Role;
use crate::services::store::StoreError;

/// Why a session token was rejected.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists")]
    UserExists,

    /// Same signal for unknown email and wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] TokenError),

    #[error("No membership in organization")]
    NoMembership,

    #[error("Role {actual} is below required role {required}")]
    InsufficientRole { required: Role, actual: Role },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Organization still has dependent resources")]
    HasDependents,

    #[error("Operation failed: {0}")]
    OperationFailed(anyhow::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::UserExists => {
                AppError::Conflict(anyhow::anyhow!("User already exists"))
            }
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::Unauthenticated(_) => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            // Both authorization failures render identically at the boundary.
            ServiceError::NoMembership | ServiceError::InsufficientRole { .. } => {
                AppError::Forbidden(anyhow::anyhow!("Access denied"))
            }
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::HasDependents => AppError::Conflict(anyhow::anyhow!(
                "Organization still has dependent resources"
            )),
            ServiceError::OperationFailed(e) => AppError::InternalError(e),
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
