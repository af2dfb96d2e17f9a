use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::{
    models::{canonical_email, User},
    services::{
        metrics::record_auth_event, CredentialStore, JwtService, ServiceError, StoreError,
        TokenResponse,
    },
    utils::{Password, PasswordHashString, PasswordHasher},
};

pub const MIN_PASSWORD_CHARS: usize = 8;

const DUMMY_PASSWORD: &str = "timing-equalisation-placeholder";

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: TokenResponse,
    pub user: User,
}

/// Registration, login and identity lookup.
#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    jwt: JwtService,
    /// Verified against on unknown-email logins.
    dummy_hash: PasswordHashString,
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        jwt: JwtService,
    ) -> Result<Self, anyhow::Error> {
        let dummy_hash = hasher.hash(&Password::new(DUMMY_PASSWORD.to_string()))?;

        Ok(Self {
            store,
            hasher,
            jwt,
            dummy_hash,
        })
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    #[instrument(skip(self, email, password))]
    pub async fn register(&self, email: &str, password: Password) -> Result<User, ServiceError> {
        let email = canonical_email(email);
        if !email.validate_email() {
            return Err(ServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }
        if password.char_len() < MIN_PASSWORD_CHARS {
            return Err(ServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }

        let password_hash = self.hash_password(password).await?;
        let user = User::new(email, password_hash.into_string());

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => {
                record_auth_event("register", "conflict");
                return Err(ServiceError::UserExists);
            }
            Err(e) => return Err(ServiceError::Store(e)),
        }

        record_auth_event("register", "success");
        tracing::info!(user_id = %user.id, "User registered");

        Ok(user)
    }

    #[instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: Password) -> Result<Session, ServiceError> {
        let email = canonical_email(email);
        let user = self.store.find_user_by_email(&email).await?;

        let (stored, user) = match user {
            Some(user) => (PasswordHashString::new(user.password_hash.clone()), Some(user)),
            None => (self.dummy_hash.clone(), None),
        };

        let verified = self.verify_password(password, stored).await?;

        let user = match user {
            Some(user) if verified => user,
            _ => {
                record_auth_event("login", "failure");
                tracing::info!("Login rejected");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        let token = self.jwt.issue(&user)?;

        record_auth_event("login", "success");
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(Session { token, user })
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::NotFound("User"))
    }

    /// Tokens are stateless: logout is recorded but the token stays valid
    /// until it expires.
    pub fn logout(&self, user_id: Uuid) {
        record_auth_event("logout", "success");
        tracing::info!(user_id = %user_id, "User logged out");
    }

    async fn hash_password(&self, password: Password) -> Result<PasswordHashString, ServiceError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?
            .map_err(ServiceError::Internal)
    }

    async fn verify_password(
        &self,
        password: Password,
        stored: PasswordHashString,
    ) -> Result<bool, ServiceError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Verification task failed: {}", e)))
    }
}
