use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;
use crate::services::error::TokenError;

/// Issues and validates HS256 session tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }
}

/// Token returned to the client after login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.token_validity_hours <= 0 {
            anyhow::bail!("Token validity must be positive");
        }

        let service = Self::from_secret(
            config.signing_key.expose_secret().as_bytes(),
            Duration::hours(config.token_validity_hours),
        );

        tracing::info!(
            validity_hours = config.token_validity_hours,
            "JWT service initialized with HS256 key"
        );

        Ok(service)
    }

    pub fn from_secret(secret: &[u8], validity: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validity,
        }
    }

    pub fn validity_seconds(&self) -> i64 {
        self.validity.num_seconds()
    }

    /// Issue a session token for a user, valid from now.
    pub fn issue(&self, user: &User) -> Result<TokenResponse, anyhow::Error> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<TokenResponse, anyhow::Error> {
        let claims = SessionClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))?;

        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.validity_seconds(),
        })
    }

    /// Validate a session token against the current time.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Signature first, then expiry. A token is expired once `now >= exp`,
    /// with no leeway.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed,
            })?
            .claims;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    const SECRET: &[u8] = b"test-signing-key-that-is-32-bytes!!";

    fn service() -> JwtService {
        JwtService::from_secret(SECRET, Duration::hours(24))
    }

    fn user() -> User {
        User::new("a@x.com".to_string(), "$argon2id$stub".to_string())
    }

    #[test]
    fn test_jwt_service_creation() {
        let config = JwtConfig {
            signing_key: SecretString::new("k".repeat(32)),
            token_validity_hours: 24,
        };
        let service = JwtService::new(&config).expect("valid config");
        assert_eq!(service.validity_seconds(), 24 * 3600);

        let config = JwtConfig {
            signing_key: SecretString::new("k".repeat(32)),
            token_validity_hours: 0,
        };
        assert!(JwtService::new(&config).is_err());
    }

    #[test]
    fn test_issue_and_validate() {
        let service = service();
        let user = user();
        let token = service.issue(&user).expect("issue");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, 86400);

        let claims = service.validate(&token.access_token).expect("valid");
        assert_eq!(claims.user_id(), Ok(user.id));
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp - claims.iat, 86400);
    }

    #[test]
    fn test_expiry_boundary() {
        let service = service();
        let issued = Utc::now();
        let token = service.issue_at(&user(), issued).expect("issue").access_token;

        let just_before = issued + Duration::hours(23) + Duration::minutes(59);
        assert!(service.validate_at(&token, just_before).is_ok());

        assert_eq!(
            service.validate_at(&token, issued + Duration::hours(24)),
            Err(TokenError::Expired)
        );
        assert_eq!(
            service.validate_at(&token, issued + Duration::hours(24) + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_wrong_key_is_invalid_signature() {
        let token = service().issue(&user()).expect("issue").access_token;
        let other = JwtService::from_secret(b"another-signing-key-of-32-bytes!!!", Duration::hours(24));

        assert_eq!(other.validate(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let service = service();
        assert_eq!(service.validate("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(service.validate(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_tampered_payload_is_invalid_signature() {
        let service = service();
        let victim = service.issue(&user()).expect("issue").access_token;
        let attacker = service
            .issue(&User::new("evil@x.com".to_string(), "stub".to_string()))
            .expect("issue")
            .access_token;

        // Splice the attacker's payload under the victim's signature.
        let victim_parts: Vec<&str> = victim.split('.').collect();
        let attacker_parts: Vec<&str> = attacker.split('.').collect();
        let forged = format!(
            "{}.{}.{}",
            victim_parts[0], attacker_parts[1], victim_parts[2]
        );

        assert_eq!(service.validate(&forged), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_expiry_checked_after_signature() {
        let token = service()
            .issue_at(&user(), Utc::now() - Duration::hours(48))
            .expect("issue")
            .access_token;
        let other = JwtService::from_secret(b"another-signing-key-of-32-bytes!!!", Duration::hours(24));

        assert_eq!(other.validate(&token), Err(TokenError::InvalidSignature));
        assert_eq!(service().validate(&token), Err(TokenError::Expired));
    }
}
