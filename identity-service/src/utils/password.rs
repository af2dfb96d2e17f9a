use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::config::PasswordConfig;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Newtype for a stored credential: an Argon2id PHC string
/// (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id hasher configured with the process-wide cost parameters.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> Result<Self, anyhow::Error> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a freshly generated random salt.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);
        self.hash_with_salt(password, &salt)
    }

    pub(crate) fn hash_with_salt(
        &self,
        password: &Password,
        salt: &SaltString,
    ) -> Result<PasswordHashString, anyhow::Error> {
        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// Verify a password against a stored credential.
    ///
    /// Parameters and salt are read from the credential itself, and the derived
    /// output is compared in constant time. A credential that does not parse
    /// never verifies.
    pub fn verify(&self, password: &Password, stored: &PasswordHashString) -> bool {
        let parsed_hash = match PasswordHash::new(stored.as_str()) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(error = %e, "Stored credential is not a valid PHC string");
                return false;
            }
        };

        self.argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
            .is_ok()
    }
}
