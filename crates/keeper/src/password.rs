//! Argon2id password hashing on the blocking pool

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use tokio::task;

use crate::error::ServiceError;

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Verified against when the email is unknown, so both login failures
    /// cost one hash computation
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(params: Params) -> Result<Self, argon2::password_hash::Error> {
        let dummy_hash = hash_with(&params, "keeper-dummy-password")?;
        Ok(Self { params, dummy_hash })
    }

    /// Argon2id with the crate defaults (19 MiB, 2 iterations)
    pub fn production() -> Result<Self, argon2::password_hash::Error> {
        Self::new(Params::default())
    }

    /// Minimal cost for tests. Never use in a deployment.
    pub fn low_cost() -> Result<Self, argon2::password_hash::Error> {
        let params = Params::new(1024, 1, 1, None)?;
        Self::new(params)
    }

    /// PHC string for `password`
    pub async fn hash(&self, password: String) -> Result<String, ServiceError> {
        let params = self.params.clone();
        task::spawn_blocking(move || hash_with(&params, &password))
            .await
            .map_err(|e| ServiceError::internal("hash_password", e))?
            .map_err(|e| ServiceError::internal("hash_password", e))
    }

    /// Constant-time check of `password` against `stored`. With no stored
    /// hash the dummy is verified instead and the result is always false.
    pub async fn verify(
        &self,
        password: String,
        stored: Option<String>,
    ) -> Result<bool, ServiceError> {
        let known = stored.is_some();
        let hash = stored.unwrap_or_else(|| self.dummy_hash.clone());

        let matches = task::spawn_blocking(move || match PasswordHash::new(&hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        })
        .await
        .map_err(|e| ServiceError::internal("verify_password", e))?;

        Ok(known && matches)
    }
}

fn hash_with(params: &Params, password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());
    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}
