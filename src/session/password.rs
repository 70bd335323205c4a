//! Password hashing with Argon2id.

use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _,
    PasswordVerifier, Version,
};
use rand::rngs::OsRng;

use crate::config::PasswordHashConfig;
use crate::error::SessionError;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Argon2id hasher.
///
/// Hashing and verification run on the blocking pool so that a burst of
/// logins cannot starve the async workers.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Hash of a throwaway password, verified against when the email is
    /// unknown so both failure paths cost the same.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(config: &PasswordHashConfig) -> Result<Self, SessionError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| SessionError::Internal(format!("argon2 params: {e}")))?;
        let dummy_hash = hash_with(&params, "timing-equaliser-not-a-password")?;
        Ok(Self { params, dummy_hash })
    }

    pub async fn hash(&self, plain: String) -> Result<String, SessionError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || hash_with(&params, &plain))
            .await
            .map_err(|e| SessionError::Internal(format!("hash task: {e}")))?
    }

    /// Returns `Ok(false)` on mismatch; errors only on a corrupt stored hash.
    pub async fn verify(&self, plain: String, hash: String) -> Result<bool, SessionError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || verify_with(&params, &plain, &hash))
            .await
            .map_err(|e| SessionError::Internal(format!("verify task: {e}")))?
    }

    /// Burn one verification's worth of work and report a mismatch.
    pub async fn verify_dummy(&self, plain: String) -> bool {
        let hash = self.dummy_hash.clone();
        let _ = self.verify(plain, hash).await;
        false
    }
}

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, plain: &str) -> Result<String, SessionError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(argon2(params)
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| SessionError::Internal(format!("argon2 hash: {e}")))?
        .to_string())
}

fn verify_with(params: &Params, plain: &str, hash: &str) -> Result<bool, SessionError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| SessionError::Internal(format!("bad password hash: {e}")))?;
    Ok(argon2(params)
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
