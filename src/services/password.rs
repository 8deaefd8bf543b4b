//! Password hashing lifecycle.
//!
//! Plaintext is turned into an Argon2id PHC string
//! (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<digest>`), which carries the
//! algorithm, version, work factor and salt needed to verify it later. Both
//! hashing and verification are CPU-bound and are run on the blocking pool
//! by the async helpers so they never stall request-serving tasks.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;
use tokio::task;

use crate::config::SecurityConfig;
use crate::models::account::{Password, ValidatedPatch};

/// Plaintext used to produce the decoy digest for unknown identifiers.
const DECOY_PLAINTEXT: &str = "propcast-decoy-credential";

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid Argon2 params: {0}")]
    InvalidParams(String),

    #[error("Failed to hash password")]
    Hashing,

    #[error("Password hashing task failed: {0}")]
    Task(String),
}

impl From<task::JoinError> for HashError {
    fn from(err: task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Outcome of checking a plaintext against a stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    Mismatch,
    /// The stored value is not a parseable PHC string.
    Malformed,
}

impl Verification {
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// True only when the patch carries a new plaintext, whatever its value.
#[must_use]
pub const fn needs_rehash(patch: &ValidatedPatch) -> bool {
    patch.password.is_some()
}

/// Checks `plaintext` against `stored_hash` using the parameters embedded in
/// the stored value. Never fails: malformed input is reported as such.
#[must_use]
pub fn check_password(plaintext: &str, stored_hash: &str) -> Verification {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return Verification::Malformed;
    };

    if plaintext.is_empty() {
        return Verification::Mismatch;
    }

    // Digest comparison inside `verify_password` is constant-time.
    if Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
    {
        Verification::Match
    } else {
        Verification::Mismatch
    }
}

/// Boolean form of [`check_password`].
#[must_use]
pub fn verify(plaintext: &str, stored_hash: &str) -> bool {
    check_password(plaintext, stored_hash).is_match()
}

#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
    decoy_hash: String,
}

impl CredentialHasher {
    /// Builds a hasher with the configured work factor.
    ///
    /// Also computes the decoy digest used to equalize timing for unknown
    /// identifiers, so construction costs one hash.
    pub fn new(config: &SecurityConfig) -> Result<Self, HashError> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None, // output length (use default)
        )
        .map_err(|e| HashError::InvalidParams(e.to_string()))?;

        let decoy_hash = hash_with(&params, DECOY_PLAINTEXT)?;

        Ok(Self { params, decoy_hash })
    }

    /// Hashes on the current thread. Prefer [`Self::hash_off_thread`] from async code.
    pub fn hash_password(&self, plaintext: &Password) -> Result<String, HashError> {
        hash_with(&self.params, plaintext.expose())
    }

    pub async fn hash_off_thread(&self, plaintext: Password) -> Result<String, HashError> {
        let hasher = self.clone();
        task::spawn_blocking(move || hasher.hash_password(&plaintext)).await?
    }

    /// Checks on the blocking pool. A malformed stored hash is still answered
    /// after a full Argon2 run against the decoy digest, so it costs the same
    /// as a wrong password.
    pub async fn check_off_thread(
        &self,
        plaintext: String,
        stored_hash: String,
    ) -> Result<Verification, HashError> {
        let decoy_hash = self.decoy_hash.clone();
        let verification = task::spawn_blocking(move || {
            let verification = check_password(&plaintext, &stored_hash);
            if verification == Verification::Malformed {
                let _ = check_password(&plaintext, &decoy_hash);
            }
            verification
        })
        .await?;
        Ok(verification)
    }

    /// Runs a verification that can never succeed, so an unknown identifier
    /// costs about as much as a wrong password.
    pub async fn check_decoy(&self, plaintext: String) -> Result<(), HashError> {
        let decoy_hash = self.decoy_hash.clone();
        task::spawn_blocking(move || {
            let _ = check_password(&plaintext, &decoy_hash);
        })
        .await?;
        Ok(())
    }
}

fn hash_with(params: &Params, plaintext: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());

    let hash = argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|_| HashError::Hashing)?;

    Ok(hash.to_string())
}
