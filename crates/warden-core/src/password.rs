//! Password hashing.
//!
//! Passwords and bootstrap/activation tokens are stored as Argon2id hashes
//! in PHC string form (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), a
//! self-describing modular crypt format.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;

use crate::error::{CoreError, Result};

const SALT_SIZE: usize = 16;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| CoreError::PasswordHash(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::PasswordHash(e.to_string()))
}

/// Check `candidate` against a stored PHC string.
///
/// A malformed stored hash never verifies.
pub fn verify_password(encoded: &str, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(encoded) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}
