//! Argon2 work on the blocking pool.
//!
//! Hashing and verifying a password take tens of milliseconds of CPU and
//! several MiB of memory; run inline they would stall every other request
//! sharing the worker thread.

use tokio::task::spawn_blocking;

use crate::error::Result;

/// Hash `password` off the async runtime.
pub(crate) async fn hash(password: &str) -> Result<String> {
    let password = password.to_owned();
    Ok(spawn_blocking(move || warden_core::hash_password(&password)).await??)
}

/// Check `candidate` against a stored PHC string off the async runtime.
pub(crate) async fn verify(encoded: &str, candidate: &str) -> Result<bool> {
    let encoded = encoded.to_owned();
    let candidate = candidate.to_owned();
    Ok(spawn_blocking(move || warden_core::verify_password(&encoded, &candidate)).await?)
}
