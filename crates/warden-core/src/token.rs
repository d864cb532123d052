//! Bearer tokens.
//!
//! A token value is a BLAKE3 keyed hash over
//! `seed ‖ user name ‖ client address ‖ expiry ‖ salt`, in that order.
//! Changing the order, the key or the seed invalidates every token issued
//! so far.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Default token lifetime, in seconds (12 hours).
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 43_200;

/// Random salt bytes per token.
const SALT_SIZE: usize = 32;

/// BLAKE3 derive-key context for the server token key.
const TOKEN_KEY_CONTEXT: &str = "warden 2024-01 bearer token key";

/// The server-side secret used to mint and check tokens.
#[derive(Clone)]
pub struct TokenKey([u8; 32]);

impl TokenKey {
    /// Derive the 32-byte keyed-hash key from a configured secret.
    pub fn derive(secret: &str) -> Self {
        Self(blake3::derive_key(TOKEN_KEY_CONTEXT, secret.as_bytes()))
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenKey(..)")
    }
}

/// An issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    /// Hex-encoded keyed hash.
    pub value: String,
    pub user_name: String,
    /// Hex-encoded random salt.
    pub salt: String,
    pub valid_from: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client_address: IpAddr,
}

impl BearerToken {
    /// Mint a new token for `user_name`, valid from now for `lifetime`.
    ///
    /// Timestamps are truncated to whole seconds so a token reloaded from
    /// storage hashes to the same value.
    pub fn generate(
        user_name: &str,
        client_address: IpAddr,
        lifetime: Duration,
        key: &TokenKey,
        seed: &str,
    ) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);

        let valid_from = Utc::now().trunc_subsecs(0);
        let expires_at = valid_from + lifetime;

        let value = compute_value(key, seed, user_name, client_address, expires_at, &salt);

        Self {
            value,
            user_name: user_name.to_string(),
            salt,
            valid_from,
            expires_at,
            client_address,
        }
    }

    /// Recompute the keyed hash and compare it with `value`.
    pub fn verify(&self, key: &TokenKey, seed: &str) -> bool {
        let expected = compute_value(
            key,
            seed,
            &self.user_name,
            self.client_address,
            self.expires_at,
            &self.salt,
        );
        expected.as_bytes().ct_eq(self.value.as_bytes()).into()
    }

    /// Whether `now` lies in `[valid_from, expires_at]`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.expires_at
    }
}

fn compute_value(
    key: &TokenKey,
    seed: &str,
    user_name: &str,
    client_address: IpAddr,
    expires_at: DateTime<Utc>,
    salt: &str,
) -> String {
    let mut hasher = blake3::Hasher::new_keyed(&key.0);
    hasher.update(seed.as_bytes());
    hasher.update(user_name.as_bytes());
    hasher.update(client_address.to_string().as_bytes());
    hasher.update(expires_at.timestamp().to_string().as_bytes());
    hasher.update(salt.as_bytes());
    hasher.finalize().to_hex().to_string()
}
