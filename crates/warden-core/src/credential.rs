//! User credentials and the encrypted request payload that carries them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::password::verify_password;

/// Name of the bootstrap account.
pub const ROOT_USER: &str = "root";

/// Expiry used for credentials that never expire (9999-12-31T23:59:59Z).
pub fn perpetual() -> DateTime<Utc> {
    DateTime::from_timestamp(253_402_300_799, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A user's local credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: Uuid,
    pub user_name: String,
    pub valid_from: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// PHC-encoded password hash.
    pub password_hash: String,
    pub reset_active: bool,
    pub is_active: bool,
}

impl Credential {
    /// A fresh, active credential.
    pub fn new(
        user_id: Uuid,
        user_name: impl Into<String>,
        password_hash: String,
        valid_from: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            valid_from,
            expires_at,
            password_hash,
            reset_active: false,
            is_active: true,
        }
    }

    /// Active and inside its validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.valid_from <= now && now <= self.expires_at
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        verify_password(&self.password_hash, candidate)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("valid_from", &self.valid_from)
            .field("expires_at", &self.expires_at)
            .field("reset_active", &self.reset_active)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Decrypted body of `bootstrap_root`, `activate_user` and `issue_token`
/// requests.
///
/// `token` is the bootstrap token for root, the upstream password or
/// activation token for activation, and unused when issuing tokens.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for CredentialRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRequest")
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
