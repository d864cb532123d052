//! Upstream directories consulted by `activate_user` in `ldap` mode.

use std::collections::HashMap;

use async_trait::async_trait;
use subtle::ConstantTimeEq;

/// Verifies a user's upstream password.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Whether `password` is the upstream password of `user`.
    async fn verify(&self, user: &str, password: &str) -> bool;
}

/// No directory configured: nobody verifies.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDirectory;

#[async_trait]
impl Directory for NoDirectory {
    async fn verify(&self, _user: &str, _password: &str) -> bool {
        false
    }
}

/// A fixed table of users and passwords.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    entries: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.entries.insert(user.into(), password.into());
        self
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn verify(&self, user: &str, password: &str) -> bool {
        self.entries
            .get(user)
            .is_some_and(|known| bool::from(known.as_bytes().ct_eq(password.as_bytes())))
    }
}
