//! Supervisor configuration.
//!
//! Loaded from a TOML file, then overridden by `WARDEN_*` environment
//! variables (`WARDEN_TOKEN_LIFETIME_SECS=3600`, `WARDEN_READONLY=true`, ...).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warden_core::{DEFAULT_KEX_EXPIRY_SECS, DEFAULT_TOKEN_LIFETIME_SECS};

use crate::error::{Result, SupervisorError};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "WARDEN_";

/// Upper bound on configured lifetimes (ten years).
const MAX_LIFETIME_SECS: u64 = 315_360_000;

/// How `activate_user` verifies the user upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMethod {
    /// Check the upstream password against a directory.
    #[default]
    Ldap,
    /// Check a one-time activation token issued out of band.
    Token,
}

impl std::str::FromStr for ActivationMethod {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ldap" => Ok(ActivationMethod::Ldap),
            "token" => Ok(ActivationMethod::Token),
            other => Err(SupervisorError::Config(format!(
                "unknown activation method: {other}"
            ))),
        }
    }
}

/// Configuration for the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    /// Bearer token lifetime in seconds.
    pub token_lifetime_secs: u64,
    /// Key exchange lifetime in seconds.
    pub kex_expiry_secs: u64,
    /// Reject every mutating action (standby instances).
    pub readonly: bool,
    /// Authorize every request as admin.
    pub open_instance: bool,
    /// Only issue root tokens to loopback clients.
    pub root_restricted: bool,
    pub activation: ActivationMethod,
    /// Secret the bearer token key is derived from.
    pub token_key: String,
    /// Seed mixed into every bearer token.
    pub token_seed: String,
    /// Floor on the response time of credential flows and token checks.
    pub minimum_latency_ms: u64,
    /// Interval of the expired key exchange sweep. Must be non-zero.
    pub kex_sweep_secs: u64,
    /// Capacity of the request queue.
    pub queue_capacity: usize,
    pub database_path: PathBuf,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            token_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            kex_expiry_secs: DEFAULT_KEX_EXPIRY_SECS,
            readonly: false,
            open_instance: false,
            root_restricted: false,
            activation: ActivationMethod::default(),
            token_key: String::new(),
            token_seed: String::new(),
            minimum_latency_ms: 1000,
            kex_sweep_secs: 30,
            queue_capacity: 256,
            database_path: PathBuf::from("warden.db"),
        }
    }
}

impl WardenConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SupervisorError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply overrides from the process environment.
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_env_vars(std::env::vars())
    }

    /// Apply `WARDEN_*` overrides from `vars`; other variables are ignored.
    pub fn merge_env_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            if let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) {
                self.set_from_string(&name.to_ascii_lowercase(), value.as_ref())?;
            }
        }
        Ok(())
    }

    /// Set one field by name.
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "token_lifetime_secs" => self.token_lifetime_secs = parse(key, value)?,
            "kex_expiry_secs" => self.kex_expiry_secs = parse(key, value)?,
            "readonly" => self.readonly = parse(key, value)?,
            "open_instance" => self.open_instance = parse(key, value)?,
            "root_restricted" => self.root_restricted = parse(key, value)?,
            "activation" => self.activation = value.parse()?,
            "token_key" => self.token_key = value.to_string(),
            "token_seed" => self.token_seed = value.to_string(),
            "minimum_latency_ms" => self.minimum_latency_ms = parse(key, value)?,
            "kex_sweep_secs" => self.kex_sweep_secs = parse(key, value)?,
            "queue_capacity" => self.queue_capacity = parse(key, value)?,
            "database_path" => self.database_path = PathBuf::from(value),
            other => {
                return Err(SupervisorError::Config(format!(
                    "unknown configuration key: {other}"
                )))
            }
        }
        Ok(())
    }

    /// Reject configurations the supervisor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.token_key.is_empty() || self.token_seed.is_empty() {
            return Err(SupervisorError::Config(
                "token_key and token_seed must be set".into(),
            ));
        }
        if !(1..=MAX_LIFETIME_SECS).contains(&self.token_lifetime_secs) {
            return Err(SupervisorError::Config(format!(
                "token_lifetime_secs must be within 1..={MAX_LIFETIME_SECS}"
            )));
        }
        if !(1..=MAX_LIFETIME_SECS).contains(&self.kex_expiry_secs) {
            return Err(SupervisorError::Config(format!(
                "kex_expiry_secs must be within 1..={MAX_LIFETIME_SECS}"
            )));
        }
        if !(1..=MAX_LIFETIME_SECS).contains(&self.kex_sweep_secs) {
            return Err(SupervisorError::Config(format!(
                "kex_sweep_secs must be within 1..={MAX_LIFETIME_SECS}"
            )));
        }
        if self.queue_capacity == 0 {
            return Err(SupervisorError::Config("queue_capacity must be > 0".into()));
        }
        Ok(())
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(clamp_secs(self.token_lifetime_secs))
    }

    pub fn kex_expiry(&self) -> chrono::Duration {
        chrono::Duration::seconds(clamp_secs(self.kex_expiry_secs))
    }

    pub fn minimum_latency(&self) -> Duration {
        Duration::from_millis(self.minimum_latency_ms)
    }

    pub fn kex_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.kex_sweep_secs)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SupervisorError::Config(format!("invalid value for {key}: {value}")))
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000)
}
