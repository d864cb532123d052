//! Test fixtures and helpers.
//!
//! A [`TestServer`] runs a supervisor over a [`MemoryStore`]; a
//! [`TestClient`] speaks the client side of the key exchange.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;
use warden::{
    Directory, NoDirectory, ResultCode, SealedRequest, Supervisor, SupervisorError,
    SupervisorHandle, WardenConfig,
};
use warden_core::{
    hash_password, BearerToken, CoreError, CredentialRequest, GrantScope, KeyExchange, ROOT_USER,
};
use warden_store::{GrantRecord, MemoryStore, Store, StoreError, StoreOp, UserRecord};

/// Secret the test token key is derived from.
pub const TOKEN_KEY: &str = "testkit token key";

/// Seed mixed into test tokens.
pub const TOKEN_SEED: &str = "testkit token seed";

/// The root bootstrap token every [`TestServer`] store is seeded with.
pub const ROOT_BOOTSTRAP_TOKEN: &str = "testkit-bootstrap-token";

/// Root's password after [`TestServer::bootstrapped`].
pub const ROOT_PASSWORD: &str = "root-password";

/// A config that starts: token secrets set, no latency floor.
pub fn test_config() -> WardenConfig {
    WardenConfig {
        token_key: TOKEN_KEY.into(),
        token_seed: TOKEN_SEED.into(),
        minimum_latency_ms: 0,
        ..WardenConfig::default()
    }
}

pub fn loopback() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// A memory store holding the root bootstrap token hash.
pub async fn seeded_store() -> Result<Arc<MemoryStore>, StoreError> {
    let store = Arc::new(MemoryStore::new());
    let hash = hash_password(ROOT_BOOTSTRAP_TOKEN)
        .map_err(|e| StoreError::InvalidData(e.to_string()))?;
    store.commit(vec![StoreOp::SetRootPassword(hash)]).await?;
    Ok(store)
}

/// Provision an inactive user, optionally with global grants.
pub async fn provision_user(
    store: &MemoryStore,
    name: &str,
    grants: &[&str],
) -> Result<Uuid, StoreError> {
    let id = Uuid::new_v4();
    let mut ops = vec![StoreOp::CreateUser(UserRecord {
        id,
        name: name.to_string(),
        is_active: false,
        team_id: None,
    })];
    ops.extend(grants.iter().map(|permission| {
        StoreOp::GrantRight(GrantRecord {
            user_id: id,
            permission: permission.to_string(),
            scope: GrantScope::Global,
        })
    }));
    store.commit(ops).await?;
    Ok(id)
}

/// A running supervisor over a memory store.
pub struct TestServer {
    pub store: Arc<MemoryStore>,
    pub handle: SupervisorHandle,
}

impl TestServer {
    /// Start over a freshly seeded store.
    pub async fn start(config: WardenConfig) -> Result<Self, SupervisorError> {
        let store = seeded_store().await?;
        Self::start_with(config, store, Arc::new(NoDirectory)).await
    }

    /// Start over an existing store with a directory.
    pub async fn start_with(
        config: WardenConfig,
        store: Arc<MemoryStore>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self, SupervisorError> {
        let handle = Supervisor::new(config, store.clone())
            .with_directory(directory)
            .start()
            .await?;
        Ok(Self { store, handle })
    }

    /// Start and bootstrap root from loopback; returns root's first token.
    pub async fn bootstrapped(config: WardenConfig) -> Result<(Self, BearerToken), ClientError> {
        let server = Self::start(config).await?;
        let token = TestClient::loopback()
            .bootstrap_root(&server.handle, ROOT_PASSWORD, ROOT_BOOTSTRAP_TOKEN)
            .await?;
        Ok((server, token))
    }
}

/// Errors seen by the test client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The supervisor answered with a failure code.
    #[error("rejected with {0}")]
    Rejected(ResultCode),

    #[error("crypto error: {0}")]
    Crypto(#[from] CoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
}

impl From<ResultCode> for ClientError {
    fn from(code: ResultCode) -> Self {
        ClientError::Rejected(code)
    }
}

impl ClientError {
    /// The result code, if the supervisor rejected the request.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            ClientError::Rejected(code) => Some(*code),
            _ => None,
        }
    }
}

/// The client side of the key exchange.
#[derive(Debug, Clone, Copy)]
pub struct TestClient {
    pub address: IpAddr,
}

impl TestClient {
    pub fn new(address: IpAddr) -> Self {
        Self { address }
    }

    pub fn loopback() -> Self {
        Self::new(loopback())
    }

    /// Open an exchange with the supervisor and seal `request` under it.
    ///
    /// Returns the client half of the exchange, needed to open the reply.
    pub async fn seal(
        &self,
        handle: &SupervisorHandle,
        request: &CredentialRequest,
    ) -> Result<(KeyExchange, SealedRequest), ClientError> {
        let mut kex = KeyExchange::create(Duration::seconds(60))?;
        let reply = handle.kex_init(kex.to_message(), self.address).await?;

        kex.set_peer_key(reply.public_key_bytes()?);
        kex.set_request_id(reply.request_id);
        kex.set_initialization_vector(reply.initialization_vector_bytes()?);

        let payload = kex.encrypt_and_encode(&serde_json::to_vec(request)?)?;
        let sealed = SealedRequest {
            request_id: reply.request_id,
            payload,
            client_address: self.address,
        };
        Ok((kex, sealed))
    }

    /// Decrypt a sealed bearer token.
    pub fn open(kex: &mut KeyExchange, sealed: &str) -> Result<BearerToken, ClientError> {
        let plaintext = kex.decode_and_decrypt(sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub async fn bootstrap_root(
        &self,
        handle: &SupervisorHandle,
        password: &str,
        bootstrap_token: &str,
    ) -> Result<BearerToken, ClientError> {
        let request = credential_request(ROOT_USER, password, bootstrap_token, None);
        let (mut kex, sealed) = self.seal(handle, &request).await?;
        let reply = handle.bootstrap_root(sealed).await?;
        Self::open(&mut kex, &reply)
    }

    /// Activate `user`. `upstream` is the directory password or the
    /// activation token, depending on the activation method.
    pub async fn activate_user(
        &self,
        handle: &SupervisorHandle,
        user: &str,
        password: &str,
        upstream: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<BearerToken, ClientError> {
        let request = credential_request(user, password, upstream, expires_at);
        let (mut kex, sealed) = self.seal(handle, &request).await?;
        let reply = handle.activate_user(user, sealed).await?;
        Self::open(&mut kex, &reply)
    }

    pub async fn issue_token(
        &self,
        handle: &SupervisorHandle,
        user: &str,
        password: &str,
    ) -> Result<BearerToken, ClientError> {
        let request = credential_request(user, password, "", None);
        let (mut kex, sealed) = self.seal(handle, &request).await?;
        let reply = handle.issue_token(sealed).await?;
        Self::open(&mut kex, &reply)
    }
}

pub fn credential_request(
    user: &str,
    password: &str,
    token: &str,
    expires_at: Option<DateTime<Utc>>,
) -> CredentialRequest {
    CredentialRequest {
        username: user.to_string(),
        password: password.to_string(),
        token: token.to_string(),
        expires_at,
    }
}
