//! The supervisor actor.
//!
//! A single owner of the in-memory stores. Requests arrive on a bounded
//! queue; each one is handled in its own task and answered on its one-shot
//! channel. The flows themselves live in [`crate::flows`].

use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};
use warden_core::{KexMessage, TokenKey};
use warden_perms::{AuthRequest, AuthorizationEngine, PermissionTables, Verdict};
use warden_store::Store;

use crate::config::WardenConfig;
use crate::directory::{Directory, NoDirectory};
use crate::error::{Result, ResultCode, SupervisorError};
use crate::request::{Action, Reply, ReplyBody, Request, SealedRequest};
use crate::stores::{CredentialStore, KexStore, TokenStore};

/// State shared by every request task.
pub(crate) struct Shared {
    pub(crate) config: WardenConfig,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) token_key: TokenKey,
    pub(crate) kex: KexStore,
    pub(crate) tokens: TokenStore,
    pub(crate) credentials: CredentialStore,
    pub(crate) tables: RwLock<PermissionTables>,
    pub(crate) engine: AuthorizationEngine,
    pub(crate) directory: Arc<dyn Directory>,
    /// Serializes flows that read durable state, then commit based on it
    /// (bootstrap, activation, table changes).
    pub(crate) mutation_gate: Mutex<()>,
    pub(crate) root_restricted: bool,
}

impl Shared {
    /// Load credentials, tokens and permission tables from the store.
    ///
    /// Tokens whose hash no longer verifies under the configured key and
    /// seed are dropped.
    async fn warm(&self) -> Result<()> {
        let credentials = self.store.load_credentials().await?;
        let credential_count = credentials.len();
        self.credentials
            .extend(credentials.into_iter().map(|c| (c.user_name.clone(), c)))
            .await;

        let tokens = self.store.load_tokens().await?;
        let loaded = tokens.len();
        let verified: Vec<_> = tokens
            .into_iter()
            .filter(|t| t.verify(&self.token_key, &self.config.token_seed))
            .map(|t| (t.value.clone(), t))
            .collect();
        let token_count = verified.len();
        if token_count < loaded {
            warn!(
                dropped = loaded - token_count,
                "dropped stored tokens that do not verify under the current key"
            );
        }
        self.tokens.extend(verified).await;

        let snapshot = self.store.load_permissions().await?;
        let mut tables = self.tables.write().await;
        for team in snapshot.teams {
            tables.upsert_team(team.name, team.id);
        }
        for user in snapshot.users {
            tables.upsert_user(user.name, user.id, user.team_id);
        }
        for category in &snapshot.categories {
            tables.insert_category(category);
        }
        for permission in &snapshot.permissions {
            tables.insert_permission(&permission.name, &permission.category);
        }
        for grant in &snapshot.grants {
            tables.insert_grant(grant.user_id, &grant.permission, grant.scope);
        }

        info!(
            credentials = credential_count,
            tokens = token_count,
            permissions = snapshot.permissions.len(),
            grants = snapshot.grants.len(),
            "supervisor state loaded"
        );
        Ok(())
    }
}

/// Builds and starts a supervisor.
pub struct Supervisor {
    config: WardenConfig,
    store: Arc<dyn Store>,
    directory: Arc<dyn Directory>,
}

impl Supervisor {
    pub fn new(config: WardenConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            directory: Arc::new(NoDirectory),
        }
    }

    /// Directory consulted by `activate_user` in `ldap` mode.
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.directory = directory;
        self
    }

    /// Validate the configuration, load state, and spawn the dispatch loop
    /// and the key exchange sweep.
    pub async fn start(self) -> Result<SupervisorHandle> {
        self.config.validate()?;

        let flags = self.store.load_root_flags().await?;
        let shared = Arc::new(Shared {
            token_key: TokenKey::derive(&self.config.token_key),
            engine: AuthorizationEngine::new(self.config.open_instance),
            root_restricted: self.config.root_restricted || flags.restricted,
            kex: KexStore::new(),
            tokens: TokenStore::new(),
            credentials: CredentialStore::new(),
            tables: RwLock::new(PermissionTables::new()),
            mutation_gate: Mutex::new(()),
            directory: self.directory,
            store: self.store,
            config: self.config,
        });
        shared.warm().await?;

        let (sender, receiver) = mpsc::channel(shared.config.queue_capacity);
        tokio::spawn(sweep(
            Arc::downgrade(&shared),
            shared.config.kex_sweep_interval(),
        ));

        info!(
            readonly = shared.config.readonly,
            open_instance = shared.config.open_instance,
            root_enabled = flags.enabled,
            root_restricted = shared.root_restricted,
            "supervisor started"
        );
        tokio::spawn(run(shared, receiver));

        Ok(SupervisorHandle { sender })
    }
}

async fn run(shared: Arc<Shared>, mut requests: mpsc::Receiver<Request>) {
    while let Some(Request { action, reply }) = requests.recv().await {
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let outcome = shared.handle(action).await;
            if reply.send(outcome).is_err() {
                debug!("caller dropped the reply channel");
            }
        });
    }
    debug!("request queue closed, supervisor stopping");
}

async fn sweep(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let dropped = shared.kex.sweep_expired().await;
        if dropped > 0 {
            debug!(dropped, "swept expired key exchanges");
        }
    }
}

/// Sends requests to a running supervisor.
///
/// The supervisor stops once every handle is dropped and the in-flight
/// requests have completed.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<Request>,
}

impl SupervisorHandle {
    /// Submit an action and wait for its reply.
    pub async fn request(&self, action: Action) -> Result<Reply> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Request { action, reply })
            .await
            .map_err(|_| SupervisorError::Stopped)?;
        receiver.await.map_err(|_| SupervisorError::Stopped)
    }

    /// Open a key exchange for `client_address`.
    pub async fn kex_init(
        &self,
        message: KexMessage,
        client_address: IpAddr,
    ) -> std::result::Result<KexMessage, ResultCode> {
        match self.call(Action::KexInit { message, client_address }).await? {
            ReplyBody::Kex(kex) => Ok(kex),
            _ => Err(ResultCode::ServerError),
        }
    }

    /// Bootstrap root; returns the sealed bearer token.
    pub async fn bootstrap_root(
        &self,
        request: SealedRequest,
    ) -> std::result::Result<String, ResultCode> {
        sealed(self.call(Action::BootstrapRoot(request)).await?)
    }

    /// Activate `user`; returns the sealed bearer token.
    pub async fn activate_user(
        &self,
        user: impl Into<String>,
        request: SealedRequest,
    ) -> std::result::Result<String, ResultCode> {
        let action = Action::ActivateUser {
            user: user.into(),
            request,
        };
        sealed(self.call(action).await?)
    }

    /// Issue a bearer token; returns it sealed.
    pub async fn issue_token(
        &self,
        request: SealedRequest,
    ) -> std::result::Result<String, ResultCode> {
        sealed(self.call(Action::IssueToken(request)).await?)
    }

    /// Evaluate an authorization request. Anything but a verdict is a denial.
    pub async fn authorize(&self, request: AuthRequest) -> Verdict {
        match self.request(Action::Authorize(request)).await {
            Ok(Reply {
                body: ReplyBody::Verdict(verdict),
                ..
            }) => verdict,
            _ => Verdict::DENIED,
        }
    }

    pub async fn validate_token(
        &self,
        user: impl Into<String>,
        token: impl Into<String>,
        client_address: IpAddr,
    ) -> std::result::Result<(), ResultCode> {
        let action = Action::ValidateToken {
            user: user.into(),
            token: token.into(),
            client_address,
        };
        self.call(action).await.map(|_| ())
    }

    async fn call(&self, action: Action) -> std::result::Result<ReplyBody, ResultCode> {
        let reply = self.request(action).await.map_err(|e| e.code())?;
        if reply.code.is_success() {
            Ok(reply.body)
        } else {
            Err(reply.code)
        }
    }
}

fn sealed(body: ReplyBody) -> std::result::Result<String, ResultCode> {
    match body {
        ReplyBody::Sealed(sealed) => Ok(sealed),
        _ => Err(ResultCode::ServerError),
    }
}
