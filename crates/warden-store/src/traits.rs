//! Store trait: the abstract interface to durable state.
//!
//! The supervisor only reads through this trait at startup and on a few
//! lookups; every mutation goes through [`Store::commit`] as an ordered batch
//! of [`StoreOp`]s applied in one transaction.

use async_trait::async_trait;
use uuid::Uuid;
use warden_core::{BearerToken, Credential, GrantScope};

use crate::error::Result;

/// Root account flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootFlags {
    /// Root has been bootstrapped.
    pub enabled: bool,
    /// Root tokens may only be issued to loopback clients.
    pub restricted: bool,
}

/// A user account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub team_id: Option<Uuid>,
}

/// A team row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRecord {
    pub id: Uuid,
    pub name: String,
}

/// A permission and the category it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub name: String,
    pub category: String,
}

/// A permission granted to a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantRecord {
    pub user_id: Uuid,
    pub permission: String,
    pub scope: GrantScope,
}

/// Everything the authorization engine needs, loaded in one pass.
#[derive(Debug, Clone, Default)]
pub struct PermissionSnapshot {
    pub users: Vec<UserRecord>,
    pub teams: Vec<TeamRecord>,
    pub categories: Vec<String>,
    pub permissions: Vec<PermissionRecord>,
    pub grants: Vec<GrantRecord>,
}

/// One statement of a commit batch.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Store the root credential, superseding any previous one.
    SetRootCredentials(Credential),
    /// Mark root as bootstrapped.
    EnableRoot,
    /// Restrict root tokens to loopback clients.
    SetRootRestricted(bool),
    /// Store the PHC hash of the root bootstrap token.
    SetRootPassword(String),
    /// Store a user credential, superseding any previous one.
    SetUserCredential(Credential),
    /// Mark a user active.
    ActivateUser(Uuid),
    /// Store the PHC hash of a user's activation token.
    SetActivationToken { user_id: Uuid, token_hash: String },
    /// Record an issued bearer token.
    InsertToken(BearerToken),
    /// Provision a user account.
    CreateUser(UserRecord),
    /// Provision a team.
    CreateTeam(TeamRecord),
    AddCategory(String),
    RemoveCategory(String),
    AddPermission(PermissionRecord),
    /// Remove a permission and every grant of it.
    RemovePermission(String),
    GrantRight(GrantRecord),
    RevokeRight(GrantRecord),
}

impl StoreOp {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::SetRootCredentials(_) => "set_root_credentials",
            StoreOp::EnableRoot => "enable_root",
            StoreOp::SetRootRestricted(_) => "set_root_restricted",
            StoreOp::SetRootPassword(_) => "set_root_password",
            StoreOp::SetUserCredential(_) => "set_user_credential",
            StoreOp::ActivateUser(_) => "activate_user",
            StoreOp::SetActivationToken { .. } => "set_activation_token",
            StoreOp::InsertToken(_) => "insert_token",
            StoreOp::CreateUser(_) => "create_user",
            StoreOp::CreateTeam(_) => "create_team",
            StoreOp::AddCategory(_) => "add_category",
            StoreOp::RemoveCategory(_) => "remove_category",
            StoreOp::AddPermission(_) => "add_permission",
            StoreOp::RemovePermission(_) => "remove_permission",
            StoreOp::GrantRight(_) => "grant_right",
            StoreOp::RevokeRight(_) => "revoke_right",
        }
    }
}

/// The Store trait: async interface to durable state.
///
/// For SQLite, implementations use `spawn_blocking` internally to avoid
/// blocking the runtime.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Root
    // ─────────────────────────────────────────────────────────────────────────

    async fn load_root_flags(&self) -> Result<RootFlags>;

    /// PHC hash of the root bootstrap token, if one was generated.
    async fn load_root_password(&self) -> Result<Option<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn find_user(&self, name: &str) -> Result<Option<UserRecord>>;

    /// PHC hash of a user's activation token, if one was issued.
    async fn load_activation_token(&self, user_id: Uuid) -> Result<Option<String>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Warm-up
    // ─────────────────────────────────────────────────────────────────────────

    async fn load_credentials(&self) -> Result<Vec<Credential>>;

    async fn load_tokens(&self) -> Result<Vec<BearerToken>>;

    async fn load_permissions(&self) -> Result<PermissionSnapshot>;

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply every op in order inside one transaction: all or nothing.
    async fn commit(&self, ops: Vec<StoreOp>) -> Result<()>;
}
