//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;
use warden_core::{BearerToken, Credential, GrantScope, ROOT_USER};

use crate::error::{Result, StoreError};
use crate::seed;
use crate::traits::{
    GrantRecord, PermissionRecord, PermissionSnapshot, RootFlags, Store, StoreOp, TeamRecord,
    UserRecord,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    /// When set, every commit fails without applying anything.
    fail_commits: AtomicBool,
    /// Number of successful commits.
    commits: AtomicUsize,
}

#[derive(Clone, Default)]
struct MemoryStoreInner {
    flags: RootFlags,
    root_password: Option<String>,
    /// Users by id.
    users: HashMap<Uuid, UserRecord>,
    teams: HashMap<Uuid, TeamRecord>,
    activation_tokens: HashMap<Uuid, String>,
    /// One credential per user id.
    credentials: HashMap<Uuid, Credential>,
    /// Tokens by value.
    tokens: HashMap<String, BearerToken>,
    /// Permission name -> category.
    permissions: BTreeMap<String, String>,
    categories: HashSet<String>,
    grants: HashSet<GrantRecord>,
}

impl MemoryStore {
    /// Create a store holding the same built-in rows as a fresh database.
    pub fn new() -> Self {
        let mut inner = MemoryStoreInner::default();
        inner.users.insert(
            seed::ROOT_USER_ID,
            UserRecord {
                id: seed::ROOT_USER_ID,
                name: ROOT_USER.to_string(),
                is_active: false,
                team_id: None,
            },
        );
        inner.categories = seed::CATEGORIES.iter().map(|c| c.to_string()).collect();
        inner.permissions = seed::PERMISSIONS
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        inner.grants.insert(GrantRecord {
            user_id: seed::ROOT_USER_ID,
            permission: seed::OMNIPOTENCE.to_string(),
            scope: GrantScope::Global,
        });

        Self {
            inner: RwLock::new(inner),
            fail_commits: AtomicBool::new(false),
            commits: AtomicUsize::new(0),
        }
    }

    /// Make every following commit fail (or succeed again).
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of commits applied so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryStoreInner) -> T) -> Result<T> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&inner))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn apply(&mut self, op: StoreOp) -> Result<()> {
        match op {
            StoreOp::SetRootCredentials(credential) | StoreOp::SetUserCredential(credential) => {
                if !self.users.contains_key(&credential.user_id) {
                    return Err(StoreError::NotFound(format!("user {}", credential.user_id)));
                }
                self.credentials.insert(credential.user_id, credential);
            }
            StoreOp::EnableRoot => {
                self.flags.enabled = true;
                if let Some(root) = self.users.get_mut(&seed::ROOT_USER_ID) {
                    root.is_active = true;
                }
            }
            StoreOp::SetRootRestricted(restricted) => self.flags.restricted = restricted,
            StoreOp::SetRootPassword(hash) => self.root_password = Some(hash),
            StoreOp::ActivateUser(user_id) => match self.users.get_mut(&user_id) {
                Some(user) => user.is_active = true,
                None => return Err(StoreError::NotFound(format!("user {user_id}"))),
            },
            StoreOp::SetActivationToken {
                user_id,
                token_hash,
            } => {
                if !self.users.contains_key(&user_id) {
                    return Err(StoreError::NotFound(format!("user {user_id}")));
                }
                self.activation_tokens.insert(user_id, token_hash);
            }
            StoreOp::InsertToken(token) => {
                if self.tokens.contains_key(&token.value) {
                    return Err(StoreError::Conflict("token".into()));
                }
                self.tokens.insert(token.value.clone(), token);
            }
            StoreOp::CreateUser(user) => {
                if self.users.contains_key(&user.id)
                    || self.users.values().any(|u| u.name == user.name)
                {
                    return Err(StoreError::Conflict(format!("user {}", user.name)));
                }
                self.users.insert(user.id, user);
            }
            StoreOp::CreateTeam(team) => {
                if self.teams.contains_key(&team.id)
                    || self.teams.values().any(|t| t.name == team.name)
                {
                    return Err(StoreError::Conflict(format!("team {}", team.name)));
                }
                self.teams.insert(team.id, team);
            }
            StoreOp::AddCategory(name) => {
                if !self.categories.insert(name.clone()) {
                    return Err(StoreError::Conflict(format!("category {name}")));
                }
            }
            StoreOp::RemoveCategory(name) => {
                if self.permissions.values().any(|c| *c == name) {
                    return Err(StoreError::Conflict(format!("category {name} in use")));
                }
                if !self.categories.remove(&name) {
                    return Err(StoreError::NotFound(format!("category {name}")));
                }
            }
            StoreOp::AddPermission(permission) => {
                if !self.categories.contains(&permission.category) {
                    return Err(StoreError::NotFound(format!(
                        "category {}",
                        permission.category
                    )));
                }
                if self.permissions.contains_key(&permission.name) {
                    return Err(StoreError::Conflict(format!("permission {}", permission.name)));
                }
                self.permissions.insert(permission.name, permission.category);
            }
            StoreOp::RemovePermission(name) => {
                self.grants.retain(|g| g.permission != name);
                if self.permissions.remove(&name).is_none() {
                    return Err(StoreError::NotFound(format!("permission {name}")));
                }
            }
            StoreOp::GrantRight(grant) => {
                if !self.users.contains_key(&grant.user_id) {
                    return Err(StoreError::NotFound(format!("user {}", grant.user_id)));
                }
                if !self.permissions.contains_key(&grant.permission) {
                    return Err(StoreError::NotFound(format!("permission {}", grant.permission)));
                }
                let label = format!("grant {} on {}", grant.permission, grant.scope);
                if !self.grants.insert(grant) {
                    return Err(StoreError::Conflict(label));
                }
            }
            StoreOp::RevokeRight(grant) => {
                if !self.grants.remove(&grant) {
                    return Err(StoreError::NotFound(format!(
                        "grant {} on {}",
                        grant.permission, grant.scope
                    )));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_root_flags(&self) -> Result<RootFlags> {
        self.read(|inner| inner.flags)
    }

    async fn load_root_password(&self) -> Result<Option<String>> {
        self.read(|inner| inner.root_password.clone())
    }

    async fn find_user(&self, name: &str) -> Result<Option<UserRecord>> {
        self.read(|inner| inner.users.values().find(|u| u.name == name).cloned())
    }

    async fn load_activation_token(&self, user_id: Uuid) -> Result<Option<String>> {
        self.read(|inner| inner.activation_tokens.get(&user_id).cloned())
    }

    async fn load_credentials(&self) -> Result<Vec<Credential>> {
        self.read(|inner| inner.credentials.values().cloned().collect())
    }

    async fn load_tokens(&self) -> Result<Vec<BearerToken>> {
        let now = Utc::now();
        self.read(|inner| {
            inner
                .tokens
                .values()
                .filter(|t| t.expires_at >= now)
                .cloned()
                .collect()
        })
    }

    async fn load_permissions(&self) -> Result<PermissionSnapshot> {
        self.read(|inner| {
            let mut categories: Vec<String> = inner.categories.iter().cloned().collect();
            categories.sort();
            PermissionSnapshot {
                users: inner.users.values().cloned().collect(),
                teams: inner.teams.values().cloned().collect(),
                categories,
                permissions: inner
                    .permissions
                    .iter()
                    .map(|(name, category)| PermissionRecord {
                        name: name.clone(),
                        category: category.clone(),
                    })
                    .collect(),
                grants: inner.grants.iter().cloned().collect(),
            }
        })
    }

    async fn commit(&self, ops: Vec<StoreOp>) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("commit failure injected".into()));
        }

        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        // Apply to a copy so a failing op leaves nothing behind.
        let mut staged = inner.clone();
        for op in ops {
            staged.apply(op)?;
        }
        *inner = staged;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
