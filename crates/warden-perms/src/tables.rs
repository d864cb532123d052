//! Permission tables.
//!
//! In-memory indexes over users, teams, categories, permissions and grants.
//! The tables validate every change before applying it, so a caller can
//! check a mutation, persist it, and then apply it knowing it will succeed.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use uuid::Uuid;
use warden_core::{is_system_tier, GrantScope};

use crate::error::{PermsError, Result};

/// A user as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub id: Uuid,
    pub team_id: Option<Uuid>,
}

/// Aggregated permission state.
#[derive(Debug, Default, Clone)]
pub struct PermissionTables {
    /// Index: user name -> user.
    users: HashMap<String, UserEntry>,

    /// Index: team name -> team id.
    teams: HashMap<String, Uuid>,

    categories: BTreeSet<String>,

    /// Permission name -> category.
    permissions: BTreeMap<String, String>,

    /// Index: user id -> (permission, scope) pairs held.
    grants: HashMap<Uuid, HashSet<(String, GrantScope)>>,
}

impl PermissionTables {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users and teams
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a user.
    pub fn upsert_user(&mut self, name: impl Into<String>, id: Uuid, team_id: Option<Uuid>) {
        self.users.insert(name.into(), UserEntry { id, team_id });
    }

    pub fn upsert_team(&mut self, name: impl Into<String>, id: Uuid) {
        self.teams.insert(name.into(), id);
    }

    pub fn user(&self, name: &str) -> Option<&UserEntry> {
        self.users.get(name)
    }

    pub fn team_id(&self, name: &str) -> Option<Uuid> {
        self.teams.get(name).copied()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Categories
    // ─────────────────────────────────────────────────────────────────────────

    pub fn categories(&self) -> Vec<String> {
        self.categories.iter().cloned().collect()
    }

    pub fn check_add_category(&self, name: &str) -> Result<()> {
        if self.categories.contains(name) {
            return Err(PermsError::DuplicateCategory(name.to_string()));
        }
        Ok(())
    }

    pub fn add_category(&mut self, name: &str) -> Result<()> {
        self.check_add_category(name)?;
        self.categories.insert(name.to_string());
        Ok(())
    }

    pub fn check_remove_category(&self, name: &str) -> Result<()> {
        if !self.categories.contains(name) {
            return Err(PermsError::UnknownCategory(name.to_string()));
        }
        if self.permissions.values().any(|c| c == name) {
            return Err(PermsError::CategoryInUse(name.to_string()));
        }
        Ok(())
    }

    pub fn remove_category(&mut self, name: &str) -> Result<()> {
        self.check_remove_category(name)?;
        self.categories.remove(name);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    /// All permissions as `(name, category)`, sorted by name.
    pub fn permissions(&self) -> Vec<(String, String)> {
        self.permissions
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect()
    }

    /// Category of a permission.
    pub fn permission_category(&self, name: &str) -> Option<&str> {
        self.permissions.get(name).map(String::as_str)
    }

    pub fn check_add_permission(&self, name: &str, category: &str) -> Result<()> {
        if !self.categories.contains(category) {
            return Err(PermsError::UnknownCategory(category.to_string()));
        }
        if self.permissions.contains_key(name) {
            return Err(PermsError::DuplicatePermission(name.to_string()));
        }
        Ok(())
    }

    pub fn add_permission(&mut self, name: &str, category: &str) -> Result<()> {
        self.check_add_permission(name, category)?;
        self.permissions
            .insert(name.to_string(), category.to_string());
        Ok(())
    }

    pub fn check_remove_permission(&self, name: &str) -> Result<()> {
        if !self.permissions.contains_key(name) {
            return Err(PermsError::UnknownPermission(name.to_string()));
        }
        Ok(())
    }

    /// Remove a permission and every grant of it.
    pub fn remove_permission(&mut self, name: &str) -> Result<()> {
        self.check_remove_permission(name)?;
        self.permissions.remove(name);
        for held in self.grants.values_mut() {
            held.retain(|(permission, _)| permission != name);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether `user_id` holds `permission` exactly at `scope`.
    pub fn holds(&self, user_id: Uuid, permission: &str, scope: GrantScope) -> bool {
        self.grants
            .get(&user_id)
            .is_some_and(|held| held.contains(&(permission.to_string(), scope)))
    }

    /// Grants held by `user_id`, sorted.
    pub fn rights_of(&self, user_id: Uuid) -> Vec<(String, GrantScope)> {
        let mut rights: Vec<_> = self
            .grants
            .get(&user_id)
            .map(|held| held.iter().cloned().collect())
            .unwrap_or_default();
        rights.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.to_string().cmp(&b.1.to_string())));
        rights
    }

    pub fn check_grant(&self, user_id: Uuid, permission: &str, scope: GrantScope) -> Result<()> {
        if !self.permissions.contains_key(permission) {
            return Err(PermsError::UnknownPermission(permission.to_string()));
        }
        if is_system_tier(permission) && !scope.is_global() {
            return Err(PermsError::ScopedSystemGrant(permission.to_string()));
        }
        if self.holds(user_id, permission, scope) {
            return Err(PermsError::DuplicateGrant(format!("{permission} on {scope}")));
        }
        Ok(())
    }

    pub fn grant(&mut self, user_id: Uuid, permission: &str, scope: GrantScope) -> Result<()> {
        self.check_grant(user_id, permission, scope)?;
        self.insert_grant(user_id, permission, scope);
        Ok(())
    }

    /// Insert a grant without validation, used when loading persisted grants.
    pub fn insert_grant(&mut self, user_id: Uuid, permission: &str, scope: GrantScope) {
        self.grants
            .entry(user_id)
            .or_default()
            .insert((permission.to_string(), scope));
    }

    pub fn check_revoke(&self, user_id: Uuid, permission: &str, scope: GrantScope) -> Result<()> {
        if !self.holds(user_id, permission, scope) {
            return Err(PermsError::GrantNotFound(format!("{permission} on {scope}")));
        }
        Ok(())
    }

    pub fn revoke(&mut self, user_id: Uuid, permission: &str, scope: GrantScope) -> Result<()> {
        self.check_revoke(user_id, permission, scope)?;
        if let Some(held) = self.grants.get_mut(&user_id) {
            held.remove(&(permission.to_string(), scope));
        }
        Ok(())
    }

    /// Load a category or permission without validation.
    pub fn insert_category(&mut self, name: &str) {
        self.categories.insert(name.to_string());
    }

    pub fn insert_permission(&mut self, name: &str, category: &str) {
        self.permissions
            .insert(name.to_string(), category.to_string());
    }
}
