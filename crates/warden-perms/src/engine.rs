//! The authorization engine.

use serde::Serialize;
use uuid::Uuid;
use warden_core::{is_system_tier, GrantScope, OMNIPOTENCE};

use crate::action::{self, ActionScope};
use crate::tables::PermissionTables;

/// Outcome of one authorization check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub authorized: bool,
    pub admin: bool,
}

impl Verdict {
    pub const DENIED: Verdict = Verdict {
        authorized: false,
        admin: false,
    };
    pub const LIMITED: Verdict = Verdict {
        authorized: true,
        admin: false,
    };
    pub const ADMIN: Verdict = Verdict {
        authorized: true,
        admin: true,
    };
}

/// A (user, action, scope ids) triple to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub user: String,
    pub action: String,
    pub repository_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
}

impl AuthRequest {
    pub fn global(user: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            action: action.into(),
            repository_id: None,
            team_id: None,
        }
    }

    pub fn repository(user: impl Into<String>, action: impl Into<String>, id: Uuid) -> Self {
        Self {
            repository_id: Some(id),
            ..Self::global(user, action)
        }
    }

    pub fn team(user: impl Into<String>, action: impl Into<String>, id: Uuid) -> Self {
        Self {
            team_id: Some(id),
            ..Self::global(user, action)
        }
    }
}

/// Evaluates requests against [`PermissionTables`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationEngine {
    /// Authorize everything as admin. Sandbox use only.
    pub open_instance: bool,
}

impl AuthorizationEngine {
    pub fn new(open_instance: bool) -> Self {
        Self { open_instance }
    }

    /// Decide whether the request's user may perform its action.
    pub fn evaluate(&self, tables: &PermissionTables, request: &AuthRequest) -> Verdict {
        if self.open_instance {
            return Verdict::ADMIN;
        }

        let Some(rule) = action::lookup(&request.action) else {
            return Verdict::DENIED;
        };
        let Some(user) = tables.user(&request.user) else {
            return Verdict::DENIED;
        };

        if tables.holds(user.id, OMNIPOTENCE, GrantScope::Global) {
            return Verdict::ADMIN;
        }

        let object = match rule.scope {
            ActionScope::Global => None,
            ActionScope::Repository => match request.repository_id {
                Some(id) => Some(GrantScope::Repository(id)),
                None => return Verdict::DENIED,
            },
            ActionScope::Team => match request.team_id {
                Some(id) => Some(GrantScope::Team(id)),
                None => return Verdict::DENIED,
            },
        };

        for permission in rule.permissions {
            let system = is_system_tier(permission);
            let global = tables.holds(user.id, permission, GrantScope::Global);
            let scoped = object.is_some_and(|scope| tables.holds(user.id, permission, scope));
            if !(global || scoped) {
                continue;
            }

            if system {
                return Verdict::ADMIN;
            }

            if let Some(GrantScope::Team(team)) = object {
                if user.team_id != Some(team) {
                    continue;
                }
            }
            return Verdict::LIMITED;
        }

        Verdict::DENIED
    }
}
