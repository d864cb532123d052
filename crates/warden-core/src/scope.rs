//! Grant scopes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The universal permission; its holder is admin for every action.
pub const OMNIPOTENCE: &str = "omnipotence";

/// Name prefix of system-tier permissions.
pub const SYSTEM_PREFIX: &str = "system_";

/// System-tier permissions and omnipotence grant admin authority and may
/// only be held globally.
pub fn is_system_tier(permission: &str) -> bool {
    permission == OMNIPOTENCE || permission.starts_with(SYSTEM_PREFIX)
}

/// Where a permission grant applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GrantScope {
    Global,
    Repository(Uuid),
    Team(Uuid),
}

impl GrantScope {
    /// Stable name of the scope kind, as persisted.
    pub fn kind(&self) -> &'static str {
        match self {
            GrantScope::Global => "global",
            GrantScope::Repository(_) => "repository",
            GrantScope::Team(_) => "team",
        }
    }

    /// The scoped object id, `None` for global grants.
    pub fn object_id(&self) -> Option<Uuid> {
        match self {
            GrantScope::Global => None,
            GrantScope::Repository(id) | GrantScope::Team(id) => Some(*id),
        }
    }

    /// Rebuild a scope from its persisted parts.
    pub fn from_parts(kind: &str, object_id: Option<Uuid>) -> Option<Self> {
        match (kind, object_id) {
            ("global", None) => Some(GrantScope::Global),
            ("repository", Some(id)) => Some(GrantScope::Repository(id)),
            ("team", Some(id)) => Some(GrantScope::Team(id)),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, GrantScope::Global)
    }
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.object_id() {
            None => f.write_str(self.kind()),
            Some(id) => write!(f, "{}:{}", self.kind(), id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_roundtrip() {
        let id = Uuid::new_v4();
        for scope in [GrantScope::Global, GrantScope::Repository(id), GrantScope::Team(id)] {
            assert_eq!(
                GrantScope::from_parts(scope.kind(), scope.object_id()),
                Some(scope)
            );
        }
    }

    #[test]
    fn test_system_tier() {
        assert!(is_system_tier("omnipotence"));
        assert!(is_system_tier("system_all"));
        assert!(!is_system_tier("global_schema"));
        assert!(!is_system_tier("systematic"));
    }

    #[test]
    fn test_inconsistent_parts_rejected() {
        assert_eq!(GrantScope::from_parts("global", Some(Uuid::new_v4())), None);
        assert_eq!(GrantScope::from_parts("team", None), None);
        assert_eq!(GrantScope::from_parts("bucket", None), None);
    }
}
