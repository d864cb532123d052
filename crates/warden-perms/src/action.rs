//! The static action table.
//!
//! Each action names the scope it is checked in and the permissions that
//! allow it, system tier first. The first permission a user holds decides
//! the verdict.

use serde::Serialize;

/// The scope an action is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    Global,
    Repository,
    Team,
}

/// One row of the action table.
#[derive(Debug, Clone, Copy)]
pub struct ActionRule {
    pub name: &'static str,
    pub scope: ActionScope,
    /// Permissions allowing the action, in evaluation order.
    pub permissions: &'static [&'static str],
}

const SCHEMA: &[&str] = &["system_all", "global_schema"];
const VIEW: &[&str] = &["system_all", "global_view"];
const MONITORING: &[&str] = &["system_all", "global_monitoring"];
const USER: &[&str] = &["system_all", "global_user"];
const PERMISSION: &[&str] = &["system_permission", "permission_manage"];
const REPOSITORY_READ: &[&str] = &["system_repository", "repository_write", "repository_read"];
const REPOSITORY_WRITE: &[&str] = &["system_repository", "repository_write"];
const TEAM_READ: &[&str] = &["system_team", "team_write", "team_read"];
const TEAM_WRITE: &[&str] = &["system_team", "team_write"];

const fn rule(
    name: &'static str,
    scope: ActionScope,
    permissions: &'static [&'static str],
) -> ActionRule {
    ActionRule {
        name,
        scope,
        permissions,
    }
}

/// Every action the engine knows. Anything else is denied.
pub const ACTIONS: &[ActionRule] = &[
    // Global
    rule("schema_list", ActionScope::Global, SCHEMA),
    rule("schema_show", ActionScope::Global, SCHEMA),
    rule("schema_add", ActionScope::Global, SCHEMA),
    rule("schema_remove", ActionScope::Global, SCHEMA),
    rule("view_list", ActionScope::Global, VIEW),
    rule("view_add", ActionScope::Global, VIEW),
    rule("view_remove", ActionScope::Global, VIEW),
    rule("capability_list", ActionScope::Global, MONITORING),
    rule("capability_add", ActionScope::Global, MONITORING),
    rule("monitoring_list", ActionScope::Global, MONITORING),
    rule("user_list", ActionScope::Global, USER),
    rule("user_show", ActionScope::Global, USER),
    rule("user_add", ActionScope::Global, USER),
    rule("category_list", ActionScope::Global, PERMISSION),
    rule("category_add", ActionScope::Global, PERMISSION),
    rule("category_remove", ActionScope::Global, PERMISSION),
    rule("permission_list", ActionScope::Global, PERMISSION),
    rule("permission_show", ActionScope::Global, PERMISSION),
    rule("permission_add", ActionScope::Global, PERMISSION),
    rule("permission_remove", ActionScope::Global, PERMISSION),
    rule("right_list", ActionScope::Global, PERMISSION),
    rule("right_grant", ActionScope::Global, PERMISSION),
    rule("right_revoke", ActionScope::Global, PERMISSION),
    // Repository
    rule("repository_show", ActionScope::Repository, REPOSITORY_READ),
    rule("bucket_list", ActionScope::Repository, REPOSITORY_READ),
    rule("bucket_add", ActionScope::Repository, REPOSITORY_WRITE),
    rule("property_add", ActionScope::Repository, REPOSITORY_WRITE),
    rule("check_config_add", ActionScope::Repository, REPOSITORY_WRITE),
    rule("repository_remove", ActionScope::Repository, REPOSITORY_WRITE),
    // Team
    rule("team_show", ActionScope::Team, TEAM_READ),
    rule("node_list", ActionScope::Team, TEAM_READ),
    rule("node_add", ActionScope::Team, TEAM_WRITE),
    rule("team_update", ActionScope::Team, TEAM_WRITE),
];

/// Look up an action by name.
pub fn lookup(action: &str) -> Option<&'static ActionRule> {
    ACTIONS.iter().find(|rule| rule.name == action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use warden_core::is_system_tier;

    #[test]
    fn test_action_names_unique() {
        let names: HashSet<_> = ACTIONS.iter().map(|r| r.name).collect();
        assert_eq!(names.len(), ACTIONS.len());
    }

    #[test]
    fn test_system_tier_listed_first() {
        for rule in ACTIONS {
            assert!(!rule.permissions.is_empty(), "{} has no permissions", rule.name);
            let first_limited = rule
                .permissions
                .iter()
                .position(|p| !is_system_tier(p))
                .unwrap_or(rule.permissions.len());
            assert!(
                rule.permissions[first_limited..]
                    .iter()
                    .all(|p| !is_system_tier(p)),
                "{} lists a system permission after a limited one",
                rule.name
            );
        }
    }

    #[test]
    fn test_lookup() {
        let rule = lookup("schema_list").unwrap();
        assert_eq!(rule.scope, ActionScope::Global);
        assert_eq!(rule.permissions, &["system_all", "global_schema"]);
        assert!(lookup("launch_missiles").is_none());
    }
}
