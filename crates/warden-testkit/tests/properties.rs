//! Property tests across crates.

use chrono::Duration;
use proptest::prelude::*;
use uuid::Uuid;
use warden_core::{BearerToken, GrantScope, TokenKey, OMNIPOTENCE};
use warden_perms::{AuthRequest, AuthorizationEngine, PermissionTables, Verdict, ACTIONS};
use warden_store::seed;
use warden_testkit::generators::{action_name, grant_scope, ip_address, lifetime_secs, user_name};

#[test]
fn test_action_table_names_only_seeded_permissions() {
    for rule in ACTIONS {
        for permission in rule.permissions {
            assert!(
                seed::PERMISSIONS.iter().any(|(name, _)| name == permission),
                "{} requires unknown permission {permission}",
                rule.name
            );
        }
    }
}

#[test]
fn test_seeded_permissions_use_seeded_categories() {
    for (permission, category) in seed::PERMISSIONS {
        assert!(
            seed::CATEGORIES.contains(category),
            "{permission} in unknown category {category}"
        );
    }
}

fn seeded_tables() -> PermissionTables {
    let mut tables = PermissionTables::new();
    for category in seed::CATEGORIES {
        tables.insert_category(category);
    }
    for (permission, category) in seed::PERMISSIONS {
        tables.insert_permission(permission, category);
    }
    tables
}

proptest! {
    #[test]
    fn prop_token_binds_user_and_address(
        user in user_name(),
        other in user_name(),
        addr in ip_address(),
        secs in lifetime_secs(),
    ) {
        let key = TokenKey::derive("prop key");
        let token = BearerToken::generate(&user, addr, Duration::seconds(secs), &key, "seed");
        prop_assert!(token.verify(&key, "seed"));
        prop_assert!(!token.verify(&key, "other seed"));

        let mut renamed = token.clone();
        renamed.user_name = other.clone();
        prop_assert_eq!(renamed.verify(&key, "seed"), other == user);
    }

    #[test]
    fn prop_omnipotence_is_admin_everywhere(
        user in user_name(),
        action in action_name(),
        scope in grant_scope(),
    ) {
        let mut tables = seeded_tables();
        let id = Uuid::new_v4();
        tables.upsert_user(user.clone(), id, None);
        tables.grant(id, OMNIPOTENCE, GrantScope::Global).unwrap();

        let request = match scope {
            GrantScope::Global => AuthRequest::global(user, action),
            GrantScope::Repository(object) => AuthRequest::repository(user, action, object),
            GrantScope::Team(object) => AuthRequest::team(user, action, object),
        };
        prop_assert_eq!(
            AuthorizationEngine::default().evaluate(&tables, &request),
            Verdict::ADMIN
        );
    }

    #[test]
    fn prop_system_grants_cannot_be_scoped(scope in grant_scope()) {
        let mut tables = seeded_tables();
        let id = Uuid::new_v4();
        tables.upsert_user("alice", id, None);

        let result = tables.grant(id, "system_all", scope);
        prop_assert_eq!(result.is_ok(), scope.is_global());
    }
}
