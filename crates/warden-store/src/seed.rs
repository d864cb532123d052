//! Rows every fresh store starts with.

use uuid::Uuid;
pub use warden_core::OMNIPOTENCE;

/// Id of the built-in root account.
pub const ROOT_USER_ID: Uuid = Uuid::nil();

/// Built-in permission categories.
pub const CATEGORIES: &[&str] = &[
    OMNIPOTENCE,
    "system",
    "global",
    "permission",
    "repository",
    "team",
];

/// Built-in permissions as `(name, category)`.
pub const PERMISSIONS: &[(&str, &str)] = &[
    (OMNIPOTENCE, OMNIPOTENCE),
    ("system_all", "system"),
    ("system_repository", "system"),
    ("system_team", "system"),
    ("system_permission", "system"),
    ("global_schema", "global"),
    ("global_view", "global"),
    ("global_monitoring", "global"),
    ("global_user", "global"),
    ("permission_manage", "permission"),
    ("repository_read", "repository"),
    ("repository_write", "repository"),
    ("team_read", "team"),
    ("team_write", "team"),
];
