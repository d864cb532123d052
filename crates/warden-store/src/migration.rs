//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1. Applied
//! versions are recorded in `schema_migrations`.

use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};
use crate::seed;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().timestamp()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: initial schema and built-in rows.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Root account flags: 'enabled', 'restricted'
        CREATE TABLE root_flags (
            flag TEXT PRIMARY KEY,
            value INTEGER NOT NULL DEFAULT 0
        );

        -- PHC hash of the one-time bootstrap token
        CREATE TABLE root_password (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            token_hash TEXT NOT NULL
        );

        CREATE TABLE teams (
            team_id TEXT PRIMARY KEY,
            team_name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE users (
            user_id TEXT PRIMARY KEY,
            user_name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 0,
            team_id TEXT REFERENCES teams(team_id)
        );

        CREATE TABLE activation_tokens (
            user_id TEXT PRIMARY KEY REFERENCES users(user_id),
            token_hash TEXT NOT NULL
        );

        -- One row per user: a new credential supersedes the old one
        CREATE TABLE credentials (
            user_id TEXT PRIMARY KEY REFERENCES users(user_id),
            user_name TEXT NOT NULL,
            valid_from INTEGER NOT NULL,      -- Unix seconds
            expires_at INTEGER NOT NULL,      -- Unix seconds
            password_hash TEXT NOT NULL,      -- PHC string
            reset_active INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE tokens (
            token TEXT PRIMARY KEY,           -- hex keyed hash
            user_name TEXT NOT NULL,
            salt TEXT NOT NULL,
            valid_from INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            client_address TEXT NOT NULL
        );

        CREATE TABLE categories (
            category TEXT PRIMARY KEY
        );

        CREATE TABLE permissions (
            permission TEXT PRIMARY KEY,
            category TEXT NOT NULL REFERENCES categories(category)
        );

        CREATE TABLE grants (
            user_id TEXT NOT NULL REFERENCES users(user_id),
            permission TEXT NOT NULL REFERENCES permissions(permission),
            scope_kind TEXT NOT NULL,         -- global | repository | team
            object_id TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (user_id, permission, scope_kind, object_id)
        );

        CREATE INDEX idx_tokens_expires ON tokens(expires_at);
        CREATE INDEX idx_grants_user ON grants(user_id);
        "#,
    )?;

    conn.execute(
        "INSERT INTO root_flags (flag, value) VALUES ('enabled', 0), ('restricted', 0)",
        [],
    )?;
    conn.execute(
        "INSERT INTO users (user_id, user_name, is_active) VALUES (?1, ?2, 0)",
        params![seed::ROOT_USER_ID.to_string(), warden_core::ROOT_USER],
    )?;
    for category in seed::CATEGORIES {
        conn.execute(
            "INSERT INTO categories (category) VALUES (?1)",
            params![category],
        )?;
    }
    for (permission, category) in seed::PERMISSIONS {
        conn.execute(
            "INSERT INTO permissions (permission, category) VALUES (?1, ?2)",
            params![permission, category],
        )?;
    }
    conn.execute(
        "INSERT INTO grants (user_id, permission, scope_kind) VALUES (?1, ?2, 'global')",
        params![seed::ROOT_USER_ID.to_string(), seed::OMNIPOTENCE],
    )?;

    Ok(())
}
