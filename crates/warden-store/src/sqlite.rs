//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.

use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use uuid::Uuid;
use warden_core::{BearerToken, Credential, GrantScope};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::seed::ROOT_USER_ID;
use crate::traits::{
    GrantRecord, PermissionRecord, PermissionSnapshot, RootFlags, Store, StoreOp, TeamRecord,
    UserRecord,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let team: Option<String> = row.get(3)?;
    let team_id = match team {
        Some(text) => Some(Uuid::parse_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?),
        None => None,
    };
    Ok(UserRecord {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        team_id,
    })
}

fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        user_id: uuid_col(row, 0)?,
        user_name: row.get(1)?,
        valid_from: time_col(row, 2)?,
        expires_at: time_col(row, 3)?,
        password_hash: row.get(4)?,
        reset_active: row.get(5)?,
        is_active: row.get(6)?,
    })
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<BearerToken> {
    let address: String = row.get(5)?;
    let client_address: IpAddr = address
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(BearerToken {
        value: row.get(0)?,
        user_name: row.get(1)?,
        salt: row.get(2)?,
        valid_from: time_col(row, 3)?,
        expires_at: time_col(row, 4)?,
        client_address,
    })
}

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<GrantRecord> {
    let kind: String = row.get(2)?;
    let object: String = row.get(3)?;
    let object_id = if object.is_empty() {
        None
    } else {
        Some(Uuid::parse_str(&object).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?)
    };
    let scope = GrantScope::from_parts(&kind, object_id).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("invalid grant scope {kind}").into(),
        )
    })?;
    Ok(GrantRecord {
        user_id: uuid_col(row, 0)?,
        permission: row.get(1)?,
        scope,
    })
}

fn object_column(scope: &GrantScope) -> String {
    scope.object_id().map(|id| id.to_string()).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Commit batch
// ─────────────────────────────────────────────────────────────────────────────

fn upsert_credential(tx: &Transaction<'_>, credential: &Credential) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO credentials (
            user_id, user_name, valid_from, expires_at, password_hash, reset_active, is_active
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            credential.user_id.to_string(),
            credential.user_name,
            credential.valid_from.timestamp(),
            credential.expires_at.timestamp(),
            credential.password_hash,
            credential.reset_active,
            credential.is_active,
        ],
    )?;
    Ok(())
}

fn apply_op(tx: &Transaction<'_>, op: &StoreOp) -> Result<()> {
    match op {
        StoreOp::SetRootCredentials(credential) | StoreOp::SetUserCredential(credential) => {
            upsert_credential(tx, credential)?;
        }
        StoreOp::EnableRoot => {
            tx.execute("UPDATE root_flags SET value = 1 WHERE flag = 'enabled'", [])?;
            tx.execute(
                "UPDATE users SET is_active = 1 WHERE user_id = ?1",
                params![ROOT_USER_ID.to_string()],
            )?;
        }
        StoreOp::SetRootRestricted(restricted) => {
            tx.execute(
                "UPDATE root_flags SET value = ?1 WHERE flag = 'restricted'",
                params![restricted],
            )?;
        }
        StoreOp::SetRootPassword(hash) => {
            tx.execute(
                "INSERT OR REPLACE INTO root_password (id, token_hash) VALUES (1, ?1)",
                params![hash],
            )?;
        }
        StoreOp::ActivateUser(user_id) => {
            let changed = tx.execute(
                "UPDATE users SET is_active = 1 WHERE user_id = ?1",
                params![user_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
        }
        StoreOp::SetActivationToken {
            user_id,
            token_hash,
        } => {
            tx.execute(
                "INSERT OR REPLACE INTO activation_tokens (user_id, token_hash) VALUES (?1, ?2)",
                params![user_id.to_string(), token_hash],
            )?;
        }
        StoreOp::InsertToken(token) => {
            tx.execute(
                "INSERT INTO tokens (
                    token, user_name, salt, valid_from, expires_at, client_address
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    token.value,
                    token.user_name,
                    token.salt,
                    token.valid_from.timestamp(),
                    token.expires_at.timestamp(),
                    token.client_address.to_string(),
                ],
            )?;
        }
        StoreOp::CreateUser(user) => {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO users (user_id, user_name, is_active, team_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.to_string(),
                    user.name,
                    user.is_active,
                    user.team_id.map(|id| id.to_string()),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!("user {}", user.name)));
            }
        }
        StoreOp::CreateTeam(team) => {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO teams (team_id, team_name) VALUES (?1, ?2)",
                params![team.id.to_string(), team.name],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!("team {}", team.name)));
            }
        }
        StoreOp::AddCategory(name) => {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO categories (category) VALUES (?1)",
                params![name],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!("category {name}")));
            }
        }
        StoreOp::RemoveCategory(name) => {
            let in_use: i64 = tx.query_row(
                "SELECT COUNT(*) FROM permissions WHERE category = ?1",
                params![name],
                |row| row.get(0),
            )?;
            if in_use > 0 {
                return Err(StoreError::Conflict(format!("category {name} in use")));
            }
            let changed = tx.execute("DELETE FROM categories WHERE category = ?1", params![name])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("category {name}")));
            }
        }
        StoreOp::AddPermission(permission) => {
            let category: Option<String> = tx
                .query_row(
                    "SELECT category FROM categories WHERE category = ?1",
                    params![permission.category],
                    |row| row.get(0),
                )
                .optional()?;
            if category.is_none() {
                return Err(StoreError::NotFound(format!(
                    "category {}",
                    permission.category
                )));
            }
            let changed = tx.execute(
                "INSERT OR IGNORE INTO permissions (permission, category) VALUES (?1, ?2)",
                params![permission.name, permission.category],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!("permission {}", permission.name)));
            }
        }
        StoreOp::RemovePermission(name) => {
            tx.execute("DELETE FROM grants WHERE permission = ?1", params![name])?;
            let changed =
                tx.execute("DELETE FROM permissions WHERE permission = ?1", params![name])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("permission {name}")));
            }
        }
        StoreOp::GrantRight(grant) => {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO grants (user_id, permission, scope_kind, object_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    grant.user_id.to_string(),
                    grant.permission,
                    grant.scope.kind(),
                    object_column(&grant.scope),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::Conflict(format!(
                    "grant {} on {}",
                    grant.permission, grant.scope
                )));
            }
        }
        StoreOp::RevokeRight(grant) => {
            let changed = tx.execute(
                "DELETE FROM grants
                 WHERE user_id = ?1 AND permission = ?2 AND scope_kind = ?3 AND object_id = ?4",
                params![
                    grant.user_id.to_string(),
                    grant.permission,
                    grant.scope.kind(),
                    object_column(&grant.scope),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "grant {} on {}",
                    grant.permission, grant.scope
                )));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_root_flags(&self) -> Result<RootFlags> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT flag, value FROM root_flags")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut flags = RootFlags::default();
            for (flag, value) in rows {
                match flag.as_str() {
                    "enabled" => flags.enabled = value,
                    "restricted" => flags.restricted = value,
                    other => tracing::warn!(flag = other, "unknown root flag"),
                }
            }
            Ok(flags)
        })
        .await
    }

    async fn load_root_password(&self) -> Result<Option<String>> {
        self.blocking(|conn| {
            conn.query_row("SELECT token_hash FROM root_password WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_user(&self, name: &str) -> Result<Option<UserRecord>> {
        let name = name.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT user_id, user_name, is_active, team_id FROM users WHERE user_name = ?1",
                params![name],
                row_to_user,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn load_activation_token(&self, user_id: Uuid) -> Result<Option<String>> {
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT token_hash FROM activation_tokens WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn load_credentials(&self) -> Result<Vec<Credential>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, user_name, valid_from, expires_at, password_hash,
                        reset_active, is_active
                 FROM credentials",
            )?;
            let credentials = stmt
                .query_map([], row_to_credential)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(credentials)
        })
        .await
    }

    async fn load_tokens(&self) -> Result<Vec<BearerToken>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token, user_name, salt, valid_from, expires_at, client_address
                 FROM tokens WHERE expires_at >= ?1",
            )?;
            let tokens = stmt
                .query_map(params![Utc::now().timestamp()], row_to_token)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tokens)
        })
        .await
    }

    async fn load_permissions(&self) -> Result<PermissionSnapshot> {
        self.blocking(|conn| {
            let users = conn
                .prepare("SELECT user_id, user_name, is_active, team_id FROM users")?
                .query_map([], row_to_user)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let teams = conn
                .prepare("SELECT team_id, team_name FROM teams")?
                .query_map([], |row| {
                    Ok(TeamRecord {
                        id: uuid_col(row, 0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let categories = conn
                .prepare("SELECT category FROM categories ORDER BY category")?
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            let permissions = conn
                .prepare("SELECT permission, category FROM permissions ORDER BY permission")?
                .query_map([], |row| {
                    Ok(PermissionRecord {
                        name: row.get(0)?,
                        category: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let grants = conn
                .prepare("SELECT user_id, permission, scope_kind, object_id FROM grants")?
                .query_map([], row_to_grant)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(PermissionSnapshot {
                users,
                teams,
                categories,
                permissions,
                grants,
            })
        })
        .await
    }

    async fn commit(&self, ops: Vec<StoreOp>) -> Result<()> {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            for op in &ops {
                apply_op(&tx, op).map_err(|e| {
                    tracing::debug!(op = op.name(), error = %e, "commit statement failed");
                    e
                })?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use warden_core::{hash_password, perpetual, TokenKey, ROOT_USER};

    fn user(name: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_active: false,
            team_id: None,
        }
    }

    fn token_for(name: &str) -> BearerToken {
        BearerToken::generate(
            name,
            "127.0.0.1".parse().unwrap(),
            Duration::hours(1),
            &TokenKey::derive("k"),
            "s",
        )
    }

    #[tokio::test]
    async fn test_fresh_store_has_root() {
        let store = SqliteStore::open_memory().unwrap();

        let root = store.find_user(ROOT_USER).await.unwrap().unwrap();
        assert_eq!(root.id, ROOT_USER_ID);
        assert!(!root.is_active);

        assert_eq!(store.load_root_flags().await.unwrap(), RootFlags::default());
        assert!(store.load_root_password().await.unwrap().is_none());
        assert!(store.find_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_batch() {
        let store = SqliteStore::open_memory().unwrap();
        let now = Utc::now();
        let credential = Credential::new(
            ROOT_USER_ID,
            ROOT_USER,
            hash_password("pw").unwrap(),
            now,
            perpetual(),
        );
        let token = token_for(ROOT_USER);

        store
            .commit(vec![
                StoreOp::SetRootCredentials(credential.clone()),
                StoreOp::EnableRoot,
                StoreOp::InsertToken(token.clone()),
            ])
            .await
            .unwrap();

        assert!(store.load_root_flags().await.unwrap().enabled);
        assert!(store.find_user(ROOT_USER).await.unwrap().unwrap().is_active);

        let credentials = store.load_credentials().await.unwrap();
        assert_eq!(credentials.len(), 1);
        assert_eq!(credentials[0].expires_at, perpetual());
        assert_eq!(credentials[0].valid_from.timestamp(), now.timestamp());

        assert_eq!(store.load_tokens().await.unwrap(), vec![token]);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        let token = token_for("alice");

        let result = store
            .commit(vec![
                StoreOp::InsertToken(token),
                StoreOp::ActivateUser(Uuid::new_v4()),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(store.load_tokens().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credential_superseded() {
        let store = SqliteStore::open_memory().unwrap();
        let alice = user("alice");
        let now = Utc::now();
        store.commit(vec![StoreOp::CreateUser(alice.clone())]).await.unwrap();

        for password in ["first", "second"] {
            let credential = Credential::new(
                alice.id,
                "alice",
                hash_password(password).unwrap(),
                now,
                perpetual(),
            );
            store
                .commit(vec![StoreOp::SetUserCredential(credential)])
                .await
                .unwrap();
        }

        let credentials = store.load_credentials().await.unwrap();
        assert_eq!(credentials.len(), 1);
        assert!(credentials[0].verify_password("second"));
    }

    #[tokio::test]
    async fn test_activation_token() {
        let store = SqliteStore::open_memory().unwrap();
        let bob = user("bob");

        store
            .commit(vec![
                StoreOp::CreateUser(bob.clone()),
                StoreOp::SetActivationToken {
                    user_id: bob.id,
                    token_hash: "hash".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            store.load_activation_token(bob.id).await.unwrap().as_deref(),
            Some("hash")
        );
        store.commit(vec![StoreOp::ActivateUser(bob.id)]).await.unwrap();
        assert!(store.find_user("bob").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_expired_tokens_not_loaded() {
        let store = SqliteStore::open_memory().unwrap();
        let mut stale = token_for("alice");
        stale.valid_from = Utc::now() - Duration::hours(3);
        stale.expires_at = Utc::now() - Duration::hours(2);

        store.commit(vec![StoreOp::InsertToken(stale)]).await.unwrap();
        assert!(store.load_tokens().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_category_rules() {
        let store = SqliteStore::open_memory().unwrap();

        store
            .commit(vec![StoreOp::AddCategory("monitoring".into())])
            .await
            .unwrap();
        assert!(matches!(
            store.commit(vec![StoreOp::AddCategory("monitoring".into())]).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.commit(vec![StoreOp::RemoveCategory("global".into())]).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.commit(vec![StoreOp::RemoveCategory("absent".into())]).await,
            Err(StoreError::NotFound(_))
        ));
        store
            .commit(vec![StoreOp::RemoveCategory("monitoring".into())])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_permission_and_grants() {
        let store = SqliteStore::open_memory().unwrap();
        let carol = user("carol");
        let repo = Uuid::new_v4();
        let grant = GrantRecord {
            user_id: carol.id,
            permission: "repository_audit".into(),
            scope: GrantScope::Repository(repo),
        };

        assert!(matches!(
            store
                .commit(vec![StoreOp::AddPermission(PermissionRecord {
                    name: "x".into(),
                    category: "absent".into(),
                })])
                .await,
            Err(StoreError::NotFound(_))
        ));

        store
            .commit(vec![
                StoreOp::CreateUser(carol.clone()),
                StoreOp::AddPermission(PermissionRecord {
                    name: "repository_audit".into(),
                    category: "repository".into(),
                }),
                StoreOp::GrantRight(grant.clone()),
            ])
            .await
            .unwrap();

        let snapshot = store.load_permissions().await.unwrap();
        assert!(snapshot.grants.contains(&grant));
        assert!(snapshot.users.iter().any(|u| u.name == "carol"));

        assert!(matches!(
            store.commit(vec![StoreOp::GrantRight(grant.clone())]).await,
            Err(StoreError::Conflict(_))
        ));

        store
            .commit(vec![StoreOp::RemovePermission("repository_audit".into())])
            .await
            .unwrap();
        let snapshot = store.load_permissions().await.unwrap();
        assert!(!snapshot.grants.contains(&grant));
        assert!(matches!(
            store.commit(vec![StoreOp::RevokeRight(grant)]).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .commit(vec![
                    StoreOp::SetRootPassword("phc".into()),
                    StoreOp::SetRootRestricted(true),
                ])
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load_root_password().await.unwrap().as_deref(), Some("phc"));
        assert!(store.load_root_flags().await.unwrap().restricted);
    }
}
