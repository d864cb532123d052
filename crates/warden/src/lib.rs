//! # Warden
//!
//! The trust core of a configuration-management server: key exchange,
//! credential bootstrap and activation, bearer tokens and rule-based
//! authorization, behind a supervisor actor.
//!
//! ## Overview
//!
//! - **Key exchange**: clients open an X25519 exchange with `kex_init` and
//!   send credentials encrypted under it; each exchange serves one request
//! - **Credential flows**: `bootstrap_root`, `activate_user` and
//!   `issue_token` all answer with a bearer token sealed under the exchange
//! - **Tokens**: `validate_token` checks a bearer token for a user
//! - **Authorization**: `authorize` evaluates an action against the
//!   permission tables; `category`, `permission` and `right` manage them
//!
//! Every durable change is committed as one transaction before the
//! in-memory stores see it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden::{Supervisor, WardenConfig};
//! use warden::store::SqliteStore;
//! use warden::perms::AuthRequest;
//!
//! async fn example() {
//!     let mut config = WardenConfig::default();
//!     config.token_key = "server secret".into();
//!     config.token_seed = "seed".into();
//!
//!     let store = SqliteStore::open("warden.db").unwrap();
//!     let handle = Supervisor::new(config, Arc::new(store)).start().await.unwrap();
//!
//!     let verdict = handle
//!         .authorize(AuthRequest::global("root", "schema_list"))
//!         .await;
//!     println!("authorized: {}", verdict.authorized);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `warden::core` - Key exchange, tokens, credentials
//! - `warden::store` - Storage abstraction and SQLite
//! - `warden::perms` - Permission tables and the authorization engine

pub mod config;
pub mod directory;
pub mod error;
mod flows;
mod hashing;
pub mod request;
pub mod stores;
pub mod supervisor;

// Re-export component crates
pub use warden_core as core;
pub use warden_perms as perms;
pub use warden_store as store;

pub use config::{ActivationMethod, WardenConfig};
pub use directory::{Directory, NoDirectory, StaticDirectory};
pub use error::{Result, ResultCode, SupervisorError};
pub use request::{
    Action, CategoryAction, PermissionAction, PermissionInfo, Reply, ReplyBody, Request,
    RightAction, RightInfo, SealedRequest,
};
pub use supervisor::{Supervisor, SupervisorHandle};
