//! # Warden Permissions
//!
//! Rule-based authorization for the Warden trust core.
//!
//! ## Key Concepts
//!
//! - **Action table**: every action names its scope (global, repository,
//!   team) and the permissions that allow it, system tier first
//! - **Tiers**: `system_`-prefixed permissions make the holder an admin for
//!   the action; any other held permission authorizes without admin
//! - **Omnipotence**: the universal permission, admin for every action
//! - **Scoped grants**: a limited permission may be granted for one
//!   repository or team; system-tier permissions are global only
//!
//! ## Usage
//!
//! ```rust
//! use uuid::Uuid;
//! use warden_core::GrantScope;
//! use warden_perms::{AuthRequest, AuthorizationEngine, PermissionTables, Verdict};
//!
//! let mut tables = PermissionTables::new();
//! tables.insert_category("global");
//! tables.insert_permission("global_schema", "global");
//!
//! let alice = Uuid::new_v4();
//! tables.upsert_user("alice", alice, None);
//! tables.grant(alice, "global_schema", GrantScope::Global).unwrap();
//!
//! let verdict = AuthorizationEngine::default()
//!     .evaluate(&tables, &AuthRequest::global("alice", "schema_list"));
//! assert_eq!(verdict, Verdict::LIMITED);
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod tables;

pub use action::{ActionRule, ActionScope, ACTIONS};
pub use engine::{AuthRequest, AuthorizationEngine, Verdict};
pub use error::{PermsError, Result};
pub use tables::{PermissionTables, UserEntry};
