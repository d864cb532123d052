//! # Warden Store
//!
//! Durable storage for the Warden trust core. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`StoreOp`] - One statement of an atomic commit batch
//!
//! ## Usage
//!
//! ```rust,no_run
//! use warden_store::{SqliteStore, Store, StoreOp};
//!
//! async fn example() {
//!     let store = SqliteStore::open("warden.db").unwrap();
//!
//!     // Everything in one batch lands, or nothing does.
//!     store.commit(vec![StoreOp::EnableRoot]).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Batches**: mutations are submitted as an ordered `Vec<StoreOp>` and run
//!   in a single transaction
//! - **Seed rows**: a fresh store holds the root account, the built-in
//!   categories and permissions, and root's omnipotence grant

pub mod error;
pub mod memory;
pub mod migration;
pub mod seed;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use seed::{OMNIPOTENCE, ROOT_USER_ID};
pub use sqlite::SqliteStore;
pub use traits::{
    GrantRecord, PermissionRecord, PermissionSnapshot, RootFlags, Store, StoreOp, TeamRecord,
    UserRecord,
};
