//! # Warden Core
//!
//! Pure primitives for the Warden trust core: key exchange, bearer tokens,
//! password hashing and credentials.
//!
//! This crate contains no I/O, no storage, no locking. The supervisor in the
//! `warden` crate owns instances of these types and decides their lifecycle.
//!
//! ## Key Types
//!
//! - [`KeyExchange`] - one side of an ephemeral X25519 handshake
//! - [`BearerToken`] - keyed-hash token bound to user, address and expiry
//! - [`Credential`] - a user's local password hash and validity window
//! - [`CredentialRequest`] - the encrypted body of credential requests
//! - [`GrantScope`] - global, repository or team reach of a permission grant

pub mod credential;
pub mod error;
pub mod kex;
pub mod password;
pub mod scope;
pub mod token;

pub use credential::{perpetual, Credential, CredentialRequest, ROOT_USER};
pub use error::{CoreError, Result};
pub use kex::{KexMessage, KeyExchange, DEFAULT_KEX_EXPIRY_SECS, KEY_SIZE, NONCE_SIZE};
pub use password::{hash_password, verify_password};
pub use scope::{is_system_tier, GrantScope, OMNIPOTENCE, SYSTEM_PREFIX};
pub use token::{BearerToken, TokenKey, DEFAULT_TOKEN_LIFETIME_SECS};
