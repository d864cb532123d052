//! # Warden Testkit
//!
//! Testing utilities for Warden.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a supervisor over a seeded memory store, and a client that
//!   performs the key exchange and seals credential requests
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use warden_testkit::fixtures::{test_config, TestServer};
//!
//! async fn example() {
//!     let (server, root_token) = TestServer::bootstrapped(test_config()).await.unwrap();
//!     server
//!         .handle
//!         .validate_token("root", root_token.value, root_token.client_address)
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use warden_testkit::generators::{ip_address, user_name};
//!
//! proptest! {
//!     #[test]
//!     fn token_binds_user(user in user_name(), addr in ip_address()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    credential_request, loopback, provision_user, seeded_store, test_config, ClientError,
    TestClient, TestServer, ROOT_BOOTSTRAP_TOKEN, ROOT_PASSWORD, TOKEN_KEY, TOKEN_SEED,
};
