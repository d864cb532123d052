//! Error types for the permissions module.

use thiserror::Error;

/// Errors raised when a permission table change is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermsError {
    /// User is not known to the tables.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Permission does not exist.
    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    /// Category does not exist.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// Category already exists.
    #[error("category already exists: {0}")]
    DuplicateCategory(String),

    /// Permission already exists.
    #[error("permission already exists: {0}")]
    DuplicatePermission(String),

    /// Category still has permissions.
    #[error("category {0} still has permissions")]
    CategoryInUse(String),

    /// The user already holds this grant.
    #[error("grant already exists: {0}")]
    DuplicateGrant(String),

    /// The user does not hold this grant.
    #[error("grant not found: {0}")]
    GrantNotFound(String),

    /// System-tier permissions are global only.
    #[error("system-tier permission {0} cannot be scoped")]
    ScopedSystemGrant(String),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
