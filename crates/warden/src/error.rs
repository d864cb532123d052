//! Error types for the supervisor.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use warden_core::CoreError;
use warden_perms::PermsError;
use warden_store::StoreError;

/// Result code carried by every reply, for the HTTP layer to map onto
/// transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResultCode {
    Ok,
    Accepted,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    NotAcceptable,
    Conflict,
    ServerError,
}

impl ResultCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ResultCode::Ok => 200,
            ResultCode::Accepted => 202,
            ResultCode::BadRequest => 400,
            ResultCode::Unauthorized => 401,
            ResultCode::Forbidden => 403,
            ResultCode::NotFound => 404,
            ResultCode::NotAcceptable => 406,
            ResultCode::Conflict => 409,
            ResultCode::ServerError => 500,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Ok | ResultCode::Accepted)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Errors that can occur while handling a request.
///
/// Only the [`ResultCode`] and a fixed public message leave the
/// supervisor; the detail is logged.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Key exchange, user or token absent, or origin mismatch.
    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong credentials, inactive or expired account.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Mutation on a read-only instance, duplicate bootstrap, duplicate row.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed payload or wrong user.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// New password equals the upstream password.
    #[error("new password must differ from the upstream password")]
    NotAcceptable,

    /// Cryptographic failure; never decomposed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Permission table error.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    /// The supervisor is no longer running.
    #[error("supervisor stopped")]
    Stopped,
}

impl SupervisorError {
    pub fn code(&self) -> ResultCode {
        match self {
            SupervisorError::NotFound(_) => ResultCode::NotFound,
            SupervisorError::Unauthorized(_) => ResultCode::Unauthorized,
            SupervisorError::Conflict(_) => ResultCode::Conflict,
            SupervisorError::BadRequest(_) => ResultCode::BadRequest,
            SupervisorError::NotAcceptable => ResultCode::NotAcceptable,
            SupervisorError::Store(StoreError::NotFound(_)) => ResultCode::NotFound,
            SupervisorError::Store(StoreError::Conflict(_)) => ResultCode::Conflict,
            SupervisorError::Permission(e) => match e {
                PermsError::UnknownUser(_)
                | PermsError::UnknownPermission(_)
                | PermsError::UnknownCategory(_)
                | PermsError::GrantNotFound(_) => ResultCode::NotFound,
                PermsError::DuplicateCategory(_)
                | PermsError::DuplicatePermission(_)
                | PermsError::CategoryInUse(_)
                | PermsError::DuplicateGrant(_) => ResultCode::Conflict,
                PermsError::ScopedSystemGrant(_) => ResultCode::BadRequest,
            },
            SupervisorError::Crypto(_)
            | SupervisorError::Store(_)
            | SupervisorError::Config(_)
            | SupervisorError::Blocking(_)
            | SupervisorError::Stopped => ResultCode::ServerError,
        }
    }

    /// The message a caller may see.
    pub fn public_message(&self) -> &'static str {
        match self.code() {
            ResultCode::NotFound => "not found",
            ResultCode::Unauthorized => "unauthorized",
            ResultCode::Conflict => "conflict",
            ResultCode::BadRequest => "bad request",
            ResultCode::NotAcceptable => "not acceptable",
            ResultCode::Forbidden => "forbidden",
            _ => "internal server error",
        }
    }
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
