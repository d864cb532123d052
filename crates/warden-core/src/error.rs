//! Error types for Warden Core.

use thiserror::Error;

/// Core errors that can occur during key exchange and credential operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Any failure inside the key exchange cipher.
    ///
    /// Expired exchanges, unset keys, undecodable input and failed
    /// authentication all collapse into this variant.
    #[error("cryptographic operation failed")]
    Crypto,

    /// The IV plus counter no longer fits the nonce width.
    #[error("nonce space exhausted")]
    NonceOverflow,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::DecodingError(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
