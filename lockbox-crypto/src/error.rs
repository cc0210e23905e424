//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the encryption layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed. Deliberately carries no detail: a wrong
    /// passphrase, a truncated blob, and a tampered blob all produce this
    /// same error so the interface cannot be used as an oracle.
    #[error("authentication failed (wrong passphrase or corrupted data)")]
    Authentication,
}
