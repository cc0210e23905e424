//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure; carries the path and the OS-level message.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file with the registered extension whose name does not parse as
    /// `{collection}__{id}`. Scans report this rather than skipping it.
    #[error("unrecognized filename in store directory: {0}")]
    MalformedFilename(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A document field is missing or has the wrong shape.
    #[error("invalid document field: {0}")]
    InvalidField(&'static str),

    /// A record operation needed the session credential but none is cached.
    #[error("session is locked")]
    SessionLocked,

    #[error("crypto error: {0}")]
    Crypto(#[from] lockbox_crypto::CryptoError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
