//! Credential error types.

use crate::lockout::LockoutError;
use crate::types::CredentialType;
use lockbox_crypto::CryptoError;
use lockbox_store::StoreError;
use thiserror::Error;

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Errors that can occur in the credential lifecycle.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The entered credential failed validation (too short, wrong shape,
    /// reused on change). No state changed.
    #[error("{0}")]
    Validation(String),

    /// Wrong credential or corrupted challenge. Always carries the same
    /// generic per-type message, never the underlying cause.
    #[error("{}", .0.incorrect_entry_message())]
    Authentication(CredentialType),

    /// Too many attempts; transient and self-clearing. Distinct from
    /// [`CredentialError::Authentication`] so UIs can show "wait" instead
    /// of "wrong credential".
    #[error(transparent)]
    LockedOut(#[from] LockoutError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The saved credential state is inconsistent (more than one record,
    /// or a record with no unlock challenge).
    #[error("credential record is invalid: {0}")]
    InvalidRecord(String),

    /// A credential-acquisition flow is already in progress; this request
    /// was dropped, not queued. Listen for events to observe the in-flight
    /// flow's outcome.
    #[error("another credential flow is already in progress")]
    FlowInProgress,

    #[error("controller has not booted")]
    NotBooted,

    #[error("controller already booted")]
    AlreadyBooted,

    #[error("operation requires an unlocked session")]
    NotUnlocked,

    #[error("no saved credential record")]
    NoSavedCredential,

    /// A change-credential registrant failed; the change was reverted.
    #[error("change-credential hook failed: {0}")]
    Hook(String),
}
