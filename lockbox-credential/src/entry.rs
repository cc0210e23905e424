//! External collaborator seams: credential entry UI and biometrics.
//!
//! The core never renders anything. It calls these traits, awaits their
//! outcomes, and reacts; how a credential is collected (or a biometric
//! evaluated) is entirely the embedder's business.

use crate::types::CredentialType;
use async_trait::async_trait;

/// Outcome of asking the user for their existing credential.
#[derive(Clone, Debug)]
pub enum ExistingEntry {
    Canceled,
    Entered(String),
}

/// Outcome of asking the user to pick a new credential.
#[derive(Clone, Debug)]
pub enum NewEntry {
    Canceled,
    Entered {
        credential: String,
        credential_type: CredentialType,
    },
}

/// Collects credentials from the user.
#[async_trait]
pub trait CredentialEntry: Send + Sync {
    /// Asks for the existing credential. `is_change` flags a change-
    /// credential re-verification; `is_action_only` flags authorization of
    /// a single app action (e.g. sending funds) rather than an unlock;
    /// `title` optionally overrides the prompt title.
    async fn get_existing_credential(
        &self,
        is_change: bool,
        is_action_only: bool,
        title: Option<&str>,
    ) -> ExistingEntry;

    /// Asks for a new credential and its type.
    async fn get_new_credential(&self, is_change: bool) -> NewEntry;
}

/// Outcome of a biometric evaluation, already mapped from the platform's
/// error zoo: unrecoverable-but-fallbackable conditions (not enrolled,
/// unavailable, hardware lockout, failed match) become [`Fallback`];
/// user/system cancellation becomes [`Canceled`].
///
/// [`Fallback`]: BiometricOutcome::Fallback
/// [`Canceled`]: BiometricOutcome::Canceled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BiometricOutcome {
    Authorized,
    Fallback,
    Canceled,
}

/// Evaluates a biometric check ("is the credential holder present?").
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    async fn evaluate(&self, reason: Option<&str>) -> BiometricOutcome;
}
