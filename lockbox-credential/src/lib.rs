//! Credential lifecycle for Lockbox.
//!
//! A single user-supplied credential (PIN or passphrase) protects all
//! local secrets. This crate owns its lifecycle:
//!
//! - **First-time setup**: collect, validate, and persist a new
//!   credential as a sealed unlock challenge.
//! - **Unlock**: verify an entered credential by opening the stored
//!   challenge, rate-limited by [`LockoutPolicy`].
//! - **Change**: re-verify, persist the replacement, drive registrant
//!   re-encryption hooks, and roll everything back atomically if any
//!   registrant fails.
//! - **Action authorization**: confirm the credential holder is present
//!   (biometric short-circuit, credential fallback) without touching
//!   session state.
//! - **Lock-down and delete-everything**: tear the session down, with or
//!   without destroying persisted state, and reboot.
//!
//! The controller never renders UI and is never a global: entry and
//! biometrics are injected trait objects, collaborators subscribe to a
//! typed event channel, and the session credential flows to the storage
//! layer only through the `PassphraseSource` seam.

mod controller;
mod entry;
mod error;
mod events;
mod hooks;
mod lockout;
mod types;

pub use controller::{CredentialController, FlowOutcome};
pub use entry::{
    BiometricAuthenticator, BiometricOutcome, CredentialEntry, ExistingEntry, NewEntry,
};
pub use error::{CredentialError, CredentialResult};
pub use events::{CredentialEvent, EntryPhase};
pub use hooks::{ChangeCredentialHook, DeleteEverythingHook, HookHandle};
pub use lockout::{LockoutError, LockoutPolicy};
pub use types::{
    CredentialRecord, CredentialType, CREDENTIAL_COLLECTION, UNLOCK_CHALLENGE_PLAINTEXT,
};
