//! Typed event surface published by the controller.

/// Which entry prompt a cancellation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryPhase {
    Existing,
    New,
}

/// Everything the controller announces. Subscribers hold a
/// `broadcast::Receiver` and drop it to unsubscribe.
#[derive(Clone, Debug)]
pub enum CredentialEvent {
    /// The controller loaded (or synthesized) the credential record and is
    /// ready; deferred continuations have run.
    Booted,

    /// A credential was set for the first time this runtime.
    FirstCredentialSet,
    /// A new credential was accepted and persisted (first set or change).
    ObtainedNewCredential,
    /// The existing credential was entered correctly; session is unlocked.
    ObtainedExistingCredential,

    NewCredentialErrored { reason: String },
    ExistingCredentialErrored { reason: String },
    EntryCanceled { phase: EntryPhase },

    ChangeCanceled,
    ChangeErrored { reason: String },
    /// Every registrant re-encrypted under the new credential.
    ChangeCompleted,

    ActionAuthorized,
    ActionErrored { reason: String },

    /// The unlocked session is being torn down. Consumers should release
    /// decrypted state and wait for `DidTearDownSession` to re-request.
    WillTearDownSession { for_delete_everything: bool },
    DidTearDownSession { for_delete_everything: bool },

    /// Delete-everything finished and the controller rebooted.
    DeletedEverything,
}
