//! The credential lifecycle state machine.
//!
//! One `CredentialController` instance orchestrates boot, unlock,
//! first-set, change-credential (with rollback), action authorization
//! (with biometric short-circuit), lock-down, and delete-everything over
//! the document store and the encryption envelope.
//!
//! All session state lives behind one mutex that is never held across a
//! suspension point; external entry and biometric calls are awaited, then
//! state is re-taken. At most one acquisition flow runs at a time; a
//! second request fails with [`CredentialError::FlowInProgress`] rather
//! than queueing.

use crate::entry::{
    BiometricAuthenticator, BiometricOutcome, CredentialEntry, ExistingEntry, NewEntry,
};
use crate::error::{CredentialError, CredentialResult};
use crate::events::{CredentialEvent, EntryPhase};
use crate::hooks::{ChangeCredentialHook, DeleteEverythingHook, HookHandle, HookRegistry};
use crate::lockout::LockoutPolicy;
use crate::types::{
    CredentialRecord, CredentialType, CREDENTIAL_COLLECTION, UNLOCK_CHALLENGE_PLAINTEXT,
};
use lockbox_store::{DocumentId, DocumentStore, PassphraseSource};
use std::mem;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Minimum length for both PINs and passphrases.
const MIN_CREDENTIAL_LEN: usize = 6;

/// How a flow ended when it did not error: it ran to completion, or the
/// user canceled (persisted state untouched, notified exactly once).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    Canceled,
}

/// In-memory session state. Never persisted; cleared on lock-down and
/// teardown. `credential` is `Some` exactly while the session is unlocked.
#[derive(Default)]
struct SessionState {
    booted: bool,
    record_id: Option<DocumentId>,
    credential: Option<Zeroizing<String>>,
    credential_type: CredentialType,
    challenge_armored: Option<String>,
}

/// Top-level credential state machine. Construct one per app instance and
/// hand `Arc`s to collaborators; there is deliberately no global.
pub struct CredentialController {
    store: Arc<DocumentStore>,
    entry: Arc<dyn CredentialEntry>,
    biometrics: Option<Arc<dyn BiometricAuthenticator>>,
    state: Mutex<SessionState>,
    /// One acquisition flow at a time; holding the guard *is* the flow.
    flow: tokio::sync::Mutex<()>,
    lockout: Mutex<LockoutPolicy>,
    change_hooks: Mutex<HookRegistry<dyn ChangeCredentialHook>>,
    delete_hooks: Mutex<HookRegistry<dyn DeleteEverythingHook>>,
    deferred: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    events_tx: broadcast::Sender<CredentialEvent>,
}

impl CredentialController {
    pub fn new(store: Arc<DocumentStore>, entry: Arc<dyn CredentialEntry>) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            store,
            entry,
            biometrics: None,
            state: Mutex::new(SessionState::default()),
            flow: tokio::sync::Mutex::new(()),
            lockout: Mutex::new(LockoutPolicy::new()),
            change_hooks: Mutex::new(HookRegistry::new()),
            delete_hooks: Mutex::new(HookRegistry::new()),
            deferred: Mutex::new(Vec::new()),
            events_tx,
        }
    }

    /// Enables the biometric short-circuit for action authorization.
    pub fn with_biometrics(mut self, biometrics: Arc<dyn BiometricAuthenticator>) -> Self {
        self.biometrics = Some(biometrics);
        self
    }

    // ── Events and registration ──────────────────────────────────

    /// Subscribes to controller events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events_tx.subscribe()
    }

    pub fn register_change_hook(&self, hook: &Arc<dyn ChangeCredentialHook>) -> HookHandle {
        self.change_hooks.lock().unwrap().register(hook)
    }

    pub fn unregister_change_hook(&self, handle: HookHandle) {
        self.change_hooks.lock().unwrap().unregister(handle);
    }

    pub fn register_delete_hook(&self, hook: &Arc<dyn DeleteEverythingHook>) -> HookHandle {
        self.delete_hooks.lock().unwrap().register(hook)
    }

    pub fn unregister_delete_hook(&self, handle: HookHandle) {
        self.delete_hooks.lock().unwrap().unregister(handle);
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn is_booted(&self) -> bool {
        self.state.lock().unwrap().booted
    }

    /// Whether a valid credential has been entered this session.
    pub fn is_unlocked(&self) -> bool {
        self.state.lock().unwrap().credential.is_some()
    }

    pub fn credential_type(&self) -> CredentialType {
        self.state.lock().unwrap().credential_type
    }

    /// Whether a credential record has ever been persisted. Hits the disk;
    /// more than one record is a fatal inconsistency.
    pub fn has_saved_credential(&self) -> CredentialResult<bool> {
        let ids = self.store.list_ids(CREDENTIAL_COLLECTION)?;
        match ids.len() {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(CredentialError::InvalidRecord(format!(
                "{n} credential records exist, expected at most one"
            ))),
        }
    }

    // ── Boot ─────────────────────────────────────────────────────

    /// Loads the credential record (synthesizing an in-memory default when
    /// none is saved), marks the controller booted, and runs deferred
    /// continuations in enqueue order.
    ///
    /// A read failure or an inconsistent record here is fatal by contract:
    /// the embedder must not continue into a session whose credential
    /// state cannot be trusted.
    pub fn boot(&self) -> CredentialResult<()> {
        if self.is_booted() {
            return Err(CredentialError::AlreadyBooted);
        }

        let documents = self.store.read_all_maps(CREDENTIAL_COLLECTION)?;
        if documents.len() > 1 {
            return Err(CredentialError::InvalidRecord(format!(
                "{} credential records exist, expected at most one",
                documents.len()
            )));
        }
        let record = match documents.first() {
            Some(map) => CredentialRecord::from_document(map)?,
            None => CredentialRecord::default(),
        };
        if record.id.is_some()
            && record
                .challenge_armored
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(CredentialError::InvalidRecord(
                "saved credential record has no unlock challenge".to_string(),
            ));
        }

        {
            let mut state = self.state.lock().unwrap();
            state.record_id = record.id;
            state.credential_type = record.credential_type;
            state.challenge_armored = record.challenge_armored;
            state.booted = true;
        }

        let continuations = mem::take(&mut *self.deferred.lock().unwrap());
        for continuation in continuations {
            continuation();
        }
        self.emit(CredentialEvent::Booted);
        info!("credential controller booted; waiting for unlock");
        Ok(())
    }

    /// Runs `f` immediately if booted, otherwise after the next boot.
    /// Boot/teardown cycles make "already constructed" and "booted"
    /// different things, hence the queue.
    pub fn once_booted(&self, f: impl FnOnce() + Send + 'static) {
        if self.is_booted() {
            f();
            return;
        }
        self.deferred.lock().unwrap().push(Box::new(f));
    }

    // ── Acquire (unlock or first-set) ────────────────────────────

    /// Obtains a credential from the user: first-set entry when none has
    /// ever been saved, otherwise existing-credential entry verified
    /// against the stored challenge. On success the session is unlocked.
    pub async fn acquire_credential(&self) -> CredentialResult<FlowOutcome> {
        self.ensure_booted()?;
        if self.is_unlocked() {
            warn!("acquire_credential requested but session is already unlocked");
            return Ok(FlowOutcome::Completed);
        }
        let _flow = self
            .flow
            .try_lock()
            .map_err(|_| CredentialError::FlowInProgress)?;

        let (record_id, challenge, credential_type) = {
            let state = self.state.lock().unwrap();
            (
                state.record_id.clone(),
                state.challenge_armored.clone(),
                state.credential_type,
            )
        };

        if record_id.is_none() {
            return self.obtain_new_credential(false).await;
        }
        let Some(challenge) = challenge else {
            return Err(CredentialError::InvalidRecord(
                "saved credential record has no unlock challenge".to_string(),
            ));
        };

        let candidate = match self.entry.get_existing_credential(false, false, None).await {
            ExistingEntry::Canceled => {
                self.emit(CredentialEvent::EntryCanceled {
                    phase: EntryPhase::Existing,
                });
                return Ok(FlowOutcome::Canceled);
            }
            ExistingEntry::Entered(candidate) => candidate,
        };

        if let Err(e) = self.check_lockout() {
            self.emit(CredentialEvent::ExistingCredentialErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }

        let verified = lockbox_crypto::open(&challenge, &candidate)
            .is_ok_and(|plaintext| plaintext == UNLOCK_CHALLENGE_PLAINTEXT);
        if !verified {
            // wrong credential and corrupted challenge read identically
            let err = CredentialError::Authentication(credential_type);
            self.emit(CredentialEvent::ExistingCredentialErrored {
                reason: err.to_string(),
            });
            return Err(err);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.credential = Some(Zeroizing::new(candidate));
            state.credential_type = credential_type;
        }
        self.emit(CredentialEvent::ObtainedExistingCredential);
        info!("session unlocked");
        Ok(FlowOutcome::Completed)
    }

    // ── Change credential ────────────────────────────────────────

    /// Changes the credential: re-verify the current one, collect the new
    /// one, persist, then drive every change hook. Any hook failure
    /// reverts the whole change; a failure *during that revert* is
    /// unrecoverable and aborts, since documents would be split between
    /// two credentials with no safe automatic fix.
    pub async fn change_credential(&self) -> CredentialResult<FlowOutcome> {
        self.ensure_booted()?;
        if !self.is_unlocked() {
            return Err(CredentialError::NotUnlocked);
        }
        let _flow = self
            .flow
            .try_lock()
            .map_err(|_| CredentialError::FlowInProgress)?;

        let (cached, credential_type) = {
            let state = self.state.lock().unwrap();
            (state.credential.clone(), state.credential_type)
        };
        let cached = cached.expect("unlocked session has a cached credential");

        let candidate = match self.entry.get_existing_credential(true, false, None).await {
            ExistingEntry::Canceled => {
                self.emit(CredentialEvent::ChangeCanceled);
                return Ok(FlowOutcome::Canceled);
            }
            ExistingEntry::Entered(candidate) => candidate,
        };

        if let Err(e) = self.check_lockout() {
            self.emit(CredentialEvent::ChangeErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }
        if candidate != *cached {
            let err = CredentialError::Authentication(credential_type);
            self.emit(CredentialEvent::ChangeErrored {
                reason: err.to_string(),
            });
            return Err(err);
        }

        self.obtain_new_credential(true).await
    }

    // ── Authorize an app action ──────────────────────────────────

    /// Confirms the credential holder is present before a sensitive app
    /// action. Tries biometrics first when available; session credential
    /// state is never changed. Cancellation is an outcome, not an error.
    pub async fn authorize_action(&self, title: Option<&str>) -> CredentialResult<FlowOutcome> {
        self.ensure_booted()?;
        if !self.is_unlocked() {
            return Err(CredentialError::NotUnlocked);
        }
        let _flow = self
            .flow
            .try_lock()
            .map_err(|_| CredentialError::FlowInProgress)?;

        if let Some(biometrics) = &self.biometrics {
            match biometrics.evaluate(title).await {
                BiometricOutcome::Authorized => {
                    self.emit(CredentialEvent::ActionAuthorized);
                    return Ok(FlowOutcome::Completed);
                }
                BiometricOutcome::Canceled => return Ok(FlowOutcome::Canceled),
                BiometricOutcome::Fallback => {
                    debug!("biometric evaluation fell back to credential entry");
                }
            }
        }

        let (cached, credential_type) = {
            let state = self.state.lock().unwrap();
            (state.credential.clone(), state.credential_type)
        };
        let cached = cached.expect("unlocked session has a cached credential");

        let candidate = match self.entry.get_existing_credential(false, true, title).await {
            ExistingEntry::Canceled => return Ok(FlowOutcome::Canceled),
            ExistingEntry::Entered(candidate) => candidate,
        };

        if let Err(e) = self.check_lockout() {
            self.emit(CredentialEvent::ActionErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }
        if candidate != *cached {
            let err = CredentialError::Authentication(credential_type);
            self.emit(CredentialEvent::ActionErrored {
                reason: err.to_string(),
            });
            return Err(err);
        }

        self.emit(CredentialEvent::ActionAuthorized);
        Ok(FlowOutcome::Completed)
    }

    // ── Lock-down ────────────────────────────────────────────────

    /// Tears down the unlocked session without deleting anything: clears
    /// the cached credential, announces the teardown pair, reboots so a
    /// subsequent unlock can proceed.
    pub fn lock(&self) -> CredentialResult<()> {
        if !self.is_unlocked() {
            warn!("lock requested but no credential entered yet");
            return Ok(());
        }
        info!("locking down session");
        self.emit(CredentialEvent::WillTearDownSession {
            for_delete_everything: false,
        });
        self.reset_session_state();
        self.emit(CredentialEvent::DidTearDownSession {
            for_delete_everything: false,
        });
        self.boot()
    }

    // ── Delete everything ────────────────────────────────────────

    /// Deletes the credential record and everything registrants own, then
    /// reboots into the never-set-up state.
    ///
    /// A registrant failure here aborts the process: the in-memory
    /// credential is already cleared and deletion may be partial, which
    /// has no recoverable continuation.
    pub fn delete_everything(&self) -> CredentialResult<()> {
        self.ensure_booted()?;
        if !self.has_saved_credential()? {
            return Err(CredentialError::NoSavedCredential);
        }

        info!("deleting everything");
        self.emit(CredentialEvent::WillTearDownSession {
            for_delete_everything: true,
        });
        self.reset_session_state();

        let hooks = self.delete_hooks.lock().unwrap().live();
        for hook in hooks {
            if let Err(e) = hook.on_delete_everything() {
                panic!(
                    "delete-everything registrant failed ({e}); the in-memory credential is \
                     already cleared and deletion may be partial; cannot continue"
                );
            }
        }

        let outcome = self.store.remove_all(CREDENTIAL_COLLECTION)?;
        if let Some(e) = outcome.first_error {
            panic!("could not remove the credential record during delete-everything: {e}");
        }
        info!("deleted credential record");

        self.emit(CredentialEvent::DidTearDownSession {
            for_delete_everything: true,
        });
        self.boot()?;
        self.emit(CredentialEvent::DeletedEverything);
        Ok(())
    }

    // ── New-credential entry (first-set and change) ──────────────

    /// Collects and validates a new credential, persists the record, and
    /// (in change mode) drives the change hooks. Callers hold the flow
    /// guard.
    async fn obtain_new_credential(&self, is_change: bool) -> CredentialResult<FlowOutcome> {
        // snapshot for rollback; all None/default on first set
        let (old_credential, old_type, old_challenge) = {
            let state = self.state.lock().unwrap();
            (
                state.credential.clone(),
                state.credential_type,
                state.challenge_armored.clone(),
            )
        };
        let first_set = old_credential.is_none();

        let (credential, credential_type) = match self.entry.get_new_credential(is_change).await {
            NewEntry::Canceled => {
                self.emit(CredentialEvent::EntryCanceled {
                    phase: EntryPhase::New,
                });
                return Ok(FlowOutcome::Canceled);
            }
            NewEntry::Entered {
                credential,
                credential_type,
            } => (credential, credential_type),
        };

        if let Err(e) = validate_new_credential(&credential, credential_type) {
            self.emit(CredentialEvent::NewCredentialErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }
        if is_change && old_credential.as_deref() == Some(&credential) {
            let e = CredentialError::Validation(match credential_type {
                CredentialType::Pin => "Please enter a fresh PIN.".to_string(),
                CredentialType::Passphrase => "Please enter a fresh password.".to_string(),
            });
            self.emit(CredentialEvent::NewCredentialErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }

        debug!(%credential_type, "obtained new credential");
        {
            let mut state = self.state.lock().unwrap();
            state.credential = Some(Zeroizing::new(credential.clone()));
            state.credential_type = credential_type;
        }

        if let Err(e) = self.persist_credential_record(&credential, credential_type) {
            // they'll have to try again; revert to the prior credential
            // (None for a first set)
            let mut state = self.state.lock().unwrap();
            state.credential = old_credential;
            state.credential_type = old_type;
            state.challenge_armored = old_challenge;
            drop(state);
            self.emit(CredentialEvent::NewCredentialErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }

        if first_set {
            self.emit(CredentialEvent::FirstCredentialSet);
            self.emit(CredentialEvent::ObtainedNewCredential);
            info!("first credential set");
            return Ok(FlowOutcome::Completed);
        }

        // change: every registrant re-encrypts under the new credential
        if let Err(hook_err) = self.run_change_hooks() {
            warn!("change-credential hook failed: {hook_err}; reverting");
            {
                let mut state = self.state.lock().unwrap();
                state.credential = old_credential.clone();
                state.credential_type = old_type;
            }
            let old_plain = old_credential.expect("change flow started from an unlocked session");
            if let Err(revert_err) = self.persist_credential_record(&old_plain, old_type) {
                panic!(
                    "could not re-persist the credential record while reverting a failed \
                     change-credential ({revert_err}); documents are split between two \
                     credentials; cannot continue"
                );
            }
            if let Err(revert_err) = self.run_change_hooks() {
                panic!(
                    "a registrant failed while reverting a failed change-credential \
                     ({revert_err}); documents are split between two credentials; cannot \
                     continue"
                );
            }
            // revert succeeded; the original failure is what gets reported
            let e = CredentialError::Hook(hook_err.to_string());
            self.emit(CredentialEvent::ChangeErrored {
                reason: e.to_string(),
            });
            return Err(e);
        }

        self.emit(CredentialEvent::ChangeCompleted);
        self.emit(CredentialEvent::ObtainedNewCredential);
        info!("credential changed");
        Ok(FlowOutcome::Completed)
    }

    // ── Internals ────────────────────────────────────────────────

    fn ensure_booted(&self) -> CredentialResult<()> {
        if !self.is_booted() {
            return Err(CredentialError::NotBooted);
        }
        Ok(())
    }

    fn check_lockout(&self) -> CredentialResult<()> {
        self.lockout
            .lock()
            .unwrap()
            .register_attempt(Instant::now())?;
        Ok(())
    }

    /// Seals the unlock challenge under `credential` and upserts the
    /// record document, keeping the in-memory copy of the challenge so a
    /// later change can re-verify without re-reading the store.
    fn persist_credential_record(
        &self,
        credential: &str,
        credential_type: CredentialType,
    ) -> CredentialResult<()> {
        let armored = lockbox_crypto::seal(UNLOCK_CHALLENGE_PLAINTEXT, credential)?;
        let record_id = self.state.lock().unwrap().record_id.clone();

        let record = CredentialRecord {
            id: record_id.clone(),
            credential_type,
            challenge_armored: Some(armored.clone()),
        };
        let id = self
            .store
            .upsert_map(CREDENTIAL_COLLECTION, record_id, record.to_document())?;

        let mut state = self.state.lock().unwrap();
        state.record_id = Some(id);
        state.challenge_armored = Some(armored);
        Ok(())
    }

    /// Invokes every live change registrant in registration order,
    /// stopping at the first failure. The registry lock is released before
    /// any hook runs.
    fn run_change_hooks(&self) -> anyhow::Result<()> {
        let hooks = self.change_hooks.lock().unwrap().live();
        for hook in hooks {
            hook.on_change_credential()?;
        }
        Ok(())
    }

    /// Back to pre-boot: locked, nothing cached, record reloaded on the
    /// next boot.
    fn reset_session_state(&self) {
        let mut state = self.state.lock().unwrap();
        state.booted = false;
        state.credential = None;
        state.record_id = None;
        state.challenge_armored = None;
    }

    fn emit(&self, event: CredentialEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// The session credential seam consumed by `RecordStore`: `Some` exactly
/// while unlocked.
impl PassphraseSource for CredentialController {
    fn current_passphrase(&self) -> Option<Zeroizing<String>> {
        self.state.lock().unwrap().credential.clone()
    }
}

fn validate_new_credential(
    credential: &str,
    credential_type: CredentialType,
) -> CredentialResult<()> {
    match credential_type {
        CredentialType::Pin => {
            if credential.chars().count() < MIN_CREDENTIAL_LEN {
                return Err(CredentialError::Validation(
                    "Please enter a longer PIN.".to_string(),
                ));
            }
            if !credential.chars().all(|c| c.is_ascii_digit()) {
                return Err(CredentialError::Validation(
                    "Please enter numbers only for a PIN.".to_string(),
                ));
            }
        }
        CredentialType::Passphrase => {
            if credential.chars().count() < MIN_CREDENTIAL_LEN {
                return Err(CredentialError::Validation(
                    "Please enter a longer password.".to_string(),
                ));
            }
        }
    }
    Ok(())
}
