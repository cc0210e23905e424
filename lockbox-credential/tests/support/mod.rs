//! Shared test doubles: scripted entry, blocking entry, biometrics, hooks.

use async_trait::async_trait;
use lockbox_credential::{
    BiometricAuthenticator, BiometricOutcome, ChangeCredentialHook, CredentialController,
    CredentialEntry, CredentialType, DeleteEverythingHook, ExistingEntry, NewEntry,
};
use lockbox_store::{DocumentStore, PassphraseSource};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Entry collaborator that replays queued responses and panics if the
/// controller asks for more than the test scripted.
#[derive(Default)]
pub struct ScriptedEntry {
    existing: Mutex<VecDeque<ExistingEntry>>,
    new: Mutex<VecDeque<NewEntry>>,
}

impl ScriptedEntry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_existing(&self, response: ExistingEntry) {
        self.existing.lock().unwrap().push_back(response);
    }

    pub fn push_new(&self, response: NewEntry) {
        self.new.lock().unwrap().push_back(response);
    }

    pub fn push_existing_credential(&self, credential: &str) {
        self.push_existing(ExistingEntry::Entered(credential.to_string()));
    }

    pub fn push_new_credential(&self, credential: &str, credential_type: CredentialType) {
        self.push_new(NewEntry::Entered {
            credential: credential.to_string(),
            credential_type,
        });
    }
}

#[async_trait]
impl CredentialEntry for ScriptedEntry {
    async fn get_existing_credential(
        &self,
        _is_change: bool,
        _is_action_only: bool,
        _title: Option<&str>,
    ) -> ExistingEntry {
        self.existing
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted existing-entry responses exhausted")
    }

    async fn get_new_credential(&self, _is_change: bool) -> NewEntry {
        self.new
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted new-entry responses exhausted")
    }
}

/// Entry collaborator that parks until released, for exercising the
/// one-flow-at-a-time guard.
#[derive(Default)]
pub struct BlockingEntry {
    pub reached: Notify,
    pub release: Notify,
}

#[async_trait]
impl CredentialEntry for BlockingEntry {
    async fn get_existing_credential(
        &self,
        _is_change: bool,
        _is_action_only: bool,
        _title: Option<&str>,
    ) -> ExistingEntry {
        self.reached.notify_one();
        self.release.notified().await;
        ExistingEntry::Canceled
    }

    async fn get_new_credential(&self, _is_change: bool) -> NewEntry {
        unreachable!("blocking entry only scripts existing-credential requests")
    }
}

/// Biometric collaborator with a fixed outcome.
pub struct FixedBiometrics(pub BiometricOutcome);

#[async_trait]
impl BiometricAuthenticator for FixedBiometrics {
    async fn evaluate(&self, _reason: Option<&str>) -> BiometricOutcome {
        self.0
    }
}

/// Change registrant standing in for a collaborator that re-encrypts its
/// documents: records the order it was invoked in and the credential its
/// state ends up sealed under. `fail_once` makes the next invocation fail
/// (the revert invocation then succeeds, as a real re-encrypt under the
/// restored credential would).
pub struct ReencryptHook {
    pub label: &'static str,
    pub controller: Arc<CredentialController>,
    pub call_log: Arc<Mutex<Vec<&'static str>>>,
    pub sealed_under: Mutex<Option<String>>,
    pub fail_once: AtomicBool,
    pub fail_always: AtomicBool,
}

impl ReencryptHook {
    pub fn new(
        label: &'static str,
        controller: Arc<CredentialController>,
        call_log: Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            controller,
            call_log,
            sealed_under: Mutex::new(None),
            fail_once: AtomicBool::new(false),
            fail_always: AtomicBool::new(false),
        })
    }
}

impl ChangeCredentialHook for ReencryptHook {
    fn on_change_credential(&self) -> anyhow::Result<()> {
        self.call_log.lock().unwrap().push(self.label);
        if self.fail_always.load(Ordering::SeqCst) || self.fail_once.swap(false, Ordering::SeqCst)
        {
            anyhow::bail!("simulated re-encrypt failure in {}", self.label);
        }
        let credential = self
            .controller
            .current_passphrase()
            .ok_or_else(|| anyhow::anyhow!("session locked during re-encrypt"))?;
        *self.sealed_under.lock().unwrap() = Some(credential.to_string());
        Ok(())
    }
}

/// Delete registrant that clears its own collection.
pub struct CollectionDeleteHook {
    pub store: Arc<DocumentStore>,
    pub collection: &'static str,
}

impl DeleteEverythingHook for CollectionDeleteHook {
    fn on_delete_everything(&self) -> anyhow::Result<()> {
        let outcome = self.store.remove_all(self.collection)?;
        if let Some(e) = outcome.first_error {
            anyhow::bail!("{e}");
        }
        Ok(())
    }
}

/// Delete registrant that always fails.
pub struct FailingDeleteHook;

impl DeleteEverythingHook for FailingDeleteHook {
    fn on_delete_everything(&self) -> anyhow::Result<()> {
        anyhow::bail!("simulated delete failure")
    }
}

/// Builds and boots a controller over `dir` with the given entry.
pub fn booted_controller(
    dir: &Path,
    entry: Arc<dyn CredentialEntry>,
) -> (Arc<DocumentStore>, Arc<CredentialController>) {
    let store = Arc::new(DocumentStore::new(dir).unwrap());
    let controller = Arc::new(CredentialController::new(store.clone(), entry));
    controller.boot().unwrap();
    (store, controller)
}

/// First-sets `credential` as a passphrase on a fresh controller over
/// `dir`, then drops that controller, leaving the persisted record behind.
pub async fn set_up_credential(dir: &Path, credential: &str) {
    let entry = ScriptedEntry::new();
    entry.push_new_credential(credential, CredentialType::Passphrase);
    let (_store, controller) = booted_controller(dir, entry);
    controller.acquire_credential().await.unwrap();
    assert!(controller.is_unlocked());
}
