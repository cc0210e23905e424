//! Encrypted round-trip persistence for domain objects.
//!
//! A [`PersistableRecord`] exposes its plaintext fields as a map; the
//! [`RecordStore`] seals that map with the session credential and writes
//! the armored blob through the document store. The credential comes from
//! a [`PassphraseSource`]; the credential controller implements it, and
//! stores never see key material directly.

use crate::document_store::{new_document_id, DocumentId, DocumentMap, DocumentStore};
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use lockbox_crypto::CryptoError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Provides the session credential while unlocked.
///
/// Implementations own the credential; callers get a zeroizing copy or
/// `None` when the session is locked.
pub trait PassphraseSource: Send + Sync {
    fn current_passphrase(&self) -> Option<Zeroizing<String>>;
}

/// Always-unlocked source with a fixed passphrase, for tests and tools.
pub struct FixedPassphrase(pub String);

impl PassphraseSource for FixedPassphrase {
    fn current_passphrase(&self) -> Option<Zeroizing<String>> {
        Some(Zeroizing::new(self.0.clone()))
    }
}

/// A domain object that round-trips through the encrypted store.
pub trait PersistableRecord: Sized {
    /// Collection this record type lives in.
    const COLLECTION: &'static str;

    /// Document id; `None` until first saved.
    fn record_id(&self) -> Option<&DocumentId>;
    fn set_record_id(&mut self, id: DocumentId);

    /// Unix timestamp stamped at first insert; preserved on update.
    fn inserted_at(&self) -> Option<i64>;
    fn set_inserted_at(&mut self, timestamp: i64);

    /// Plaintext field map. Implementations must include `_id` and
    /// `inserted_at` (via [`base_record_map`]) alongside their own fields.
    fn to_map(&self) -> DocumentMap;

    /// Reconstructs the record from a map produced by [`Self::to_map`].
    fn from_map(map: &DocumentMap) -> StoreResult<Self>;
}

/// Builds the base fields every record map carries.
pub fn base_record_map<R: PersistableRecord>(record: &R) -> DocumentMap {
    let mut map = DocumentMap::new();
    if let Some(id) = record.record_id() {
        map.insert("_id".to_string(), Value::String(id.clone()));
    }
    if let Some(ts) = record.inserted_at() {
        map.insert("inserted_at".to_string(), Value::Number(ts.into()));
    }
    map
}

/// Requires a string field in a document map.
pub fn require_str<'a>(map: &'a DocumentMap, key: &'static str) -> StoreResult<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or(StoreError::InvalidField(key))
}

/// Reads an optional string field.
pub fn optional_str<'a>(map: &'a DocumentMap, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Reads an optional integer field.
pub fn optional_i64(map: &DocumentMap, key: &str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

/// Record lifecycle signals, bracketing removal.
#[derive(Clone, Debug)]
pub enum RecordEvent {
    WillDelete {
        collection: String,
        id: Option<DocumentId>,
    },
    DidDelete {
        collection: String,
        id: Option<DocumentId>,
    },
}

/// Drives save/delete/load of [`PersistableRecord`]s through the encrypted
/// envelope.
pub struct RecordStore {
    store: Arc<DocumentStore>,
    passphrase: Arc<dyn PassphraseSource>,
    events_tx: broadcast::Sender<RecordEvent>,
}

impl RecordStore {
    pub fn new(store: Arc<DocumentStore>, passphrase: Arc<dyn PassphraseSource>) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            store,
            passphrase,
            events_tx,
        }
    }

    /// Subscribes to record lifecycle events. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events_tx.subscribe()
    }

    pub fn document_store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Saves a record: first save assigns an id and stamps `inserted_at`;
    /// later saves reseal in place.
    ///
    /// With no session credential cached this is a successful no-op;
    /// records lingering through a teardown must not fail on release.
    pub fn save<R: PersistableRecord>(&self, record: &mut R) -> StoreResult<()> {
        let Some(passphrase) = self.passphrase.current_passphrase() else {
            warn!(
                collection = R::COLLECTION,
                "save requested with no session credential; skipping"
            );
            return Ok(());
        };

        let id = match record.record_id() {
            Some(id) => id.clone(),
            None => {
                let id = new_document_id();
                record.set_record_id(id.clone());
                record.set_inserted_at(Utc::now().timestamp());
                id
            }
        };

        let plaintext = serde_json::to_vec(&Value::Object(record.to_map()))?;
        let armored = lockbox_crypto::seal(&plaintext, &passphrase)?;
        self.store.write_raw(R::COLLECTION, &id, armored.as_bytes())?;
        debug!(collection = R::COLLECTION, %id, "saved record");
        Ok(())
    }

    /// Deletes a record's backing document, emitting will/did-delete around
    /// the removal. A record that was never persisted is a successful no-op
    /// that still emits both signals, so observers behave consistently.
    pub fn delete<R: PersistableRecord>(&self, record: &R) -> StoreResult<()> {
        let id = record.record_id().cloned();
        self.emit(RecordEvent::WillDelete {
            collection: R::COLLECTION.to_string(),
            id: id.clone(),
        });

        let Some(id) = id else {
            warn!(
                collection = R::COLLECTION,
                "asked to delete a record that was never saved"
            );
            self.emit(RecordEvent::DidDelete {
                collection: R::COLLECTION.to_string(),
                id: None,
            });
            return Ok(());
        };

        let outcome = self.store.remove(R::COLLECTION, &[id.clone()]);
        if let Some(err) = outcome.first_error {
            // a failed delete leaves the document in place; no DidDelete
            return Err(err);
        }
        self.emit(RecordEvent::DidDelete {
            collection: R::COLLECTION.to_string(),
            id: Some(id),
        });
        Ok(())
    }

    /// Loads and decrypts every record in the type's collection.
    pub fn load_all<R: PersistableRecord>(&self) -> StoreResult<Vec<R>> {
        let Some(passphrase) = self.passphrase.current_passphrase() else {
            return Err(StoreError::SessionLocked);
        };

        let ids = self.store.list_ids(R::COLLECTION)?;
        let blobs = self.store.read_raw(R::COLLECTION, &ids)?;

        blobs
            .iter()
            .map(|bytes| {
                let armored = std::str::from_utf8(bytes)
                    .map_err(|_| StoreError::Crypto(CryptoError::Authentication))?;
                let plaintext = lockbox_crypto::open(armored, &passphrase)?;
                let value: Value = serde_json::from_slice(&plaintext)?;
                let map: DocumentMap = serde_json::from_value(value)?;
                R::from_map(&map)
            })
            .collect()
    }

    fn emit(&self, event: RecordEvent) {
        let _ = self.events_tx.send(event);
    }
}
