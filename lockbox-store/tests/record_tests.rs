use lockbox_store::{
    base_record_map, optional_i64, optional_str, require_str, DocumentId, DocumentMap,
    DocumentStore, FixedPassphrase, PassphraseSource, PersistableRecord, RecordEvent, RecordStore,
    StoreError, StoreResult,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use zeroize::Zeroizing;

/// Minimal domain object standing in for a wallet entry.
#[derive(Debug, Default, PartialEq)]
struct Contact {
    id: Option<DocumentId>,
    inserted_at: Option<i64>,
    name: String,
    address: String,
}

impl PersistableRecord for Contact {
    const COLLECTION: &'static str = "Contacts";

    fn record_id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }
    fn set_record_id(&mut self, id: DocumentId) {
        self.id = Some(id);
    }
    fn inserted_at(&self) -> Option<i64> {
        self.inserted_at
    }
    fn set_inserted_at(&mut self, timestamp: i64) {
        self.inserted_at = Some(timestamp);
    }

    fn to_map(&self) -> DocumentMap {
        let mut map = base_record_map(self);
        map.insert("name".into(), json!(self.name));
        map.insert("address".into(), json!(self.address));
        map
    }

    fn from_map(map: &DocumentMap) -> StoreResult<Self> {
        Ok(Self {
            id: optional_str(map, "_id").map(str::to_string),
            inserted_at: optional_i64(map, "inserted_at"),
            name: require_str(map, "name")?.to_string(),
            address: require_str(map, "address")?.to_string(),
        })
    }
}

/// Source that is locked (no cached credential).
struct LockedSession;

impl PassphraseSource for LockedSession {
    fn current_passphrase(&self) -> Option<Zeroizing<String>> {
        None
    }
}

fn open_record_store(passphrase: Arc<dyn PassphraseSource>) -> (TempDir, RecordStore) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(DocumentStore::new(dir.path()).unwrap());
    (dir, RecordStore::new(store, passphrase))
}

fn unlocked() -> Arc<dyn PassphraseSource> {
    Arc::new(FixedPassphrase("hunter22".to_string()))
}

// ── Save ─────────────────────────────────────────────────────────

#[test]
fn first_save_assigns_id_and_inserted_at() {
    let (_dir, records) = open_record_store(unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };

    records.save(&mut contact).unwrap();

    assert!(contact.id.is_some());
    assert!(contact.inserted_at.is_some());
}

#[test]
fn saved_record_roundtrips_through_encryption() {
    let (_dir, records) = open_record_store(unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };
    records.save(&mut contact).unwrap();

    let loaded: Vec<Contact> = records.load_all().unwrap();
    assert_eq!(loaded, vec![contact]);
}

#[test]
fn stored_bytes_are_sealed_not_plaintext() {
    let (_dir, records) = open_record_store(unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };
    records.save(&mut contact).unwrap();

    let raw = records
        .document_store()
        .read_raw(Contact::COLLECTION, &[contact.id.clone().unwrap()])
        .unwrap();
    let on_disk = String::from_utf8(raw[0].clone()).unwrap();
    assert!(!on_disk.contains("Alice"));
    assert!(!on_disk.contains("4Adr"));
}

#[test]
fn resave_preserves_id_and_inserted_at() {
    let (_dir, records) = open_record_store(unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };
    records.save(&mut contact).unwrap();
    let id = contact.id.clone();
    let inserted_at = contact.inserted_at;

    contact.name = "Alice B".into();
    records.save(&mut contact).unwrap();

    assert_eq!(contact.id, id);
    assert_eq!(contact.inserted_at, inserted_at);

    let loaded: Vec<Contact> = records.load_all().unwrap();
    assert_eq!(loaded[0].name, "Alice B");
}

#[test]
fn save_with_locked_session_is_a_successful_noop() {
    let (_dir, records) = open_record_store(Arc::new(LockedSession));
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };

    records.save(&mut contact).unwrap();

    // Nothing assigned, nothing written
    assert!(contact.id.is_none());
    assert!(records
        .document_store()
        .list_ids(Contact::COLLECTION)
        .unwrap()
        .is_empty());
}

#[test]
fn load_all_with_locked_session_errors() {
    let (_dir, records) = open_record_store(Arc::new(LockedSession));
    let result: Result<Vec<Contact>, _> = records.load_all();
    assert!(matches!(result, Err(StoreError::SessionLocked)));
}

#[test]
fn load_all_with_wrong_passphrase_fails_closed() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(DocumentStore::new(dir.path()).unwrap());

    let writer = RecordStore::new(store.clone(), unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };
    writer.save(&mut contact).unwrap();

    let reader = RecordStore::new(store, Arc::new(FixedPassphrase("wrong".into())));
    let result: Result<Vec<Contact>, _> = reader.load_all();
    assert!(matches!(result, Err(StoreError::Crypto(_))));
}

// ── Delete ───────────────────────────────────────────────────────

#[test]
fn delete_removes_backing_document() {
    let (_dir, records) = open_record_store(unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };
    records.save(&mut contact).unwrap();

    records.delete(&contact).unwrap();
    assert!(records
        .document_store()
        .list_ids(Contact::COLLECTION)
        .unwrap()
        .is_empty());
}

#[test]
fn delete_emits_will_and_did_signals() {
    let (_dir, records) = open_record_store(unlocked());
    let mut contact = Contact {
        name: "Alice".into(),
        address: "4Adr...".into(),
        ..Default::default()
    };
    records.save(&mut contact).unwrap();

    let mut events = records.subscribe();
    records.delete(&contact).unwrap();

    assert!(matches!(
        events.try_recv().unwrap(),
        RecordEvent::WillDelete { id: Some(_), .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        RecordEvent::DidDelete { id: Some(_), .. }
    ));
}

#[test]
fn delete_of_unsaved_record_is_noop_but_still_signals() {
    let (_dir, records) = open_record_store(unlocked());
    let contact = Contact {
        name: "Never saved".into(),
        address: "-".into(),
        ..Default::default()
    };

    let mut events = records.subscribe();
    records.delete(&contact).unwrap();

    assert!(matches!(
        events.try_recv().unwrap(),
        RecordEvent::WillDelete { id: None, .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        RecordEvent::DidDelete { id: None, .. }
    ));
}
