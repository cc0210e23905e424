//! File-backed encrypted document store for Lockbox.
//!
//! Documents are keyed by `(collection, id)` and live one per file under a
//! single directory, named `{collection}__{id}.{ext}`. Writes are atomic
//! (temp file + rename), reads are all-or-nothing per call, removal is
//! best-effort per id.
//!
//! On top of the raw store, [`PersistableRecord`] + [`RecordStore`] give
//! domain objects an encrypted round-trip: plaintext field maps are sealed
//! with the session credential (via [`PassphraseSource`]) and stored as
//! armored blobs.

mod document_store;
mod error;
mod record;

pub use document_store::{
    new_document_id, CollectionName, DocumentId, DocumentMap, DocumentStore, RemoveOutcome,
    FILENAME_DELIMITER, FILENAME_EXT,
};
pub use error::{StoreError, StoreResult};
pub use record::{
    base_record_map, optional_i64, optional_str, require_str, FixedPassphrase, PassphraseSource,
    PersistableRecord, RecordEvent, RecordStore,
};
