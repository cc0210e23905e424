//! One-file-per-document storage keyed by `(collection, id)`.

use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Globally-unique opaque document id (UUID v4 string).
pub type DocumentId = String;

/// Named partition of the store, analogous to a table.
pub type CollectionName = String;

/// Structured document contents: a flat JSON object.
pub type DocumentMap = serde_json::Map<String, Value>;

/// Separates collection from id in filenames. Not `-`, because ids are
/// UUIDs and contain dashes.
pub const FILENAME_DELIMITER: &str = "__";

/// Registered document file extension. Scans ignore everything else.
pub const FILENAME_EXT: &str = "lbdoc_v1";

/// Returns a fresh document id.
pub fn new_document_id() -> DocumentId {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome of a best-effort removal: how many documents were removed, and
/// the first error hit (successful removals are not rolled back).
#[derive(Debug)]
pub struct RemoveOutcome {
    pub removed: usize,
    pub first_error: Option<StoreError>,
}

/// File-backed key/value store keyed by `(collection, id)`.
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    /// Opens (creating if needed) a store backed by `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, collection: &str, id: &str) -> PathBuf {
        self.dir
            .join(format!("{collection}{FILENAME_DELIMITER}{id}.{FILENAME_EXT}"))
    }

    /// Lists the ids of every document in `collection`.
    ///
    /// Files without the registered extension are ignored; a file *with*
    /// the extension whose stem does not parse is a store-level error.
    pub fn list_ids(&self, collection: &str) -> StoreResult<Vec<DocumentId>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let suffix = format!(".{FILENAME_EXT}");

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = filename.strip_suffix(&suffix) else {
                continue; // not a document file
            };
            let components: Vec<&str> = stem.split(FILENAME_DELIMITER).collect();
            if components.len() != 2 {
                return Err(StoreError::MalformedFilename(filename));
            }
            if components[0] == collection {
                ids.push(components[1].to_string());
            }
        }
        Ok(ids)
    }

    /// Reads the raw contents of the given documents. All-or-nothing: if
    /// any id is unreadable the whole call fails with no partial result.
    pub fn read_raw(&self, collection: &str, ids: &[DocumentId]) -> StoreResult<Vec<Vec<u8>>> {
        let mut contents = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self.file_path(collection, id);
            let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
            contents.push(bytes);
        }
        Ok(contents)
    }

    /// Reads the given documents as structured maps. All-or-nothing.
    pub fn read_maps(&self, collection: &str, ids: &[DocumentId]) -> StoreResult<Vec<DocumentMap>> {
        self.read_raw(collection, ids)?
            .iter()
            .map(|bytes| {
                let value: Value = serde_json::from_slice(bytes)?;
                Ok(serde_json::from_value(value)?)
            })
            .collect()
    }

    /// Reads every document in `collection` as a structured map.
    pub fn read_all_maps(&self, collection: &str) -> StoreResult<Vec<DocumentMap>> {
        let ids = self.list_ids(collection)?;
        self.read_maps(collection, &ids)
    }

    /// Writes a structured document keyed by `id`, generating an id if none
    /// is given. The stored map always carries its own id under `_id`.
    pub fn upsert_map(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        mut map: DocumentMap,
    ) -> StoreResult<DocumentId> {
        let id = id.unwrap_or_else(new_document_id);
        map.insert("_id".to_string(), Value::String(id.clone()));
        let bytes = serde_json::to_vec(&Value::Object(map))?;
        self.write_atomic(&self.file_path(collection, &id), &bytes)?;
        Ok(id)
    }

    /// Writes caller-formatted bytes (e.g. an encrypted blob) under
    /// `(collection, id)`. The caller owns the id in this mode.
    pub fn write_raw(&self, collection: &str, id: &str, bytes: &[u8]) -> StoreResult<()> {
        self.write_atomic(&self.file_path(collection, id), bytes)
    }

    /// Removes the given documents. Best-effort per id: every id is
    /// attempted, successful removals stand, and the first error (if any)
    /// is reported in the outcome.
    pub fn remove(&self, collection: &str, ids: &[DocumentId]) -> RemoveOutcome {
        let mut removed = 0;
        let mut first_error = None;
        for id in ids {
            let path = self.file_path(collection, id);
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(StoreError::io(&path, e));
                    }
                }
            }
        }
        debug!(collection, removed, "removed documents");
        RemoveOutcome {
            removed,
            first_error,
        }
    }

    /// Removes every document in `collection`.
    pub fn remove_all(&self, collection: &str) -> StoreResult<RemoveOutcome> {
        let ids = self.list_ids(collection)?;
        Ok(self.remove(collection, &ids))
    }

    /// Atomic replace: write to a sibling temp file, fsync, rename over the
    /// destination. A reader never observes a half-written document. The
    /// temp suffix keeps the file invisible to extension-filtered scans.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let tmp = path.with_extension(format!("{FILENAME_EXT}.tmp"));
        {
            let mut file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
            file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        }
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
    }
}
