//! The metadata index: one JSON document holding every badge record.
//!
//! The index is rewritten whole on every mutation (load, modify, save).
//! A missing document is a fresh install; a document that does not validate
//! as an array of records loads as an empty collection and is reported so
//! the store can offer a repair.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::badge_model::BadgeRecord;
use crate::blob_store::BlobStore;
use crate::error::{StoreError, StoreResult};

/// How the index document looked when it was loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    /// No document on disk yet.
    Missing,
    /// Parsed as an array. `skipped` counts entries that were not valid
    /// records and were left out of the result.
    Loaded { skipped: usize },
    /// The document exists but is unreadable, not JSON, or not an array.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct IndexLoad {
    pub records: Vec<BadgeRecord>,
    pub state: IndexState,
}

impl IndexLoad {
    fn empty(state: IndexState) -> Self {
        Self {
            records: Vec::new(),
            state,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self.state, IndexState::Loaded { skipped: 0 } | IndexState::Missing)
    }
}

#[derive(Debug, Clone)]
pub struct MetadataIndex {
    path: PathBuf,
    blobs: BlobStore,
}

impl MetadataIndex {
    pub fn new(path: impl Into<PathBuf>, blobs: BlobStore) -> Self {
        Self {
            path: path.into(),
            blobs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.blobs.exists(&self.path)
    }

    /// Loads every record in insertion order. Never fails; problems are
    /// reported through [`IndexLoad::state`].
    pub fn load_all(&self) -> IndexLoad {
        let raw = match self.blobs.read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(StoreError::NotFound(_)) => {
                debug!("Index {} does not exist yet", self.path.display());
                return IndexLoad::empty(IndexState::Missing);
            }
            Err(e) => {
                warn!("Index {} is unreadable: {e}", self.path.display());
                return IndexLoad::empty(IndexState::Corrupt(e.to_string()));
            }
        };

        let document: JsonValue = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Index {} is not valid JSON: {e}", self.path.display());
                return IndexLoad::empty(IndexState::Corrupt(format!("invalid JSON: {e}")));
            }
        };

        let entries = match document {
            JsonValue::Array(entries) => entries,
            other => {
                warn!(
                    "Index {} has unexpected shape ({}), expected an array",
                    self.path.display(),
                    json_kind(&other)
                );
                return IndexLoad::empty(IndexState::Corrupt(format!(
                    "expected an array, found {}",
                    json_kind(&other)
                )));
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        let mut skipped = 0;
        for (position, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<BadgeRecord>(entry) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping malformed index entry #{position}: {e}");
                }
            }
        }

        debug!("Loaded {} badge record(s) from index", records.len());
        IndexLoad {
            records,
            state: IndexState::Loaded { skipped },
        }
    }

    /// Overwrites the document with `records`. The only mutation primitive.
    pub fn save_all(&self, records: &[BadgeRecord]) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(records)?;
        self.blobs.write(&self.path, json.as_bytes())
    }

    /// Appends one record.
    ///
    /// If the full rewrite fails, a second tier writes directly: the full
    /// list again when the prior load was clean, or just `[record]` when
    /// the prior document was already unusable.
    pub fn append_one(&self, record: &BadgeRecord) -> StoreResult<()> {
        let load = self.load_all();
        let prior_clean = load.is_clean();
        let mut records = load.records;
        records.push(record.clone());

        let primary_err = match self.save_all(&records) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!("Index write failed ({primary_err}); trying fallback write");

        let fallback: &[BadgeRecord] = if prior_clean {
            &records
        } else {
            std::slice::from_ref(record)
        };
        let json = serde_json::to_string_pretty(fallback)?;
        match self.blobs.write_text(&self.path, &json) {
            Ok(()) => {
                info!(
                    "Index saved through fallback write ({} record(s))",
                    fallback.len()
                );
                Ok(())
            }
            Err(fallback_err) => {
                warn!("Index fallback write failed: {fallback_err}");
                Err(fallback_err)
            }
        }
    }

    pub fn remove_document(&self) -> StoreResult<bool> {
        self.blobs.delete(&self.path)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn index_in(dir: &Path) -> MetadataIndex {
        let blobs = BlobStore::new(dir);
        blobs.ensure_root().unwrap();
        MetadataIndex::new(dir.join("metadata.json"), blobs)
    }

    fn record(id: &str, name: &str) -> BadgeRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "animalName": name,
            "description": "",
            "imageRef": format!("/tmp/badge_{id}.png"),
            "discoveredAt": Utc::now(),
        }))
        .unwrap()
    }

    #[test]
    fn missing_document_is_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let load = index_in(dir.path()).load_all();
        assert!(load.records.is_empty());
        assert_eq!(load.state, IndexState::Missing);
    }

    #[test]
    fn non_array_document_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        std::fs::write(index.path(), r#"{"badges": []}"#).unwrap();

        let load = index.load_all();
        assert!(load.records.is_empty());
        assert!(matches!(load.state, IndexState::Corrupt(_)));
    }

    #[test]
    fn garbage_document_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        std::fs::write(index.path(), "[{not json").unwrap();

        assert!(matches!(index.load_all().state, IndexState::Corrupt(_)));
    }

    #[test]
    fn append_preserves_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        index.append_one(&record("a", "Lion")).unwrap();
        index.append_one(&record("b", "Zebra")).unwrap();
        index.append_one(&record("c", "Okapi")).unwrap();

        let ids: Vec<_> = index.load_all().records.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn malformed_entries_are_skipped_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        let good = serde_json::to_value(record("a", "Lion")).unwrap();
        let doc = serde_json::json!([good, {"id": 7}]);
        std::fs::write(index.path(), doc.to_string()).unwrap();

        let load = index.load_all();
        assert_eq!(load.records.len(), 1);
        assert_eq!(load.state, IndexState::Loaded { skipped: 1 });
        assert!(!load.is_clean());
    }

    fn ids(index: &MetadataIndex) -> Vec<String> {
        index.load_all().records.into_iter().map(|r| r.id).collect()
    }

    /// A directory where the temp file goes makes the atomic write fail.
    fn block_atomic_write(index: &MetadataIndex) {
        std::fs::create_dir(index.path().with_extension("tmp")).unwrap();
    }

    #[test]
    fn append_falls_back_to_direct_write_and_keeps_prior_records() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        index.append_one(&record("a", "Lion")).unwrap();

        block_atomic_write(&index);
        assert!(index.save_all(&[]).is_err());
        index.append_one(&record("b", "Zebra")).unwrap();

        assert_eq!(ids(&index), vec!["a", "b"]);
        assert_eq!(index.load_all().state, IndexState::Loaded { skipped: 0 });
    }

    #[test]
    fn append_fallback_over_corrupt_index_writes_only_new_record() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        std::fs::write(index.path(), "[{not json").unwrap();

        block_atomic_write(&index);
        index.append_one(&record("b", "Zebra")).unwrap();

        assert_eq!(ids(&index), vec!["b"]);
    }

    #[test]
    fn append_fallback_after_unclean_load_drops_prior_records() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_in(dir.path());
        let good = serde_json::to_value(record("a", "Lion")).unwrap();
        std::fs::write(index.path(), serde_json::json!([good, {"id": 7}]).to_string()).unwrap();

        block_atomic_write(&index);
        index.append_one(&record("b", "Zebra")).unwrap();

        assert_eq!(ids(&index), vec!["b"]);
    }
}
