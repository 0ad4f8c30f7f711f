//! The record store: badge images and the metadata index kept in one
//! directory and managed together.
//!
//! The store is the only writer of its root directory. Every mutating
//! operation runs under one internal lock, so the index's load-modify-save
//! cycle never interleaves with another mutation from this process.
//!
//! Consistency is best effort. Saving writes the image blob before the index
//! entry, so a failure can leave an unreferenced blob but never an index
//! entry pointing at nothing. Index entries whose image vanished later are
//! dropped by [`BadgeStore::repair`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::badge_model::{
    BadgeAppearance, BadgeCollection, BadgeRecord, BlobEncoding, OriginalPhoto, RepairReport,
    StorageStats,
};
use crate::blob_store::BlobStore;
use crate::config::StoreConfig;
use crate::encoding::{check_image, decode_base64, encode_image};
use crate::error::{StoreError, StoreResult};
use crate::metadata_index::{IndexLoad, IndexState, MetadataIndex};

const INTEGRITY_CHECK_FILE: &str = "integrity_check.txt";
const INTEGRITY_CHECK_DATA: &[u8] = b"test_data";

/// Everything needed to create one badge.
#[derive(Debug, Clone, Default)]
pub struct NewBadge<'a> {
    pub animal_name: &'a str,
    pub description: &'a str,
    pub image: &'a [u8],
    pub original_photo: Option<&'a OriginalPhoto>,
    pub additional_data: Option<JsonValue>,
    pub appearance: BadgeAppearance,
}

pub struct BadgeStore {
    config: StoreConfig,
    blobs: BlobStore,
    index: MetadataIndex,
    write_lock: Mutex<()>,
}

impl BadgeStore {
    /// Opens (creating if needed) the collection described by `config`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let blobs = BlobStore::new(&config.root_dir);
        blobs.ensure_root()?;
        let index = MetadataIndex::new(config.index_path(), blobs.clone());
        info!("Badge store opened at {}", config.root_dir.display());
        Ok(Self {
            config,
            blobs,
            index,
            write_lock: Mutex::new(()),
        })
    }

    pub fn open_at(root_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open(StoreConfig::new(root_dir))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        self.blobs.root()
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a new badge.
    ///
    /// The caller must already have checked that no badge with this animal
    /// name exists; this function does not check again.
    pub fn save_badge(
        &self,
        animal_name: &str,
        description: &str,
        image: &[u8],
        original_photo: Option<&OriginalPhoto>,
        additional_data: Option<JsonValue>,
    ) -> StoreResult<BadgeRecord> {
        self.save_new_badge(NewBadge {
            animal_name,
            description,
            image,
            original_photo,
            additional_data,
            appearance: BadgeAppearance::default(),
        })
    }

    pub fn save_new_badge(&self, badge: NewBadge<'_>) -> StoreResult<BadgeRecord> {
        self.save_new_badge_with_id(Uuid::new_v4().to_string(), badge)
    }

    /// Saves under a caller-chosen id. The id must not be in use.
    pub(crate) fn save_new_badge_with_id(
        &self,
        id: String,
        badge: NewBadge<'_>,
    ) -> StoreResult<BadgeRecord> {
        let _guard = self.lock();
        info!("Saving badge for {}", badge.animal_name);

        check_image(badge.image)?;
        self.blobs.ensure_root()?;

        let image_ref = self.blobs.path_for(&self.config.image_file_name(&id));
        let image_encoding = self.write_image_blob(&image_ref, badge.image)?;

        let original_photo_ref = badge
            .original_photo
            .and_then(|photo| self.store_original_photo(&id, photo));

        let NewBadge {
            animal_name,
            description,
            additional_data,
            appearance,
            ..
        } = badge;

        let record = BadgeRecord {
            id,
            animal_name: animal_name.to_string(),
            description: description.to_string(),
            image_ref,
            discovered_at: Utc::now(),
            original_photo_ref,
            additional_data,
            image_encoding,
            badge_type: appearance.badge_type,
            badge_tier: appearance.badge_tier,
            category: appearance.category,
            overlay_text: appearance.overlay_text,
            special_icon: appearance.special_icon,
        };

        if let Err(e) = self.index.append_one(&record) {
            warn!(
                "Index update failed for badge {}; {} is now unreferenced: {e}",
                record.id,
                record.image_ref.display()
            );
            return Err(e);
        }

        info!("Badge {} saved for {}", record.id, record.animal_name);
        Ok(record)
    }

    /// Binary write first; if the medium rejects it, the validated base64
    /// text goes to the same path instead.
    fn write_image_blob(&self, path: &Path, image: &[u8]) -> StoreResult<BlobEncoding> {
        match self.blobs.write(path, image) {
            Ok(()) => Ok(BlobEncoding::Binary),
            Err(primary) => {
                warn!("Binary image write failed ({primary}); falling back to base64 text");
                let encoded = encode_image(image)?;
                self.blobs.write_text(path, &encoded)?;
                warn!("Image {} stored as base64 text", path.display());
                Ok(BlobEncoding::Base64Text)
            }
        }
    }

    /// Failure here is not fatal: the badge is kept without its photo.
    fn store_original_photo(&self, id: &str, photo: &OriginalPhoto) -> Option<PathBuf> {
        let dest = self.blobs.path_for(&self.config.photo_file_name(id));
        let result = match photo {
            OriginalPhoto::File(source) => self.blobs.copy_from(source, &dest).map(|_| ()),
            OriginalPhoto::Bytes(bytes) => self.blobs.write(&dest, bytes),
            OriginalPhoto::Base64(text) => match decode_base64(text) {
                Ok(bytes) => self.blobs.write(&dest, &bytes).or_else(|e| {
                    warn!("Binary photo write failed ({e}); storing base64 text");
                    self.blobs.write_text(&dest, text)
                }),
                Err(e) => {
                    warn!("Original photo is not valid base64 ({e}); storing as text");
                    self.blobs.write_text(&dest, text)
                }
            },
        };

        match result {
            Ok(()) => {
                debug!("Original photo stored at {}", dest.display());
                Some(dest)
            }
            Err(e) => {
                warn!("Could not store original photo for badge {id}: {e}");
                None
            }
        }
    }

    /// Every badge, in insertion order. Never fails: an unreadable index is
    /// an empty collection.
    pub fn get_all_badges(&self) -> Vec<BadgeRecord> {
        self.index.load_all().records
    }

    /// Loads the index along with a report of its condition.
    pub fn load_index(&self) -> IndexLoad {
        self.index.load_all()
    }

    pub fn index_state(&self) -> IndexState {
        self.index.load_all().state
    }

    pub fn get_badge_by_id(&self, id: &str) -> Option<BadgeRecord> {
        self.get_all_badges().into_iter().find(|badge| badge.id == id)
    }

    /// Case-insensitive; the first match wins.
    pub fn get_badge_by_animal_name(&self, name: &str) -> Option<BadgeRecord> {
        self.get_all_badges()
            .into_iter()
            .find(|badge| badge.matches_name(name))
    }

    pub fn check_if_animal_exists(&self, name: &str) -> bool {
        self.get_all_badges()
            .iter()
            .any(|badge| badge.matches_name(name))
    }

    /// Deletes a badge and its blobs.
    ///
    /// Returns `true` only if the record existed and the updated index was
    /// written. Blob removal failures are logged and do not change the
    /// result.
    pub fn delete_badge(&self, id: &str) -> bool {
        let _guard = self.lock();
        let records = self.index.load_all().records;

        let Some(target) = records.iter().find(|badge| badge.id == id) else {
            debug!("Delete requested for unknown badge {id}");
            return false;
        };

        self.delete_owned_blob(&target.image_ref);
        if let Some(photo) = &target.original_photo_ref {
            self.delete_owned_blob(photo);
        }

        let remaining: Vec<BadgeRecord> = records
            .iter()
            .filter(|badge| badge.id != id)
            .cloned()
            .collect();

        match self.index.save_all(&remaining) {
            Ok(()) => {
                info!("Badge {id} deleted");
                true
            }
            Err(e) => {
                warn!("Could not update index after deleting badge {id}: {e}");
                false
            }
        }
    }

    fn delete_owned_blob(&self, path: &Path) {
        if !path.starts_with(self.blobs.root()) {
            warn!(
                "Refusing to delete {} outside the store root",
                path.display()
            );
            return;
        }
        match self.blobs.delete(path) {
            Ok(true) => debug!("Deleted blob {}", path.display()),
            Ok(false) => warn!("Blob {} was already missing", path.display()),
            Err(e) => warn!("Could not delete blob {}: {e}", path.display()),
        }
    }

    /// Removes every file under the root, index included.
    ///
    /// Each file is attempted regardless of earlier failures. Returns `true`
    /// when the sweep ran and the index document is gone.
    pub fn clear_all_badges(&self) -> bool {
        let _guard = self.lock();
        if let Err(e) = self.blobs.ensure_root() {
            warn!("Cannot prepare store root for clearing: {e}");
            return false;
        }

        let names = match self.blobs.list_children() {
            Ok(names) => names,
            Err(e) => {
                warn!("Cannot list store root: {e}");
                return false;
            }
        };

        let outcomes: Vec<(String, StoreResult<bool>)> = names
            .into_iter()
            .map(|name| {
                let outcome = self.blobs.delete(&self.blobs.path_for(&name));
                (name, outcome)
            })
            .collect();

        let mut removed = 0;
        let mut failed = 0;
        for (name, outcome) in &outcomes {
            match outcome {
                Ok(_) => removed += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Could not remove {name}: {e}");
                }
            }
        }

        info!("Cleared badge store: {removed} file(s) removed, {failed} failure(s)");
        !self.index.exists()
    }

    /// Writes, reads back and deletes a small check file.
    pub fn test_integrity(&self) -> bool {
        if let Err(e) = self.blobs.ensure_root() {
            warn!("Integrity check could not create root: {e}");
            return false;
        }
        let check_file = self.blobs.path_for(INTEGRITY_CHECK_FILE);

        let round_trip = self
            .blobs
            .write(&check_file, INTEGRITY_CHECK_DATA)
            .and_then(|_| self.blobs.read(&check_file));
        let cleanup = self.blobs.delete(&check_file);

        match (round_trip, cleanup) {
            (Ok(data), Ok(_)) => data == INTEGRITY_CHECK_DATA,
            (Err(e), _) | (_, Err(e)) => {
                warn!("Integrity check failed: {e}");
                false
            }
        }
    }

    /// Restores the "every record's image exists" invariant.
    ///
    /// A document that does not parse as an array is deleted. Otherwise
    /// records whose image blob is missing, and entries that are not valid
    /// records, are dropped from the index.
    pub fn repair(&self) -> RepairReport {
        let _guard = self.lock();
        if let Err(e) = self.blobs.ensure_root() {
            warn!("Repair could not prepare store root: {e}");
            return RepairReport::new(false, format!("Repair failed: {e}"));
        }

        if !self.index.exists() {
            return RepairReport::new(false, "No metadata to repair");
        }

        let load = self.index.load_all();
        let skipped = match load.state {
            IndexState::Corrupt(reason) => {
                warn!("Deleting corrupt metadata file: {reason}");
                return match self.index.remove_document() {
                    Ok(_) => RepairReport::new(true, "Removed corrupt metadata file"),
                    Err(e) => {
                        RepairReport::new(false, format!("Could not remove corrupt metadata: {e}"))
                    }
                };
            }
            IndexState::Loaded { skipped } => skipped,
            IndexState::Missing => return RepairReport::new(false, "No metadata to repair"),
        };

        let total = load.records.len();
        let (valid, missing): (Vec<BadgeRecord>, Vec<BadgeRecord>) = load
            .records
            .into_iter()
            .partition(|badge| self.blobs.exists(&badge.image_ref));

        for badge in &missing {
            warn!(
                "Badge {} ({}) has no image at {}",
                badge.id,
                badge.animal_name,
                badge.image_ref.display()
            );
        }

        let dropped = missing.len() + skipped;
        if dropped == 0 {
            return RepairReport::new(false, "Storage is healthy");
        }

        match self.index.save_all(&valid) {
            Ok(()) => {
                info!("Repair dropped {dropped} of {} index entries", total + skipped);
                RepairReport::new(
                    true,
                    format!("Repaired metadata: {dropped} broken badge(s) removed"),
                )
            }
            Err(e) => {
                warn!("Could not write repaired metadata: {e}");
                RepairReport::new(false, format!("Could not write repaired metadata: {e}"))
            }
        }
    }

    /// Counts and sizes; unresolvable blobs count as 0 bytes.
    pub fn get_storage_stats(&self) -> StorageStats {
        let badges = self.get_all_badges();
        let total_size = badges.iter().map(|badge| self.badge_size(badge)).sum();

        StorageStats {
            total_badges: badges.len(),
            total_size,
            last_sync: Utc::now(),
        }
    }

    fn badge_size(&self, badge: &BadgeRecord) -> u64 {
        let image = self.blobs.size_of(&badge.image_ref);
        let photo = badge
            .original_photo_ref
            .as_deref()
            .map(|path| self.blobs.size_of(path))
            .unwrap_or(0);
        image + photo
    }

    pub fn get_badge_collection(&self) -> BadgeCollection {
        let badges = self.get_all_badges();
        BadgeCollection {
            total_count: badges.len(),
            badges,
            last_sync: Utc::now(),
        }
    }

    /// The image path, if the blob is actually on disk.
    pub fn badge_image_path(&self, badge: &BadgeRecord) -> Option<PathBuf> {
        if self.blobs.exists(&badge.image_ref) {
            Some(badge.image_ref.clone())
        } else {
            warn!("Image for badge {} is missing", badge.id);
            None
        }
    }

    /// Image bytes, decoded if the blob was written by the text fallback.
    pub fn read_badge_image(&self, badge: &BadgeRecord) -> StoreResult<Vec<u8>> {
        match badge.image_encoding {
            BlobEncoding::Binary => self.blobs.read(&badge.image_ref),
            BlobEncoding::Base64Text => {
                let text = self.blobs.read_to_string(&badge.image_ref)?;
                decode_base64(&text)
            }
        }
    }

    pub fn read_original_photo(&self, badge: &BadgeRecord) -> StoreResult<Vec<u8>> {
        let path = badge.original_photo_ref.as_deref().ok_or_else(|| {
            StoreError::NotFound(format!("badge {} has no original photo", badge.id))
        })?;
        self.blobs.read(path)
    }
}
