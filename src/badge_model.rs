//! Data model for the badge collection.
//!
//! A [`BadgeRecord`] is the durable unit of the collection: one record per
//! discovered species, pointing at the image blob (and optionally the
//! user's original photo) stored next to the index document. Records are
//! write-once; nothing in the crate mutates a record after it is indexed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A single discovered animal.
///
/// Field names on disk are camelCase, matching the index document the mobile
/// shell already reads. Documents written by older builds that used
/// `imageBlob` / `originalPhoto` still load.
///
/// # Examples
///
/// ```rust
/// use animal_dex_core::badge_model::BadgeRecord;
///
/// let json = r#"{
///     "id": "6f1c",
///     "animalName": "Lion",
///     "description": "King of the jungle",
///     "imageBlob": "/data/badges/badge_6f1c.png",
///     "discoveredAt": "2024-01-15T10:30:00Z"
/// }"#;
///
/// let record: BadgeRecord = serde_json::from_str(json)?;
/// assert!(record.matches_name("LION"));
/// assert!(record.original_photo_ref.is_none());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeRecord {
    /// Unique across the index; assigned once at creation.
    pub id: String,

    /// Species label from identification. Deduplication key, compared
    /// case-insensitively.
    pub animal_name: String,

    pub description: String,

    /// Path of the badge image blob. The record never embeds image bytes.
    #[serde(alias = "imageBlob")]
    pub image_ref: PathBuf,

    pub discovered_at: DateTime<Utc>,

    #[serde(default, alias = "originalPhoto", skip_serializing_if = "Option::is_none")]
    pub original_photo_ref: Option<PathBuf>,

    /// Opaque payload from badge generation, passed through unexamined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<JsonValue>,

    /// How the image blob was written. Only recorded when the base64-text
    /// fallback was used.
    #[serde(default, skip_serializing_if = "BlobEncoding::is_binary")]
    pub image_encoding: BlobEncoding,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_type: Option<BadgeType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_tier: Option<BadgeTier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_icon: Option<String>,
}

impl BadgeRecord {
    /// Case-insensitive comparison against the deduplication key.
    pub fn matches_name(&self, name: &str) -> bool {
        normalize_name(&self.animal_name) == normalize_name(name)
    }
}

/// Canonical form of an animal name for deduplication.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// On-disk form of an image blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlobEncoding {
    /// Raw image bytes.
    #[default]
    Binary,
    /// Base64 text, written when the binary write failed.
    Base64Text,
}

impl BlobEncoding {
    pub fn is_binary(&self) -> bool {
        matches!(self, BlobEncoding::Binary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeType {
    Standard,
    Odyssey,
    Journey,
    Challenge,
    Scoop,
    Festival,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

/// Presentation-only fields a caller may attach when saving.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeAppearance {
    pub badge_type: Option<BadgeType>,
    pub badge_tier: Option<BadgeTier>,
    pub category: Option<String>,
    pub overlay_text: Option<String>,
    pub special_icon: Option<String>,
}

/// Source of the user's original photo when saving a badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalPhoto {
    /// A file on the device, copied into the store root.
    File(PathBuf),
    /// Base64 text as delivered by the camera layer.
    Base64(String),
    Bytes(Vec<u8>),
}

/// JSON payload accepted by the `save_badge` FFI function.
///
/// ```json
/// {
///   "animalName": "Lion",
///   "description": "King of the jungle",
///   "imageBase64": "iVBORw0KGgo=",
///   "originalPhoto": "/9j/4AAQ",
///   "additionalData": { "seed": 7 },
///   "badgeType": "journey"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveBadgeRequest {
    pub animal_name: String,
    #[serde(default)]
    pub description: String,
    pub image_base64: String,
    /// Base64 text of the user's photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_photo: Option<String>,
    /// Device path of the user's photo, used when `originalPhoto` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_photo_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<JsonValue>,
    #[serde(flatten)]
    pub appearance: BadgeAppearance,
}

impl SaveBadgeRequest {
    pub fn photo_source(&self) -> Option<OriginalPhoto> {
        match (&self.original_photo, &self.original_photo_path) {
            (Some(text), _) => Some(OriginalPhoto::Base64(text.clone())),
            (None, Some(path)) => Some(OriginalPhoto::File(path.clone())),
            (None, None) => None,
        }
    }
}

/// Totals reported by `BadgeStore::get_storage_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_badges: usize,
    /// Bytes across every image and original-photo blob.
    pub total_size: u64,
    pub last_sync: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCollection {
    pub badges: Vec<BadgeRecord>,
    pub total_count: usize,
    pub last_sync: DateTime<Utc>,
}

/// Outcome of `BadgeStore::repair`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub repaired: bool,
    pub message: String,
}

impl RepairReport {
    pub fn new(repaired: bool, message: impl Into<String>) -> Self {
        Self {
            repaired,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binary_encoding_and_empty_options_are_omitted() {
        let record = BadgeRecord {
            id: "1".to_string(),
            animal_name: "Lion".to_string(),
            description: "King of the jungle".to_string(),
            image_ref: PathBuf::from("/tmp/badge_1.png"),
            discovered_at: Utc::now(),
            original_photo_ref: None,
            additional_data: None,
            image_encoding: BlobEncoding::Binary,
            badge_type: Some(BadgeType::Journey),
            badge_tier: None,
            category: None,
            overlay_text: None,
            special_icon: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["animalName"], json!("Lion"));
        assert_eq!(value["imageRef"], json!("/tmp/badge_1.png"));
        assert_eq!(value["badgeType"], json!("journey"));
        assert!(value.get("imageEncoding").is_none());
        assert!(value.get("originalPhotoRef").is_none());
    }

    #[test]
    fn name_match_ignores_case() {
        let record: BadgeRecord = serde_json::from_value(json!({
            "id": "1",
            "animalName": "Red Fox",
            "description": "",
            "imageRef": "/tmp/x.png",
            "discoveredAt": "2024-01-15T10:30:00Z",
            "imageEncoding": "base64Text"
        }))
        .unwrap();

        assert!(record.matches_name("red fox"));
        assert!(!record.matches_name("red"));
        assert_eq!(record.image_encoding, BlobEncoding::Base64Text);
    }

    #[test]
    fn save_request_reads_flattened_appearance() {
        let request: SaveBadgeRequest = serde_json::from_value(json!({
            "animalName": "Lion",
            "imageBase64": "aGk=",
            "originalPhotoPath": "/tmp/capture.jpg",
            "badgeTier": "gold"
        }))
        .unwrap();

        assert_eq!(request.description, "");
        assert_eq!(request.appearance.badge_tier, Some(BadgeTier::Gold));
        assert_eq!(
            request.photo_source(),
            Some(OriginalPhoto::File(PathBuf::from("/tmp/capture.jpg")))
        );
    }
}
