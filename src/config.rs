//! Store and pipeline configuration.
//!
//! Every field has a default so a host only has to supply `root_dir`.
//! Hosts that keep a config file can load it with [`StoreConfig::from_toml_str`]
//! or [`StoreConfig::from_toml_file`]:
//!
//! ```toml
//! root_dir = "/data/user/0/app/files/badges"
//!
//! [identify]
//! timeout_ms = 60000
//! max_attempts = 3
//! base_backoff_ms = 2000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::retry::RetryPolicy;

pub const DEFAULT_INDEX_FILE: &str = "metadata.json";
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";
pub const DEFAULT_PHOTO_EXTENSION: &str = "jpg";
pub const DEFAULT_RECENT_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory that holds the index document and every blob.
    pub root_dir: PathBuf,
    pub index_file: String,
    pub image_extension: String,
    pub photo_extension: String,
    /// Identification uploads a photo, so it gets the longer timeout.
    #[serde(deserialize_with = "identify_policy")]
    pub identify: RetryPolicy,
    #[serde(deserialize_with = "generate_policy")]
    pub generate: RetryPolicy,
    /// Trailing window used for the discoveries-per-day average.
    pub recent_window_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("badges"),
            index_file: DEFAULT_INDEX_FILE.to_string(),
            image_extension: DEFAULT_IMAGE_EXTENSION.to_string(),
            photo_extension: DEFAULT_PHOTO_EXTENSION.to_string(),
            identify: default_identify_policy(),
            generate: default_generate_policy(),
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
        }
    }
}

pub fn default_identify_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff_ms: 2000,
        timeout_ms: 60_000,
    }
}

pub fn default_generate_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff_ms: 1000,
        timeout_ms: 30_000,
    }
}

/// A policy section as written in the file. Missing keys fall back to the
/// defaults of the service the section belongs to.
#[derive(Debug, Deserialize)]
struct PolicySection {
    max_attempts: Option<usize>,
    base_backoff_ms: Option<u64>,
    timeout_ms: Option<u64>,
}

impl PolicySection {
    fn over(self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_backoff_ms: self.base_backoff_ms.unwrap_or(base.base_backoff_ms),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
        }
    }
}

fn identify_policy<'de, D>(deserializer: D) -> Result<RetryPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    PolicySection::deserialize(deserializer).map(|section| section.over(default_identify_policy()))
}

fn generate_policy<'de, D>(deserializer: D) -> Result<RetryPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    PolicySection::deserialize(deserializer).map(|section| section.over(default_generate_policy()))
}

impl StoreConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        let config: StoreConfig =
            toml::from_str(raw).map_err(|e| StoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| StoreError::read(path, e))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("root_dir is empty".to_string()));
        }
        for (field, value) in [
            ("index_file", &self.index_file),
            ("image_extension", &self.image_extension),
            ("photo_extension", &self.photo_extension),
        ] {
            if value.trim().is_empty() || value.contains('/') || value.contains('\\') {
                return Err(StoreError::InvalidConfig(format!(
                    "{field} must be a plain non-empty file name component"
                )));
            }
        }
        for (field, policy) in [("identify", &self.identify), ("generate", &self.generate)] {
            if policy.max_attempts == 0 {
                return Err(StoreError::InvalidConfig(format!(
                    "{field}.max_attempts must be at least 1"
                )));
            }
            if policy.timeout_ms == 0 {
                return Err(StoreError::InvalidConfig(format!(
                    "{field}.timeout_ms must be positive"
                )));
            }
        }
        if self.recent_window_days == 0 {
            return Err(StoreError::InvalidConfig(
                "recent_window_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn index_path(&self) -> PathBuf {
        self.root_dir.join(&self.index_file)
    }

    pub fn image_file_name(&self, badge_id: &str) -> String {
        format!("badge_{badge_id}.{}", self.image_extension)
    }

    pub fn photo_file_name(&self, badge_id: &str) -> String {
        format!("original_{badge_id}.{}", self.photo_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            root_dir = "/tmp/dex"

            [generate]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.root_dir, PathBuf::from("/tmp/dex"));
        assert_eq!(config.index_file, "metadata.json");
        assert_eq!(config.generate.max_attempts, 5);
        assert_eq!(config.generate.base_backoff_ms, 1000);
        assert_eq!(config.identify.timeout_ms, 60_000);
    }

    #[test]
    fn partial_identify_section_keeps_identify_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            [identify]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.identify.max_attempts, 5);
        assert_eq!(config.identify.base_backoff_ms, 2000);
        assert_eq!(config.identify.timeout_ms, 60_000);
        assert_eq!(config.generate, default_generate_policy());
    }

    #[test]
    fn generate_section_does_not_borrow_identify_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            [generate]
            base_backoff_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.generate.base_backoff_ms, 250);
        assert_eq!(config.generate.timeout_ms, 30_000);
        assert_eq!(config.identify, default_identify_policy());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = StoreConfig::from_toml_str(
            r#"
            [identify]
            max_attempts = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn blob_names_trace_back_to_id() {
        let config = StoreConfig::new("/tmp/dex");
        assert_eq!(config.image_file_name("abc"), "badge_abc.png");
        assert_eq!(config.photo_file_name("abc"), "original_abc.jpg");
        assert_eq!(config.index_path(), PathBuf::from("/tmp/dex/metadata.json"));
    }
}
