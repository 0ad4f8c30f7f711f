//! Filesystem blob storage under the collection root.
//!
//! Blobs are plain files named by the caller; the store only guarantees
//! that a successful write leaves a complete file behind (write to a temp
//! file, sync, rename).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a blob named `name` directly under the root.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates the root directory if it is missing. Idempotent.
    pub fn ensure_root(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| StoreError::write(&self.root, e))
    }

    /// Writes `bytes` to `path`, replacing any previous content.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::write(parent, e))?;
        }

        let temp_path = path.with_extension("tmp");
        let result = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp_path, path));

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::write(path, e));
        }
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    /// Direct, non-atomic text write. Used only as the fallback tier.
    pub fn write_text(&self, path: &Path, text: &str) -> StoreResult<()> {
        fs::write(path, text.as_bytes()).map_err(|e| StoreError::write(path, e))
    }

    pub fn copy_from(&self, source: &Path, dest: &Path) -> StoreResult<u64> {
        fs::copy(source, dest).map_err(|e| StoreError::read(source, e))
    }

    pub fn read(&self, path: &Path) -> StoreResult<Vec<u8>> {
        fs::read(path).map_err(|e| StoreError::read(path, e))
    }

    pub fn read_to_string(&self, path: &Path) -> StoreResult<String> {
        fs::read_to_string(path).map_err(|e| StoreError::read(path, e))
    }

    /// Never fails; any resolution error reads as "absent".
    pub fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }

    /// Removes the blob at `path`.
    ///
    /// Returns `Ok(true)` if deleted, `Ok(false)` if it did not exist.
    /// Callers treat errors as warnings, not as failure of the enclosing
    /// operation.
    pub fn delete(&self, path: &Path) -> StoreResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::write(path, e)),
        }
    }

    /// Names of the entries directly under the root.
    pub fn list_children(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::read(&self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => match entry.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(raw) => warn!("Skipping non UTF-8 entry {:?} in {}", raw, self.root.display()),
                },
                Err(e) => warn!("Error reading entry in {}: {e}", self.root.display()),
            }
        }
        Ok(names)
    }

    /// Size in bytes, or 0 when the path does not resolve.
    pub fn size_of(&self, path: &Path) -> u64 {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}
