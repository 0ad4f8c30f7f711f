//! Interfaces of the remote services the discovery pipeline depends on.
//!
//! The services themselves live outside this crate. Hosts implement these
//! traits over whatever transport they use; errors must be mapped onto
//! [`RemoteError`] so the pipeline can tell timeouts from server errors
//! from malformed responses.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::badge_model::OriginalPhoto;
use crate::error::RemoteError;

/// A photo handed to the pipeline by the camera layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Photo {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Photo {
    /// The same photo as an original-photo source for the store.
    pub fn as_original(&self) -> OriginalPhoto {
        match self {
            Photo::File(path) => OriginalPhoto::File(path.clone()),
            Photo::Bytes(bytes) => OriginalPhoto::Bytes(bytes.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub name: String,
    pub description: String,
}

impl Identification {
    /// Trims both fields and rejects an empty name or description.
    pub fn validated(self) -> Result<Self, RemoteError> {
        let name = self.name.trim().to_string();
        let description = self.description.trim().to_string();
        if name.is_empty() || description.is_empty() {
            return Err(RemoteError::malformed(
                "identification is missing a name or description",
            ));
        }
        Ok(Self { name, description })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedBadge {
    pub image: Vec<u8>,
    /// Passed through to the stored record untouched.
    pub extra: Option<JsonValue>,
}

#[async_trait]
pub trait AnimalIdentifier: Send + Sync {
    async fn identify(&self, photo: &Photo) -> Result<Identification, RemoteError>;
}

#[async_trait]
pub trait BadgeGenerator: Send + Sync {
    async fn generate(&self, animal_name: &str) -> Result<GeneratedBadge, RemoteError>;
}
