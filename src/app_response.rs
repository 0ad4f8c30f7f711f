use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::error::StoreError;

/// JSON envelope returned across the FFI boundary.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum AppResponse {
    StorageError(String),
    SerializationError(String),
    EncodingError(String),
    NotFound(String),
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::StorageError(msg) => write!(f, "Storage error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::EncodingError(msg) => write!(f, "Encoding error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<StoreError> for AppResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppResponse::NotFound(what),
            StoreError::Encoding(msg) => AppResponse::EncodingError(msg),
            StoreError::Serialization(e) => AppResponse::from(e),
            StoreError::InvalidConfig(msg) => AppResponse::BadRequest(msg),
            other => AppResponse::StorageError(other.to_string()),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    /// Serializes `value` into an `Ok` payload.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => AppResponse::from(e),
        }
    }
}
