//! Error taxonomy for the badge store and the discovery pipeline.

use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by the local badge store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced blob or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Image bytes or a base64 payload could not be validated.
    #[error("encoding failure: {0}")]
    Encoding(String),

    #[error("write failed for {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed for {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("settings store error: {0}")]
    Settings(#[from] lmdb::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Some files under the collection root survived a clear.
    #[error("could not clear every file under {}", .0.display())]
    ClearIncomplete(PathBuf),
}

impl StoreError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Write {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            let path = path.into();
            return StoreError::NotFound(path.display().to_string());
        }
        StoreError::Read {
            path: path.into(),
            source,
        }
    }
}

/// Failure classes reported by the identification and generation services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFailureKind {
    Timeout,
    ServerError,
    MalformedResponse,
}

impl Display for RemoteFailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFailureKind::Timeout => write!(f, "timeout"),
            RemoteFailureKind::ServerError => write!(f, "server error"),
            RemoteFailureKind::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteFailureKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteFailureKind::Timeout, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RemoteFailureKind::ServerError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RemoteFailureKind::MalformedResponse, message)
    }

    /// Timeouts and server errors are worth another attempt; a malformed
    /// response will come back malformed again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            RemoteFailureKind::Timeout | RemoteFailureKind::ServerError
        )
    }
}

/// Pipeline stage a discovery failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStep {
    Identify,
    Generate,
    Persist,
}

impl Display for DiscoveryStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryStep::Identify => write!(f, "identify"),
            DiscoveryStep::Generate => write!(f, "generate"),
            DiscoveryStep::Persist => write!(f, "persist"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not identify the animal: {0}")]
    Identification(#[source] RemoteError),

    #[error("could not generate a badge: {0}")]
    Generation(#[source] RemoteError),

    #[error("could not save the badge: {0}")]
    Persistence(#[source] StoreError),

    /// A blocking store task was cancelled or panicked.
    #[error("store task interrupted: {0}")]
    Interrupted(String),
}

impl DiscoveryError {
    pub fn step(&self) -> DiscoveryStep {
        match self {
            DiscoveryError::Identification(_) => DiscoveryStep::Identify,
            DiscoveryError::Generation(_) => DiscoveryStep::Generate,
            DiscoveryError::Persistence(_) | DiscoveryError::Interrupted(_) => {
                DiscoveryStep::Persist
            }
        }
    }
}
