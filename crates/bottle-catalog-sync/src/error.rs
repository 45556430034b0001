//! Error types for the sync module.

use bottle_catalog_core::{Digest, ObjectKind};
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The destination refused the request.
    #[error("{endpoint} rejected the request ({status}): {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The destination is missing objects this one references.
    #[error("{kind} is missing {} dependencies", .missing.len())]
    MissingDependencies {
        kind: ObjectKind,
        missing: Vec<Digest>,
    },

    /// The destination computed a different digest for the bytes.
    #[error("digest mismatch: {0}")]
    DigestMismatch(String),

    /// The destination has no such object.
    #[error("{kind} {digest} not found")]
    NotFound { kind: ObjectKind, digest: Digest },

    /// The resolver has no bytes for a missing dependency.
    #[error("cannot resolve dependency {0}")]
    UnresolvedDependency(Digest),

    /// Dependencies were still missing after one round of resolution.
    #[error("{kind} still missing {} dependencies after cascading", .missing.len())]
    CascadeFailed {
        kind: ObjectKind,
        missing: Vec<Digest>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A mirror index file could not be parsed.
    #[error("invalid mirror index: {0}")]
    Index(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout waiting for a destination.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Failures from several destinations, each tagged with its name.
    #[error("{} destinations failed", .0.len())]
    Multiple(Vec<(String, SyncError)>),
}

impl SyncError {
    /// Whether this is a dependency gap rather than a hard failure.
    pub fn is_missing_dependencies(&self) -> bool {
        matches!(
            self,
            SyncError::MissingDependencies { .. } | SyncError::CascadeFailed { .. }
        )
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
