//! Error types for ingest.

use bottle_catalog_core::{CoreError, Digest, ObjectKind, RowId};
use bottle_catalog_store::StoreError;
use thiserror::Error;

use crate::processor::ProcessError;

/// Errors that can occur while ingesting or reprocessing objects.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The client-declared digest does not match the uploaded bytes.
    #[error("digest mismatch: declared {declared}, computed {computed}")]
    DigestMismatch { declared: Digest, computed: Digest },

    /// The declared digest or algorithm is not supported.
    #[error("unsupported digest algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The payload is malformed or inconsistent. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// An alias digest already names different content.
    #[error("integrity violation: alias {alias} points at content {existing}, not {new}")]
    IntegrityViolation {
        alias: String,
        existing: RowId,
        new: RowId,
    },

    /// No processor is registered for the kind.
    #[error("no processor registered for {0}")]
    UnknownKind(ObjectKind),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::IntegrityViolation { alias, existing, new } => {
                CatalogError::IntegrityViolation { alias, existing, new }
            }
            other => CatalogError::Store(other),
        }
    }
}

impl From<CoreError> for CatalogError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownAlgorithm(alg) => CatalogError::UnknownAlgorithm(alg),
            other => CatalogError::Validation(other.to_string()),
        }
    }
}

impl From<ProcessError> for CatalogError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Validation(msg) => CatalogError::Validation(msg),
            ProcessError::Store(e) => e.into(),
        }
    }
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
