//! Error types for the store module.

use bottle_catalog_core::RowId;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Column encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An alias digest already names different content.
    #[error("alias {alias} already points at content {existing}, refusing to repoint it at {new}")]
    IntegrityViolation {
        alias: String,
        existing: RowId,
        new: RowId,
    },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
