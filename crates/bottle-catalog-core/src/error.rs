//! Error types for the bottle catalog core.

use thiserror::Error;

/// Errors raised while parsing or validating catalog objects.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The digest names a hash algorithm the catalog does not support.
    #[error("unsupported digest algorithm: {0}")]
    UnknownAlgorithm(String),

    /// The digest string is not `<algorithm>:<lowercase hex>`.
    #[error("invalid digest {0:?}")]
    InvalidDigest(String),

    /// The object kind is not one of blob, bottle, manifest, event or signature.
    #[error("unknown object kind: {0}")]
    UnknownKind(String),

    /// The payload could not be decoded.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// The payload decoded but violates the schema or a cross-field rule.
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },

    /// A signature failed cryptographic verification.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The signature envelope format is recognised but not supported.
    #[error("unsupported signature format: {0}")]
    UnsupportedSignature(String),
}

impl CoreError {
    pub(crate) fn malformed(what: &'static str, reason: impl ToString) -> Self {
        CoreError::Malformed {
            what,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(what: &'static str, reason: impl ToString) -> Self {
        CoreError::Invalid {
            what,
            reason: reason.to_string(),
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
