//! Processors: versioned transformations from raw bytes to projections.
//!
//! A processor never writes. It reads already-ingested objects through an
//! [`ObjectView`] to resolve references and reports every unresolved
//! reference at once, so a client can push all of them before retrying.

mod blob;
mod bottle;
mod event;
mod manifest;
mod signature;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use bottle_catalog_core::{CoreError, Digest, ObjectKind, Projection};
use bottle_catalog_store::{ObjectView, StoreError};

pub use blob::BlobProcessor;
pub use bottle::BottleProcessor;
pub use event::EventProcessor;
pub use manifest::ManifestProcessor;
pub use signature::SignatureProcessor;

/// What a processor made of the bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// A projection ready to be saved.
    Ready(Projection),
    /// Referenced objects that are not ingested yet.
    Missing(Vec<Digest>),
}

/// Processor failures.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The payload is malformed or inconsistent with what it references.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<CoreError> for ProcessError {
    fn from(e: CoreError) -> Self {
        ProcessError::Validation(e.to_string())
    }
}

/// A versioned transformation for one object kind.
#[async_trait]
pub trait Processor: Send + Sync {
    /// The kind this processor handles.
    fn kind(&self) -> ObjectKind;

    /// Bumped whenever the projection this processor derives changes.
    fn version(&self) -> u32;

    /// Derive a projection from `bytes`.
    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError>;
}

/// The processors for every kind, in dependency order.
pub fn default_processors() -> Vec<Arc<dyn Processor>> {
    vec![
        Arc::new(BlobProcessor),
        Arc::new(BottleProcessor),
        Arc::new(ManifestProcessor),
        Arc::new(EventProcessor),
        Arc::new(SignatureProcessor),
    ]
}

/// Push `digest` onto `missing` unless it is already there.
fn note_missing(missing: &mut Vec<Digest>, digest: &Digest) {
    if !missing.contains(digest) {
        missing.push(digest.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_catalog_core::TOPOLOGICAL_ORDER;

    #[test]
    fn test_default_processors_cover_every_kind_in_order() {
        let kinds: Vec<ObjectKind> = default_processors().iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, TOPOLOGICAL_ORDER.to_vec());
    }
}
