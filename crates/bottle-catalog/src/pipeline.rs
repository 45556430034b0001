//! The ingest pipeline: store, deduplicate, process, project.

use std::sync::Arc;

use bottle_catalog_core::{Algorithm, Digest, ObjectKind, RowId};
use bottle_catalog_store::Store;

use crate::content::{ContentStore, DeclaredDigest};
use crate::error::{CatalogError, Result};
use crate::processor::{default_processors, ProcessOutcome, Processor};

/// Configuration for ingest.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Alias algorithm used when a client declares none.
    pub default_algorithm: Algorithm,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::DEFAULT,
        }
    }
}

/// What a `put` did with the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    /// The projection was created, or rebuilt by a newer processor.
    Created,
    /// The object was already ingested by the current processor.
    NoOp,
    /// Referenced objects are missing; nothing was projected.
    Conflict { missing: Vec<Digest> },
}

/// The outcome of a `put`, with the content it was stored as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    /// The declared or computed alias digest.
    pub digest: Digest,
    pub content_id: RowId,
    pub result: IngestResult,
}

/// Orchestrates content storage and processing for every PUT.
///
/// Each phase commits on its own. A failure between storing content and
/// saving its projection leaves content without a projection, which the next
/// `put` of the same bytes completes.
pub struct IngestPipeline<S> {
    store: Arc<S>,
    content: ContentStore<S>,
    processors: Vec<Arc<dyn Processor>>,
}

impl<S: Store> IngestPipeline<S> {
    /// Create a pipeline with the default processor for every kind.
    pub fn new(store: Arc<S>, config: IngestConfig) -> Self {
        Self::with_processors(store, config, default_processors())
    }

    /// Create a pipeline with an explicit processor list.
    pub fn with_processors(
        store: Arc<S>,
        config: IngestConfig,
        processors: Vec<Arc<dyn Processor>>,
    ) -> Self {
        Self {
            content: ContentStore::new(store.clone(), config.default_algorithm),
            store,
            processors,
        }
    }

    /// The registered processors.
    pub fn processors(&self) -> &[Arc<dyn Processor>] {
        &self.processors
    }

    /// The processor registered for `kind`.
    pub fn processor(&self, kind: ObjectKind) -> Result<&Arc<dyn Processor>> {
        self.processors
            .iter()
            .find(|p| p.kind() == kind)
            .ok_or(CatalogError::UnknownKind(kind))
    }

    /// Ingest `bytes` as an object of `kind`.
    pub async fn put(
        &self,
        kind: ObjectKind,
        bytes: &[u8],
        declared: &DeclaredDigest,
    ) -> Result<Ingested> {
        let processor = self.processor(kind)?;
        let version = processor.version();

        let stored = self.content.store_and_alias(bytes, declared).await?;
        let ingested = |result| Ingested {
            digest: stored.digest.clone(),
            content_id: stored.content_id,
            result,
        };

        let existing = self.store.find_object(kind, stored.content_id).await?;
        if let Some(row) = existing {
            if row.processor_version >= version {
                tracing::debug!(%kind, digest = %stored.digest, id = row.id, "already current");
                return Ok(ingested(IngestResult::NoOp));
            }
            tracing::debug!(
                %kind,
                digest = %stored.digest,
                id = row.id,
                old_version = row.processor_version,
                new_version = version,
                "reprocessing stale object"
            );
        }

        match processor.process(bytes, self.store.as_ref()).await? {
            ProcessOutcome::Missing(missing) => {
                tracing::debug!(%kind, digest = %stored.digest, missing = missing.len(), "missing dependencies");
                Ok(ingested(IngestResult::Conflict { missing }))
            }
            ProcessOutcome::Ready(projection) => {
                let id = self
                    .store
                    .save_projection(stored.content_id, version, &projection)
                    .await?;
                tracing::debug!(%kind, digest = %stored.digest, id, "ingested");
                Ok(ingested(IngestResult::Created))
            }
        }
    }
}
