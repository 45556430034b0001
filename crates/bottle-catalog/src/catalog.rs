//! The Catalog: ingest and read paths over one store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use bottle_catalog_core::{
    Digest, ListEntry, Location, ObjectKind, SignatureValid, SignatureValidationSummary,
};
use bottle_catalog_store::{Store, StoredObject};

use crate::content::DeclaredDigest;
use crate::error::Result;
use crate::pipeline::{IngestConfig, IngestPipeline, Ingested};
use crate::processor::{default_processors, Processor};
use crate::sweeper::{ReprocessSweeper, SweepConfig, SweepReport};

/// Configuration for the Catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    pub ingest: IngestConfig,
    pub sweep: SweepConfig,
}

/// The main Catalog struct.
///
/// Opening a catalog runs the reprocess sweep to completion, so every
/// projection a caller reads was written by the current processors.
pub struct Catalog<S: Store> {
    store: Arc<S>,
    pipeline: IngestPipeline<S>,
    sweeper: ReprocessSweeper<S>,
}

impl<S: Store> Catalog<S> {
    /// Open a catalog with the default processors.
    pub async fn open(store: S, config: CatalogConfig) -> Result<Self> {
        Self::open_with_processors(store, config, default_processors()).await
    }

    /// Open a catalog with an explicit processor list, in dependency order.
    pub async fn open_with_processors(
        store: S,
        config: CatalogConfig,
        processors: Vec<Arc<dyn Processor>>,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let catalog = Self {
            pipeline: IngestPipeline::with_processors(
                store.clone(),
                config.ingest,
                processors.clone(),
            ),
            sweeper: ReprocessSweeper::new(store.clone(), processors, config.sweep),
            store,
        };
        catalog.reprocess(&CancellationToken::new()).await?;
        Ok(catalog)
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pipeline(&self) -> &IngestPipeline<S> {
        &self.pipeline
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingest Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest an object of `kind`.
    pub async fn put(
        &self,
        kind: ObjectKind,
        bytes: &[u8],
        declared: &DeclaredDigest,
    ) -> Result<Ingested> {
        self.pipeline.put(kind, bytes, declared).await
    }

    /// Bring rows written by older processors up to date.
    pub async fn reprocess(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        self.sweeper.run(cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Raw bytes of an object of `kind` named by `digest`.
    pub async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<StoredObject>> {
        Ok(self.store.get_by_digest(kind, digest).await?)
    }

    /// Objects of `kind` created after `since`, oldest first.
    pub async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>> {
        Ok(self.store.list_since(kind, since, limit).await?)
    }

    /// Signature results recorded for a bottle.
    pub async fn signatures_for_bottle(
        &self,
        bottle: &Digest,
    ) -> Result<Vec<SignatureValidationSummary>> {
        Ok(self.store.signatures_for_bottle(bottle).await?)
    }

    pub async fn bottle_labels(&self, bottle: &Digest) -> Result<BTreeMap<String, String>> {
        Ok(self.store.bottle_labels(bottle).await?)
    }

    /// Bottles that declare `bottle` deprecated.
    pub async fn deprecated_by(&self, bottle: &Digest) -> Result<Vec<Digest>> {
        Ok(self.store.deprecated_by(bottle).await?)
    }

    /// Repositories that events report the bottle was pushed to or pulled from.
    pub async fn locations(&self, bottle: &Digest) -> Result<Vec<Location>> {
        Ok(self.store.locations_for_bottle(bottle).await?)
    }

    /// Signatures over `bottle` made with the key fingerprinted `key`.
    pub async fn signatures_by_key(
        &self,
        bottle: &Digest,
        key: &Digest,
    ) -> Result<Vec<SignatureValid>> {
        Ok(self.store.signatures_by_key(bottle, key).await?)
    }
}
