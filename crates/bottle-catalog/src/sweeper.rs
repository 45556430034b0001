//! Reprocessing of objects written by an older processor version.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use bottle_catalog_core::ObjectKind;
use bottle_catalog_store::{ObjectRow, Store, StoreError};

use crate::error::{CatalogError, Result};
use crate::processor::{ProcessOutcome, Processor};

/// Configuration for the sweeper.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Log and count rows that fail to reprocess instead of aborting.
    pub skip_failed: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { skip_failed: true }
    }
}

/// What a sweep of one kind did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSweep {
    pub kind: ObjectKind,
    pub updated: usize,
    /// Rows left stale because reprocessing failed.
    pub failed: usize,
}

/// Report from a sweep over every processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub kinds: Vec<KindSweep>,
}

impl SweepReport {
    pub fn updated(&self) -> usize {
        self.kinds.iter().map(|k| k.updated).sum()
    }

    pub fn failed(&self) -> usize {
        self.kinds.iter().map(|k| k.failed).sum()
    }
}

/// Re-runs processors over rows whose stored version is behind.
///
/// Rows are visited in id order, one at a time. Each update is version
/// checked on its own, so an interrupted sweep resumes safely.
pub struct ReprocessSweeper<S> {
    store: Arc<S>,
    processors: Vec<Arc<dyn Processor>>,
    config: SweepConfig,
}

impl<S: Store> ReprocessSweeper<S> {
    /// Create a sweeper for `processors`, run in the order given.
    pub fn new(store: Arc<S>, processors: Vec<Arc<dyn Processor>>, config: SweepConfig) -> Self {
        Self {
            store,
            processors,
            config,
        }
    }

    /// Sweep every kind, dependencies first.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for processor in &self.processors {
            report.kinds.push(self.reprocess(processor.as_ref(), cancel).await?);
        }
        tracing::info!(
            updated = report.updated(),
            failed = report.failed(),
            "reprocess sweep complete"
        );
        Ok(report)
    }

    /// Bring every row of the processor's kind up to its version.
    pub async fn reprocess(
        &self,
        processor: &dyn Processor,
        cancel: &CancellationToken,
    ) -> Result<KindSweep> {
        let kind = processor.kind();
        let version = processor.version();
        let mut sweep = KindSweep {
            kind,
            updated: 0,
            failed: 0,
        };

        let mut after_id = 0;
        while let Some(row) = self.store.next_stale(kind, version, after_id).await? {
            if cancel.is_cancelled() {
                return Err(CatalogError::Cancelled);
            }
            after_id = row.id;

            match self.reprocess_row(processor, &row).await {
                Ok(()) => {
                    tracing::debug!(
                        %kind,
                        id = row.id,
                        old_version = row.processor_version,
                        new_version = version,
                        "reprocessed"
                    );
                    sweep.updated += 1;
                }
                Err(e) if self.config.skip_failed => {
                    tracing::warn!(%kind, id = row.id, error = %e, "reprocessing failed, row left stale");
                    sweep.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if sweep.updated > 0 || sweep.failed > 0 {
            tracing::info!(%kind, rows = sweep.updated, failed = sweep.failed, "reprocessed kind");
        }
        Ok(sweep)
    }

    async fn reprocess_row(&self, processor: &dyn Processor, row: &ObjectRow) -> Result<()> {
        let bytes = self
            .store
            .content_bytes(row.content_id)
            .await?
            .ok_or_else(|| {
                StoreError::InvalidData(format!("content {} has no bytes", row.content_id))
            })?;

        match processor.process(&bytes, self.store.as_ref()).await? {
            ProcessOutcome::Ready(projection) => {
                self.store
                    .save_projection(row.content_id, processor.version(), &projection)
                    .await?;
                Ok(())
            }
            ProcessOutcome::Missing(missing) => Err(CatalogError::Validation(format!(
                "{} dependencies no longer resolve: {}",
                missing.len(),
                missing
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}
