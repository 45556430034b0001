use async_trait::async_trait;

use bottle_catalog_core::{ObjectKind, Projection};
use bottle_catalog_store::ObjectView;

use super::{ProcessError, ProcessOutcome, Processor};

/// Blobs are opaque; the content record is the whole story.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobProcessor;

impl BlobProcessor {
    pub const VERSION: u32 = 3;
}

#[async_trait]
impl Processor for BlobProcessor {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Blob
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn process(
        &self,
        _bytes: &[u8],
        _view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        Ok(ProcessOutcome::Ready(Projection::Blob))
    }
}
