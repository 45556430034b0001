use async_trait::async_trait;

use bottle_catalog_core::{Manifest, ManifestProjection, ObjectKind, Projection};
use bottle_catalog_store::ObjectView;

use super::{ProcessError, ProcessOutcome, Processor};

/// Projects OCI manifests onto the bottle named by their config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestProcessor;

impl ManifestProcessor {
    pub const VERSION: u32 = 4;
}

#[async_trait]
impl Processor for ManifestProcessor {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Manifest
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        let manifest = Manifest::parse(bytes)?;
        let bottle_digest = manifest.bottle_digest().clone();

        let Some(bottle) = view.find_bottle(&bottle_digest).await? else {
            return Ok(ProcessOutcome::Missing(vec![bottle_digest]));
        };
        manifest.check_parts(bottle.parts)?;

        Ok(ProcessOutcome::Ready(Projection::Manifest(ManifestProjection {
            bottle_id: bottle.id,
            bottle_digest,
            media_type: manifest.media_type,
            layers: manifest.layers.into_iter().map(|l| l.digest).collect(),
        })))
    }
}
