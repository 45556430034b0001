use async_trait::async_trait;

use bottle_catalog_core::{Event, EventProjection, ObjectKind, Projection};
use bottle_catalog_store::ObjectView;

use super::{ProcessError, ProcessOutcome, Processor};

/// Projects push/pull events, copying the manifest's bottle onto the row.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventProcessor;

impl EventProcessor {
    pub const VERSION: u32 = 3;
}

#[async_trait]
impl Processor for EventProcessor {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Event
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        let event = Event::parse(bytes)?;
        let (Some(manifest_digest), Some(timestamp)) = (event.manifest_digest, event.timestamp)
        else {
            return Err(ProcessError::Validation(
                "event requires manifestDigest and timestamp".into(),
            ));
        };

        let Some(manifest) = view.find_manifest(&manifest_digest).await? else {
            return Ok(ProcessOutcome::Missing(vec![manifest_digest]));
        };

        Ok(ProcessOutcome::Ready(Projection::Event(EventProjection {
            manifest_id: manifest.id,
            manifest_digest,
            bottle_id: manifest.bottle_id,
            bottle_digest: manifest.bottle_digest,
            action: event.action.map(|a| a.as_str().to_string()),
            repository: event.repository,
            tag: event.tag,
            auth_required: event.auth_required,
            bandwidth: event.bandwidth,
            timestamp,
            username: event.username,
        })))
    }
}
