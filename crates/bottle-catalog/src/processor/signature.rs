use async_trait::async_trait;

use bottle_catalog_core::{
    ObjectKind, Projection, SignatureProjection, SignatureRow, SignaturesSummary,
};
use bottle_catalog_store::ObjectView;

use super::{ProcessError, ProcessOutcome, Processor};

/// Projects signature summaries after verifying every signature.
///
/// The manifest is the dependency a client can push. The bottle is reached
/// through the manifest, so a bottle that is absent or is not the manifest's
/// bottle is a content error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureProcessor;

impl SignatureProcessor {
    pub const VERSION: u32 = 1;
}

#[async_trait]
impl Processor for SignatureProcessor {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Signature
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        let summary = SignaturesSummary::parse(bytes)?;

        let Some(manifest) = view.find_manifest(&summary.subject_manifest).await? else {
            return Ok(ProcessOutcome::Missing(vec![summary.subject_manifest]));
        };
        let Some(bottle) = view.find_bottle(&summary.subject_bottle).await? else {
            return Err(ProcessError::Validation(format!(
                "could not find bottle {} for signature",
                summary.subject_bottle
            )));
        };
        if bottle.id != manifest.bottle_id {
            return Err(ProcessError::Validation(format!(
                "bottle {} is not the bottle of manifest {}",
                summary.subject_bottle, summary.subject_manifest
            )));
        }

        let mut details = Vec::with_capacity(summary.signatures.len());
        for detail in &summary.signatures {
            detail.verify(&summary.subject_manifest)?;
            details.push(SignatureRow {
                signature_type: detail.signature_type.clone(),
                signature: detail.signature_bytes()?,
                public_key: detail.public_key.clone(),
                fingerprint: detail.fingerprint(),
                valid: true,
                annotations: detail.annotations.clone(),
            });
        }

        Ok(ProcessOutcome::Ready(Projection::Signature(SignatureProjection {
            manifest_id: manifest.id,
            manifest_digest: summary.subject_manifest,
            bottle_id: bottle.id,
            bottle_digest: summary.subject_bottle,
            details,
        })))
    }
}
