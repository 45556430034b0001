use async_trait::async_trait;

use bottle_catalog_core::{
    parse_source_uri, ArtifactRow, AuthorRow, BottleConfig, BottleProjection, LabelRow,
    MetricRow, ObjectKind, PartRow, Projection, SourceRow,
};
use bottle_catalog_store::ObjectView;

use super::{note_missing, ProcessError, ProcessOutcome, Processor};

/// Projects bottle configs.
///
/// Public artifacts must already be stored as content; every artifact digest
/// that is not is reported missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BottleProcessor;

impl BottleProcessor {
    pub const VERSION: u32 = 11;
}

#[async_trait]
impl Processor for BottleProcessor {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Bottle
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        let config = BottleConfig::parse(bytes)?;

        let mut missing = Vec::new();
        let mut public_artifacts = Vec::with_capacity(config.public_artifacts.len());
        for artifact in &config.public_artifacts {
            match view.content_for_alias(&artifact.digest).await? {
                Some(content_id) => public_artifacts.push(ArtifactRow {
                    name: artifact.name.clone(),
                    media_type: artifact.media_type.clone(),
                    path: artifact.path.clone(),
                    digest: artifact.digest.clone(),
                    content_id,
                }),
                None => note_missing(&mut missing, &artifact.digest),
            }
        }
        if !missing.is_empty() {
            return Ok(ProcessOutcome::Missing(missing));
        }

        let mut sources = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let target = parse_source_uri(&source.uri)?;
            sources.push(SourceRow {
                name: source.name.clone(),
                uri: source.uri.clone(),
                bottle_digest: target.bottle_digest,
                part_selectors: target.part_selectors,
            });
        }

        let mut metrics = Vec::with_capacity(config.metrics.len());
        for metric in &config.metrics {
            let value: f64 = metric.value.trim().parse().map_err(|_| {
                ProcessError::Validation(format!(
                    "invalid value {:?} for metric {:?}",
                    metric.value, metric.name
                ))
            })?;
            metrics.push(MetricRow {
                name: metric.name.clone(),
                description: metric.description.clone(),
                value,
            });
        }

        let projection = BottleProjection {
            api_version: config.api_version,
            description: config.description,
            sources,
            authors: config
                .authors
                .into_iter()
                .map(|a| AuthorRow {
                    name: a.name,
                    url: a.url,
                    email: a.email,
                })
                .collect(),
            metrics,
            public_artifacts,
            labels: config
                .labels
                .into_iter()
                .map(|(key, value)| LabelRow {
                    numeric_value: value.trim().parse().unwrap_or(f64::NAN),
                    key,
                    value,
                })
                .collect(),
            annotations: config.annotations.into_iter().collect(),
            deprecates: config.deprecates,
            parts: config
                .parts
                .into_iter()
                .map(|p| PartRow {
                    name: p.name,
                    size: p.size,
                    digest: p.digest,
                    labels: p.labels,
                })
                .collect(),
        };
        Ok(ProcessOutcome::Ready(Projection::Bottle(projection)))
    }
}
