//! In-process transport over a [`Catalog`].
//!
//! Lets a [`SyncClient`](bottle_catalog_sync::SyncClient) push into or mirror
//! from a local catalog exactly as it would a remote server.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bottle_catalog_core::{Digest, ListEntry, ObjectKind};
use bottle_catalog_store::Store;
use bottle_catalog_sync::{PutOutcome, SyncError, Transport};

use crate::catalog::Catalog;
use crate::content::DeclaredDigest;
use crate::error::CatalogError;
use crate::pipeline::IngestResult;

/// A [`Transport`] that ingests straight into a catalog.
pub struct LocalTransport<S: Store> {
    name: String,
    catalog: Arc<Catalog<S>>,
}

impl<S: Store> LocalTransport<S> {
    pub fn new(name: impl Into<String>, catalog: Arc<Catalog<S>>) -> Self {
        Self {
            name: name.into(),
            catalog,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog<S>> {
        &self.catalog
    }

    fn rejected(&self, status: u16, e: CatalogError) -> SyncError {
        SyncError::Rejected {
            endpoint: self.name.clone(),
            status,
            message: e.to_string(),
        }
    }

    fn map_error(&self, e: CatalogError) -> SyncError {
        match e {
            CatalogError::DigestMismatch { .. } => SyncError::DigestMismatch(e.to_string()),
            CatalogError::Validation(_) | CatalogError::UnknownAlgorithm(_) => {
                self.rejected(400, e)
            }
            CatalogError::Cancelled => SyncError::Cancelled,
            other => self.rejected(500, other),
        }
    }
}

#[async_trait]
impl<S: Store> Transport for LocalTransport<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(
        &self,
        kind: ObjectKind,
        bytes: &[u8],
        digest: Option<&Digest>,
    ) -> Result<PutOutcome, SyncError> {
        let declared = match digest {
            Some(d) => DeclaredDigest::Digest(d.clone()),
            None => DeclaredDigest::Default,
        };
        let ingested = self
            .catalog
            .put(kind, bytes, &declared)
            .await
            .map_err(|e| self.map_error(e))?;

        match ingested.result {
            IngestResult::Created => Ok(PutOutcome::Created(ingested.digest)),
            IngestResult::NoOp => Ok(PutOutcome::Unchanged(ingested.digest)),
            IngestResult::Conflict { missing } => {
                Err(SyncError::MissingDependencies { kind, missing })
            }
        }
    }

    async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>, SyncError> {
        match self.catalog.get(kind, digest).await {
            Ok(Some(stored)) => Ok(stored.bytes),
            Ok(None) => Err(SyncError::NotFound {
                kind,
                digest: digest.clone(),
            }),
            Err(e) => Err(self.map_error(e)),
        }
    }

    async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>, SyncError> {
        self.catalog
            .list(kind, since, limit)
            .await
            .map_err(|e| self.map_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_catalog_core::Algorithm;
    use bottle_catalog_store::SqliteStore;
    use bottle_catalog_sync::{MapResolver, SyncClient, SyncConfig};

    use crate::catalog::CatalogConfig;

    async fn transport() -> LocalTransport<SqliteStore> {
        let catalog = Catalog::open(SqliteStore::open_memory().unwrap(), CatalogConfig::default())
            .await
            .unwrap();
        LocalTransport::new("local", Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_put_outcomes() {
        let transport = transport().await;
        let created = transport.put(ObjectKind::Blob, b"x", None).await.unwrap();
        assert!(matches!(created, PutOutcome::Created(_)));
        let unchanged = transport.put(ObjectKind::Blob, b"x", None).await.unwrap();
        assert_eq!(unchanged.digest(), created.digest());
        assert!(matches!(unchanged, PutOutcome::Unchanged(_)));

        let wrong = Digest::compute(Algorithm::Sha256, b"y");
        let err = transport
            .put(ObjectKind::Blob, b"x", Some(&wrong))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::DigestMismatch(_)));
    }

    #[tokio::test]
    async fn test_validation_is_rejected_400() {
        let transport = transport().await;
        let err = transport
            .put(ObjectKind::Bottle, b"not json", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_send_bottle_pushes_artifact() {
        let client = SyncClient::new(transport().await, SyncConfig::default());
        let artifact = Digest::compute(Algorithm::Sha256, b"readme");
        let bottle = format!(
            r#"{{"publicArtifacts":[{{"name":"readme","path":"README.md","digest":"{artifact}"}}]}}"#
        );
        let resolver = MapResolver::new().with(artifact.clone(), b"readme".to_vec());

        client.send_bottle(bottle.as_bytes(), &resolver).await.unwrap();
        assert_eq!(
            client.get(ObjectKind::Blob, &artifact).await.unwrap(),
            b"readme"
        );
    }
}
