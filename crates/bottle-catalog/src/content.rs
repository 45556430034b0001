//! Deduplicating content storage.

use std::sync::Arc;

use bottle_catalog_core::{Algorithm, Digest, RowId};
use bottle_catalog_store::Store;

use crate::error::{CatalogError, Result};

/// How a client named the bytes it uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredDigest {
    /// A full digest; verified against the bytes.
    Digest(Digest),
    /// Only an algorithm; the digest is computed.
    Algorithm(Algorithm),
    /// Nothing; the configured default algorithm is used.
    Default,
}

/// A content record and the alias it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub content_id: RowId,
    /// The deduplication key.
    pub canonical: Digest,
    /// The declared or computed alias.
    pub digest: Digest,
    /// True when this call created the content record.
    pub created: bool,
}

/// Stores raw bytes once per canonical digest and records every alias
/// clients use for them.
pub struct ContentStore<S> {
    store: Arc<S>,
    default_algorithm: Algorithm,
}

impl<S: Store> ContentStore<S> {
    pub fn new(store: Arc<S>, default_algorithm: Algorithm) -> Self {
        Self {
            store,
            default_algorithm,
        }
    }

    /// Store `bytes` and record the alias they were named by.
    ///
    /// A declared digest that does not match the bytes is rejected before
    /// anything is written.
    pub async fn store_and_alias(&self, bytes: &[u8], declared: &DeclaredDigest) -> Result<StoredContent> {
        let digest = match declared {
            DeclaredDigest::Digest(declared) => {
                let computed = declared.algorithm().hash(bytes);
                if computed != *declared {
                    return Err(CatalogError::DigestMismatch {
                        declared: declared.clone(),
                        computed,
                    });
                }
                computed
            }
            DeclaredDigest::Algorithm(alg) => alg.hash(bytes),
            DeclaredDigest::Default => self.default_algorithm.hash(bytes),
        };

        let canonical = Digest::canonical(bytes);
        let content = self.store.upsert_content(&canonical, bytes).await?;
        let alias = self.store.upsert_alias(content.id(), &digest).await?;

        tracing::debug!(
            %digest,
            %canonical,
            content_id = content.id(),
            new_content = content.is_inserted(),
            new_alias = alias.is_inserted(),
            "stored content"
        );

        Ok(StoredContent {
            content_id: content.id(),
            canonical,
            digest,
            created: content.is_inserted(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_catalog_store::{ObjectView, SqliteStore};

    fn content_store() -> (Arc<SqliteStore>, ContentStore<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        (store.clone(), ContentStore::new(store, Algorithm::Sha256))
    }

    #[tokio::test]
    async fn test_same_bytes_one_record() {
        let (store, content) = content_store();
        let first = content
            .store_and_alias(b"data", &DeclaredDigest::Default)
            .await
            .unwrap();
        let second = content
            .store_and_alias(b"data", &DeclaredDigest::Algorithm(Algorithm::Sha512))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.content_id, second.content_id);
        assert_eq!(first.canonical, second.canonical);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.contents, 1);
        assert_eq!(stats.aliases, 2);
    }

    #[tokio::test]
    async fn test_declared_digest_verified() {
        let (store, content) = content_store();
        let wrong = Digest::compute(Algorithm::Sha256, b"other");
        let err = content
            .store_and_alias(b"data", &DeclaredDigest::Digest(wrong))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DigestMismatch { .. }));
        assert_eq!(store.stats().await.unwrap().contents, 0);

        let right = Digest::compute(Algorithm::Blake3, b"data");
        let stored = content
            .store_and_alias(b"data", &DeclaredDigest::Digest(right.clone()))
            .await
            .unwrap();
        assert_eq!(stored.digest, right);
        assert_eq!(
            store.content_for_alias(&right).await.unwrap(),
            Some(stored.content_id)
        );
    }

    #[tokio::test]
    async fn test_default_algorithm() {
        let (_, content) = content_store();
        let stored = content
            .store_and_alias(b"data", &DeclaredDigest::Default)
            .await
            .unwrap();
        assert_eq!(stored.digest, Digest::compute(Algorithm::Sha256, b"data"));
    }
}
