//! Sources of bytes for dependencies a destination reports missing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use bottle_catalog_core::{Digest, ObjectKind};

use crate::error::{Result, SyncError};

/// Looks up the bytes of a referenced object.
#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// Bytes of the `kind` object named by `digest`.
    async fn resolve(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>>;
}

/// Resolves from bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    objects: HashMap<Digest, Vec<u8>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` resolvable under `digest`.
    pub fn insert(&mut self, digest: Digest, bytes: Vec<u8>) {
        self.objects.insert(digest, bytes);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, digest: Digest, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(digest, bytes.into());
        self
    }
}

#[async_trait]
impl DependencyResolver for MapResolver {
    async fn resolve(&self, _kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        self.objects
            .get(digest)
            .cloned()
            .ok_or_else(|| SyncError::UnresolvedDependency(digest.clone()))
    }
}

/// Resolves from a local mirror laid out as `<root>/<kind>/<alg>-<hex>`.
#[derive(Debug, Clone)]
pub struct MirrorResolver {
    root: PathBuf,
}

impl MirrorResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DependencyResolver for MirrorResolver {
    async fn resolve(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        let path = self.root.join(kind.as_str()).join(digest.file_name());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SyncError::UnresolvedDependency(digest.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_catalog_core::Algorithm;

    #[tokio::test]
    async fn test_map_resolver() {
        let digest = Digest::compute(Algorithm::Sha256, b"bytes");
        let resolver = MapResolver::new().with(digest.clone(), b"bytes".to_vec());
        assert_eq!(
            resolver.resolve(ObjectKind::Blob, &digest).await.unwrap(),
            b"bytes"
        );

        let other = Digest::compute(Algorithm::Sha256, b"other");
        let err = resolver.resolve(ObjectKind::Blob, &other).await.unwrap_err();
        assert!(matches!(err, SyncError::UnresolvedDependency(d) if d == other));
    }

    #[tokio::test]
    async fn test_mirror_resolver_reads_kind_dir() {
        let dir = tempfile::tempdir().unwrap();
        let digest = Digest::compute(Algorithm::Sha256, b"bottle");
        std::fs::create_dir_all(dir.path().join("bottle")).unwrap();
        std::fs::write(dir.path().join("bottle").join(digest.file_name()), b"bottle").unwrap();

        let resolver = MirrorResolver::new(dir.path());
        assert_eq!(
            resolver.resolve(ObjectKind::Bottle, &digest).await.unwrap(),
            b"bottle"
        );
        assert!(matches!(
            resolver.resolve(ObjectKind::Blob, &digest).await,
            Err(SyncError::UnresolvedDependency(_))
        ));
    }
}
