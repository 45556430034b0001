//! Transport abstraction for talking to a catalog.
//!
//! A transport carries the three catalog operations: put an object, get one
//! by digest, and list a page of objects by creation time. [`HttpTransport`]
//! speaks to a remote server; other crates provide in-process transports.
//!
//! [`HttpTransport`]: crate::http::HttpTransport

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bottle_catalog_core::{Digest, ListEntry, ObjectKind};

use crate::error::Result;

/// What the destination did with a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// Newly ingested (or reprocessed) under this digest.
    Created(Digest),
    /// Already present and current.
    Unchanged(Digest),
}

impl PutOutcome {
    pub fn digest(&self) -> &Digest {
        match self {
            PutOutcome::Created(d) | PutOutcome::Unchanged(d) => d,
        }
    }
}

/// Transport trait for catalog operations.
///
/// A put whose references are unknown to the destination fails with
/// [`SyncError::MissingDependencies`] carrying every missing digest.
///
/// Implementations must be thread-safe (Send + Sync).
///
/// [`SyncError::MissingDependencies`]: crate::SyncError::MissingDependencies
#[async_trait]
pub trait Transport: Send + Sync {
    /// A name for the destination, used in logs and aggregated errors.
    fn name(&self) -> &str;

    /// Upload an object. With no digest the destination picks the algorithm.
    async fn put(&self, kind: ObjectKind, bytes: &[u8], digest: Option<&Digest>)
        -> Result<PutOutcome>;

    /// Download the raw bytes of an object.
    async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>>;

    /// Objects created after `since`, oldest first, at most `limit`.
    async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn put(
        &self,
        kind: ObjectKind,
        bytes: &[u8],
        digest: Option<&Digest>,
    ) -> Result<PutOutcome> {
        (**self).put(kind, bytes, digest).await
    }

    async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        (**self).get(kind, digest).await
    }

    async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>> {
        (**self).list(kind, since, limit).await
    }
}

/// A simple in-memory catalog for testing.
///
/// Objects are deduplicated by content and may be gated on dependencies with
/// [`MemoryTransport::require`], which is enough to exercise cascading.
pub mod memory {
    use super::*;
    use std::collections::HashMap;

    use chrono::Duration;
    use tokio::sync::Mutex;

    use bottle_catalog_core::Algorithm;

    use crate::error::SyncError;

    #[derive(Debug, Clone)]
    struct MemoryObject {
        kind: ObjectKind,
        canonical: Digest,
        digests: Vec<Digest>,
        bytes: Vec<u8>,
        created_at: DateTime<Utc>,
    }

    #[derive(Default)]
    struct MemoryState {
        objects: Vec<MemoryObject>,
        /// Canonical digest of gated bytes -> digests they reference.
        requires: HashMap<Digest, Vec<Digest>>,
        puts: usize,
    }

    impl MemoryState {
        fn knows(&self, digest: &Digest) -> bool {
            self.objects.iter().any(|o| o.digests.contains(digest))
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        name: String,
        state: Mutex<MemoryState>,
    }

    impl MemoryTransport {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                state: Mutex::new(MemoryState::default()),
            }
        }

        /// Refuse `bytes` until every digest in `dependencies` is present.
        pub async fn require(&self, bytes: &[u8], dependencies: Vec<Digest>) {
            let mut state = self.state.lock().await;
            state.requires.insert(Digest::canonical(bytes), dependencies);
        }

        /// Whether any object is known under `digest`.
        pub async fn contains(&self, digest: &Digest) -> bool {
            self.state.lock().await.knows(digest)
        }

        /// Number of objects of `kind`.
        pub async fn count(&self, kind: ObjectKind) -> usize {
            let state = self.state.lock().await;
            state.objects.iter().filter(|o| o.kind == kind).count()
        }

        /// Number of put calls received, successful or not.
        pub async fn puts(&self) -> usize {
            self.state.lock().await.puts
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn name(&self) -> &str {
            &self.name
        }

        async fn put(
            &self,
            kind: ObjectKind,
            bytes: &[u8],
            digest: Option<&Digest>,
        ) -> Result<PutOutcome> {
            let mut state = self.state.lock().await;
            state.puts += 1;

            let digest = match digest {
                Some(declared) if !declared.verify(bytes) => {
                    return Err(SyncError::DigestMismatch(format!(
                        "declared {declared}, computed {}",
                        declared.algorithm().hash(bytes)
                    )))
                }
                Some(declared) => declared.clone(),
                None => Algorithm::DEFAULT.hash(bytes),
            };
            let canonical = Digest::canonical(bytes);

            if let Some(obj) = state
                .objects
                .iter_mut()
                .find(|o| o.kind == kind && o.canonical == canonical)
            {
                if !obj.digests.contains(&digest) {
                    obj.digests.push(digest.clone());
                    obj.digests.sort();
                }
                return Ok(PutOutcome::Unchanged(digest));
            }

            let missing: Vec<Digest> = state
                .requires
                .get(&canonical)
                .map(|deps| deps.iter().filter(|d| !state.knows(d)).cloned().collect())
                .unwrap_or_default();
            if !missing.is_empty() {
                return Err(SyncError::MissingDependencies { kind, missing });
            }

            let now = Utc::now();
            let created_at = match state.objects.iter().map(|o| o.created_at).max() {
                Some(last) if last >= now => last + Duration::nanoseconds(1),
                _ => now,
            };
            state.objects.push(MemoryObject {
                kind,
                canonical,
                digests: vec![digest.clone()],
                bytes: bytes.to_vec(),
                created_at,
            });
            Ok(PutOutcome::Created(digest))
        }

        async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
            let state = self.state.lock().await;
            state
                .objects
                .iter()
                .find(|o| o.kind == kind && o.digests.contains(digest))
                .map(|o| o.bytes.clone())
                .ok_or_else(|| SyncError::NotFound {
                    kind,
                    digest: digest.clone(),
                })
        }

        async fn list(
            &self,
            kind: ObjectKind,
            since: Option<DateTime<Utc>>,
            limit: usize,
        ) -> Result<Vec<ListEntry>> {
            let state = self.state.lock().await;
            Ok(state
                .objects
                .iter()
                .filter(|o| o.kind == kind && since.map_or(true, |s| o.created_at > s))
                .take(limit)
                .map(|o| ListEntry {
                    created_at: o.created_at,
                    digests: o.digests.clone(),
                    data: o.bytes.clone(),
                })
                .collect())
        }
    }
}
