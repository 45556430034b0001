//! The sync client: cascading push, get and list against one destination.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use bottle_catalog_core::{Digest, ListEntry, ObjectKind};

use crate::error::{Result, SyncError};
use crate::resolver::DependencyResolver;
use crate::transport::{PutOutcome, Transport};

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size for listing and mirroring.
    pub batch_size: usize,
    /// Skip objects whose dependencies are missing instead of aborting a
    /// bulk upload.
    pub skip_invalid: bool,
    /// Timeout for a single request to the destination.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            skip_invalid: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Counts from a bulk upload or download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Objects newly created at the destination, or written to the mirror.
    pub transferred: usize,
    /// Objects the destination already had.
    pub unchanged: usize,
    /// Objects skipped because their dependencies were missing.
    pub skipped: usize,
    /// List pages fetched.
    pub pages: usize,
}

impl std::ops::AddAssign for TransferReport {
    fn add_assign(&mut self, other: Self) {
        self.transferred += other.transferred;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.pages += other.pages;
    }
}

type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<PutOutcome>> + Send + 'a>>;

/// A client for one catalog destination.
///
/// Every request is bounded by the configured timeout and abandoned when the
/// client's cancellation token fires.
pub struct SyncClient<T> {
    transport: T,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl<T: Transport> SyncClient<T> {
    pub fn new(transport: T, config: SyncConfig) -> Self {
        Self {
            transport,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon in-flight and future requests when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Name of the destination.
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a request under the timeout and cancellation token.
    async fn call<F, R>(&self, request: F) -> Result<R>
    where
        F: Future<Output = Result<R>> + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.config.request_timeout, request) => {
                result.map_err(|_| SyncError::Timeout(format!(
                    "{} did not answer within {:?}",
                    self.transport.name(),
                    self.config.request_timeout
                )))?
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Push Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload one object without resolving dependencies.
    pub async fn put(
        &self,
        kind: ObjectKind,
        bytes: &[u8],
        digest: Option<&Digest>,
    ) -> Result<PutOutcome> {
        self.call(self.transport.put(kind, bytes, digest)).await
    }

    /// Upload an object, pushing whatever it references first if the
    /// destination reports it missing.
    ///
    /// Missing dependencies are resolved through `resolver` and sent one
    /// kind down (recursively, so a gap several levels deep is closed in one
    /// call). The object is then retried exactly once; a second gap is
    /// [`SyncError::CascadeFailed`].
    pub fn send<'a>(
        &'a self,
        kind: ObjectKind,
        bytes: &'a [u8],
        digest: Option<&'a Digest>,
        resolver: &'a dyn DependencyResolver,
    ) -> SendFuture<'a> {
        Box::pin(async move {
            let missing = match self.put(kind, bytes, digest).await {
                Err(SyncError::MissingDependencies { missing, .. }) => missing,
                other => return other,
            };
            let Some(dependency_kind) = kind.dependency() else {
                return Err(SyncError::CascadeFailed { kind, missing });
            };

            tracing::debug!(
                %kind,
                dependency = %dependency_kind,
                missing = missing.len(),
                destination = self.name(),
                "cascading"
            );
            for dependency in &missing {
                let dependency_bytes = resolver.resolve(dependency_kind, dependency).await?;
                self.send(dependency_kind, &dependency_bytes, Some(dependency), resolver)
                    .await?;
            }

            match self.put(kind, bytes, digest).await {
                Err(SyncError::MissingDependencies { missing, .. }) => {
                    Err(SyncError::CascadeFailed { kind, missing })
                }
                other => other,
            }
        })
    }

    pub async fn send_blob(&self, bytes: &[u8]) -> Result<PutOutcome> {
        self.put(ObjectKind::Blob, bytes, None).await
    }

    /// Send a bottle, pushing missing public artifacts as blobs.
    pub async fn send_bottle(
        &self,
        bytes: &[u8],
        resolver: &dyn DependencyResolver,
    ) -> Result<PutOutcome> {
        self.send(ObjectKind::Bottle, bytes, None, resolver).await
    }

    /// Send a manifest, pushing its bottle if missing.
    pub async fn send_manifest(
        &self,
        bytes: &[u8],
        resolver: &dyn DependencyResolver,
    ) -> Result<PutOutcome> {
        self.send(ObjectKind::Manifest, bytes, None, resolver).await
    }

    /// Send an event, pushing its manifest (and that manifest's bottle) if
    /// missing.
    pub async fn send_event(
        &self,
        bytes: &[u8],
        resolver: &dyn DependencyResolver,
    ) -> Result<PutOutcome> {
        self.send(ObjectKind::Event, bytes, None, resolver).await
    }

    /// Send a signature summary, pushing its manifest if missing.
    pub async fn send_signature(
        &self,
        bytes: &[u8],
        resolver: &dyn DependencyResolver,
    ) -> Result<PutOutcome> {
        self.send(ObjectKind::Signature, bytes, None, resolver).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Download the raw bytes of an object.
    pub async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        self.call(self.transport.get(kind, digest)).await
    }

    /// Objects of `kind` created after `since`, at most `limit`.
    pub async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>> {
        self.call(self.transport.list(kind, since, limit)).await
    }
}
