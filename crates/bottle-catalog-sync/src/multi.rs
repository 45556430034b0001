//! Fan-out across several destinations.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use bottle_catalog_core::{Digest, ListEntry, ObjectKind};

use crate::client::{SyncClient, TransferReport};
use crate::error::{Result, SyncError};
use crate::resolver::DependencyResolver;
use crate::transport::{PutOutcome, Transport};

/// Pushes to every destination in parallel and reads from the first that
/// has the object.
///
/// Writes never fail fast: every destination runs to completion and all
/// failures come back together as [`SyncError::Multiple`].
pub struct MultiClient<T> {
    clients: Vec<Arc<SyncClient<T>>>,
}

impl<T: Transport + 'static> MultiClient<T> {
    pub fn new(clients: Vec<SyncClient<T>>) -> Self {
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn clients(&self) -> &[Arc<SyncClient<T>>] {
        &self.clients
    }

    /// Run `op` against every client concurrently, keeping results in client
    /// order.
    async fn fan_out<R, F, Fut>(&self, op: F) -> Result<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(Arc<SyncClient<T>>) -> Fut,
        Fut: std::future::Future<Output = Result<R>> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for (i, client) in self.clients.iter().enumerate() {
            let name = client.name().to_string();
            let fut = op(client.clone());
            tasks.spawn(async move { (i, name, fut.await) });
        }

        let mut results: Vec<Option<R>> = (0..self.clients.len()).map(|_| None).collect();
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, _, Ok(value))) => results[i] = Some(value),
                Ok((_, name, Err(e))) => {
                    tracing::warn!(destination = %name, error = %e, "destination failed");
                    errors.push((name, e));
                }
                Err(e) => errors.push(("task".to_string(), SyncError::Transport(e.to_string()))),
            }
        }

        if errors.is_empty() {
            Ok(results.into_iter().flatten().collect())
        } else {
            Err(SyncError::Multiple(errors))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Push Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload one object to every destination.
    pub async fn put(
        &self,
        kind: ObjectKind,
        bytes: Vec<u8>,
        digest: Option<Digest>,
    ) -> Result<Vec<PutOutcome>> {
        let bytes = Arc::new(bytes);
        self.fan_out(|client| {
            let bytes = bytes.clone();
            let digest = digest.clone();
            async move { client.put(kind, &bytes, digest.as_ref()).await }
        })
        .await
    }

    /// Cascading send of one object to every destination.
    pub async fn send(
        &self,
        kind: ObjectKind,
        bytes: Vec<u8>,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Result<Vec<PutOutcome>> {
        let bytes = Arc::new(bytes);
        self.fan_out(|client| {
            let bytes = bytes.clone();
            let resolver = resolver.clone();
            async move { client.send(kind, &bytes, None, resolver.as_ref()).await }
        })
        .await
    }

    /// Upload a mirror to every destination.
    pub async fn upload_all(&self, root: PathBuf) -> Result<Vec<TransferReport>> {
        let root = Arc::new(root);
        self.fan_out(|client| {
            let root = root.clone();
            async move { client.upload_all(&root).await }
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Bytes of an object from the first destination that has it.
    pub async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        for client in &self.clients {
            match client.get(kind, digest).await {
                Err(SyncError::NotFound { .. }) => continue,
                other => return other,
            }
        }
        Err(SyncError::NotFound {
            kind,
            digest: digest.clone(),
        })
    }

    /// A list page from the first destination that answers.
    pub async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>> {
        let mut last = None;
        for client in &self.clients {
            match client.list(kind, since, limit).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    tracing::warn!(destination = client.name(), error = %e, "list failed");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| SyncError::Transport("no destinations".into())))
    }
}
