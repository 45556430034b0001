//! # Bottle Catalog Sync
//!
//! Client side of catalog replication: pushing objects with their
//! dependencies, reading them back, and mirroring whole catalogs to disk.
//!
//! ## Overview
//!
//! A catalog only accepts an object once everything it references is
//! present. When a push is refused for missing dependencies, the
//! [`SyncClient`] resolves the missing digests through a
//! [`DependencyResolver`], pushes them one kind down, and retries once.
//!
//! ## Key Properties
//!
//! - **Idempotent**: re-pushing an object the destination has is a no-op
//! - **Bounded**: each level of the dependency chain is retried exactly once
//! - **Resumable**: mirror downloads checkpoint after every page
//! - **Fan-out**: [`MultiClient`] writes to several destinations in parallel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use bottle_catalog_sync::{HttpTransport, MapResolver, SyncClient, SyncConfig};
//!
//! async fn example(event: &[u8]) -> bottle_catalog_sync::Result<()> {
//!     let transport = HttpTransport::new("http://localhost:8100", Duration::from_secs(30))?;
//!     let client = SyncClient::new(transport, SyncConfig::default());
//!
//!     // Bytes of anything the event may need pushed first.
//!     let resolver = MapResolver::new();
//!     client.send_event(event, &resolver).await?;
//!
//!     // Mirror everything into ./mirror, resuming from the last checkpoint.
//!     client.download_all("mirror".as_ref(), None, true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Mirror Layout
//!
//! ```text
//! mirror/
//!   blob/
//!     index.csv        sha256-<hex>,sha256,blake3
//!     index.latest     2024-01-02T03:04:05.123456789Z
//!     sha256-<hex>
//!   bottle/
//!   manifest/
//!   event/
//!   signature/
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod mirror;
pub mod multi;
pub mod resolver;
pub mod transport;

pub use client::{SyncClient, SyncConfig, TransferReport};
pub use error::{Result, SyncError};
pub use http::{HttpTransport, CONTENT_DIGEST_HEADER};
pub use mirror::{IndexRow, INDEX_FILE, LATEST_FILE};
pub use multi::MultiClient;
pub use resolver::{DependencyResolver, MapResolver, MirrorResolver};
pub use transport::{memory::MemoryTransport, PutOutcome, Transport};
