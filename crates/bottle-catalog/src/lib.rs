//! # Bottle Catalog
//!
//! Content-addressed ingest for bottles, their manifests, and the events and
//! signatures that refer to them.
//!
//! ## Overview
//!
//! Every upload goes through the same pipeline:
//!
//! - **Store**: raw bytes are kept once per canonical digest, with every
//!   digest a client used recorded as an alias
//! - **Process**: the kind's [`Processor`] derives a projection, reporting
//!   every referenced object that is not ingested yet
//! - **Project**: the projection is saved, stamped with the processor version
//!
//! When a processor's version is bumped, [`ReprocessSweeper`] rebuilds the
//! projections written by older versions in place. [`Catalog::open`] runs it
//! before returning.
//!
//! ## Key Concepts
//!
//! - **Content**: Immutable. Deduplicated by canonical digest.
//! - **Alias**: A client-facing digest. Never repointed at other content.
//! - **Dependency**: A manifest needs its bottle, events and signatures need
//!   their manifest, bottles need their public artifacts.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bottle_catalog::{Catalog, CatalogConfig, DeclaredDigest, IngestResult};
//! use bottle_catalog::core::ObjectKind;
//! use bottle_catalog::store::SqliteStore;
//!
//! async fn example(bottle: &[u8]) {
//!     let store = SqliteStore::open("catalog.db").unwrap();
//!     let catalog = Catalog::open(store, CatalogConfig::default()).await.unwrap();
//!
//!     let ingested = catalog
//!         .put(ObjectKind::Bottle, bottle, &DeclaredDigest::Default)
//!         .await
//!         .unwrap();
//!
//!     if let IngestResult::Conflict { missing } = ingested.result {
//!         // Upload the missing artifacts, then retry.
//!         println!("missing {missing:?}");
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `bottle_catalog::core` - Digests, kinds, payload types
//! - `bottle_catalog::store` - Storage abstraction and SQLite
//! - `bottle_catalog::sync` - Sync client and mirrors

pub mod catalog;
pub mod content;
pub mod error;
pub mod local;
pub mod pipeline;
pub mod processor;
pub mod sweeper;

// Re-export component crates
pub use bottle_catalog_core as core;
pub use bottle_catalog_store as store;
pub use bottle_catalog_sync as sync;

// Re-export main types for convenience
pub use catalog::{Catalog, CatalogConfig};
pub use content::{ContentStore, DeclaredDigest, StoredContent};
pub use error::{CatalogError, Result};
pub use local::LocalTransport;
pub use pipeline::{IngestConfig, IngestPipeline, IngestResult, Ingested};
pub use processor::{
    default_processors, BlobProcessor, BottleProcessor, EventProcessor, ManifestProcessor,
    ProcessError, ProcessOutcome, Processor, SignatureProcessor,
};
pub use sweeper::{KindSweep, ReprocessSweeper, SweepConfig, SweepReport};
