//! # Bottle Catalog Store
//!
//! Storage for the catalog: deduplicated content, alias digests and the
//! relational projections processors derive from content.
//!
//! ## Overview
//!
//! Processors read through [`ObjectView`]; the ingest pipeline and sweeper
//! drive the full [`Store`]. The implementation is [`SqliteStore`], which
//! also serves tests through [`SqliteStore::open_memory`].
//!
//! ## Key Types
//!
//! - [`Store`] / [`ObjectView`] - The async traits for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`Upserted`] - Result of an insert-or-fetch upsert
//! - [`ObjectRow`] - Base columns of a processed object
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bottle_catalog_core::{Algorithm, Digest};
//! use bottle_catalog_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     let store = SqliteStore::open("catalog.db").unwrap();
//!
//!     let bytes = b"hello";
//!     let content = store
//!         .upsert_content(&Digest::canonical(bytes), bytes)
//!         .await
//!         .unwrap();
//!     store
//!         .upsert_alias(content.id(), &Digest::compute(Algorithm::Sha256, bytes))
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Unique constraints are the only synchronization**: content is unique on
//!   its canonical digest, aliases on their digest string
//! - **Aliases never move**: re-pointing an alias is an `IntegrityViolation`
//! - **Reprocessing keeps identity**: kind rows are keyed by content id

pub mod error;
pub mod migration;
mod reconcile;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use traits::{
    BottleRef, ManifestRef, ObjectRow, ObjectView, Store, StoreStats, StoredObject, Upserted,
};
