//! # Bottle Catalog Core
//!
//! Pure types for the bottle catalog: digests, object kinds, payload schemas
//! and the projections derived from them.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Digest`] / [`Algorithm`] - `<alg>:<hex>` content digests, plus the
//!   canonical digest used for deduplication
//! - [`ObjectKind`] - blob, bottle, manifest, event, signature
//! - [`BottleConfig`], [`Manifest`], [`Event`], [`SignaturesSummary`] - payload schemas
//! - [`Projection`] - what a processor derives from a payload
//! - [`ListPage`] - a page of the incremental listing
//!
//! ## Dependency Order
//!
//! Objects reference one level down: bottles reference blobs (public
//! artifacts), manifests reference a bottle, events and signatures reference
//! a manifest. [`TOPOLOGICAL_ORDER`] lists kinds so that dependencies come first.

pub mod bottle;
pub mod digest;
pub mod error;
pub mod event;
pub mod kind;
pub mod list;
pub mod manifest;
pub mod projection;
pub mod signature;

pub use bottle::{parse_source_uri, BottleConfig, SourceRef};
pub use digest::{Algorithm, Digest};
pub use error::{CoreError, Result};
pub use event::{Event, EventAction, Location};
pub use kind::{ObjectKind, TOPOLOGICAL_ORDER};
pub use list::{format_timestamp, parse_timestamp, ListEntry, ListPage};
pub use manifest::{Descriptor, Manifest};
pub use projection::{
    ArtifactRow, AuthorRow, BottleProjection, EventProjection, LabelRow, ManifestProjection,
    MetricRow, PartRow, Projection, RowId, SignatureProjection, SignatureRow, SourceRow,
};
pub use signature::{
    SignatureDetail, SignatureValid, SignatureValidationSummary, SignaturesSummary,
};
