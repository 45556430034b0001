//! Store traits: the abstract interface for content and projection persistence.
//!
//! Processors only see [`ObjectView`], the read side they need to resolve
//! references. The ingest pipeline and sweeper drive the full [`Store`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bottle_catalog_core::{
    Digest, ListEntry, Location, ObjectKind, Projection, RowId, SignatureValid,
    SignatureValidationSummary,
};

use crate::error::Result;

/// Result of an insert-or-fetch upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    /// The row was created by this call.
    Inserted(RowId),
    /// The row already existed (possibly created by a concurrent writer).
    Existing(RowId),
}

impl Upserted {
    pub fn id(&self) -> RowId {
        match self {
            Upserted::Inserted(id) | Upserted::Existing(id) => *id,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Upserted::Inserted(_))
    }
}

/// The base columns every processed object row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRow {
    pub id: RowId,
    pub content_id: RowId,
    pub processor_version: u32,
}

/// A bottle as seen by dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BottleRef {
    pub id: RowId,
    pub parts: usize,
}

/// A manifest as seen by dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    pub id: RowId,
    pub bottle_id: RowId,
    pub bottle_digest: Digest,
}

/// Raw bytes of a processed object.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub content_id: RowId,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Row counts, mostly for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub contents: u64,
    pub aliases: u64,
}

/// Read-only lookups a processor may perform while resolving references.
#[async_trait]
pub trait ObjectView: Send + Sync {
    /// The content record an alias digest points at.
    async fn content_for_alias(&self, digest: &Digest) -> Result<Option<RowId>>;

    /// A processed bottle reachable through `digest`.
    async fn find_bottle(&self, digest: &Digest) -> Result<Option<BottleRef>>;

    /// A processed manifest reachable through `digest`.
    async fn find_manifest(&self, digest: &Digest) -> Result<Option<ManifestRef>>;
}

/// The Store trait: async interface for catalog persistence.
///
/// # Design Notes
///
/// - **Insert or fetch**: both content and alias upserts tolerate a racing
///   writer; the loser fetches the winner's row.
/// - **One row per content per kind**: `save_projection` keys the kind row by
///   content id, so reprocessing updates the same row in place.
/// - **Strictly increasing creation time**: within a kind table `created_at`
///   never repeats, so `since` paging neither skips nor repeats rows.
#[async_trait]
pub trait Store: ObjectView {
    // ─────────────────────────────────────────────────────────────────────────
    // Content Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert content keyed by its canonical digest, or fetch the existing row.
    async fn upsert_content(&self, canonical: &Digest, bytes: &[u8]) -> Result<Upserted>;

    /// Record `alias` for `content_id`.
    ///
    /// Fails with `IntegrityViolation` if the alias already names other content.
    async fn upsert_alias(&self, content_id: RowId, alias: &Digest) -> Result<Upserted>;

    /// Raw bytes of a content record.
    async fn content_bytes(&self, content_id: RowId) -> Result<Option<Vec<u8>>>;

    async fn stats(&self) -> Result<StoreStats>;

    // ─────────────────────────────────────────────────────────────────────────
    // Projection Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// The processed row of `kind` for a content record.
    async fn find_object(&self, kind: ObjectKind, content_id: RowId) -> Result<Option<ObjectRow>>;

    /// Write a projection for a content record, creating the kind row or
    /// updating it in place, and reconcile its child collections.
    ///
    /// Returns the kind row id.
    async fn save_projection(
        &self,
        content_id: RowId,
        version: u32,
        projection: &Projection,
    ) -> Result<RowId>;

    /// The first row of `kind` after `after_id` whose version is below `version`.
    async fn next_stale(
        &self,
        kind: ObjectKind,
        version: u32,
        after_id: RowId,
    ) -> Result<Option<ObjectRow>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Read Paths
    // ─────────────────────────────────────────────────────────────────────────

    /// Raw bytes of an object of `kind` named by any of its alias digests.
    async fn get_by_digest(&self, kind: ObjectKind, digest: &Digest) -> Result<Option<StoredObject>>;

    /// Objects of `kind` created after `since`, oldest first, with all their
    /// alias digests.
    async fn list_since(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>>;

    /// Signature results recorded for a bottle.
    async fn signatures_for_bottle(&self, bottle: &Digest) -> Result<Vec<SignatureValidationSummary>>;

    /// Labels of a bottle.
    async fn bottle_labels(&self, bottle: &Digest) -> Result<BTreeMap<String, String>>;

    /// Digests of bottles that declare `bottle` deprecated.
    async fn deprecated_by(&self, bottle: &Digest) -> Result<Vec<Digest>>;

    /// Distinct repositories events have reported for a bottle.
    async fn locations_for_bottle(&self, bottle: &Digest) -> Result<Vec<Location>>;

    /// Signatures over a bottle made with the key whose fingerprint is
    /// `fingerprint`.
    async fn signatures_by_key(
        &self,
        bottle: &Digest,
        fingerprint: &Digest,
    ) -> Result<Vec<SignatureValid>>;
}
