//! Relational projections produced by processors.
//!
//! A projection is everything a processor derives from raw bytes, ready to be
//! written by a store. Child collections are ordered: their position (or key,
//! for labels and annotations) is the identity used when a projection is
//! saved over an existing row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::digest::Digest;
use crate::kind::ObjectKind;

/// Primary key of a stored row.
pub type RowId = i64;

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Blob,
    Bottle(BottleProjection),
    Manifest(ManifestProjection),
    Event(EventProjection),
    Signature(SignatureProjection),
}

impl Projection {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Projection::Blob => ObjectKind::Blob,
            Projection::Bottle(_) => ObjectKind::Bottle,
            Projection::Manifest(_) => ObjectKind::Manifest,
            Projection::Event(_) => ObjectKind::Event,
            Projection::Signature(_) => ObjectKind::Signature,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BottleProjection {
    pub api_version: String,
    pub description: String,
    pub sources: Vec<SourceRow>,
    pub authors: Vec<AuthorRow>,
    pub metrics: Vec<MetricRow>,
    pub public_artifacts: Vec<ArtifactRow>,
    pub labels: Vec<LabelRow>,
    pub annotations: Vec<(String, String)>,
    pub deprecates: Vec<Digest>,
    pub parts: Vec<PartRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub name: String,
    pub uri: String,
    pub bottle_digest: Option<Digest>,
    pub part_selectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorRow {
    pub name: String,
    pub url: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub name: String,
    pub description: String,
    pub value: f64,
}

/// A public artifact, linked to the content record holding its bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRow {
    pub name: String,
    pub media_type: String,
    pub path: String,
    pub digest: Digest,
    pub content_id: RowId,
}

/// A label; `numeric_value` is the value parsed as a number, or NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRow {
    pub key: String,
    pub value: String,
    pub numeric_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartRow {
    pub name: String,
    pub size: u64,
    pub digest: Digest,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManifestProjection {
    pub bottle_id: RowId,
    pub bottle_digest: Digest,
    pub media_type: String,
    pub layers: Vec<Digest>,
}

/// An event with its manifest's bottle linkage copied onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventProjection {
    pub manifest_id: RowId,
    pub manifest_digest: Digest,
    pub bottle_id: RowId,
    pub bottle_digest: Digest,
    pub action: Option<String>,
    pub repository: String,
    pub tag: String,
    pub auth_required: bool,
    pub bandwidth: u64,
    pub timestamp: DateTime<Utc>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureProjection {
    pub manifest_id: RowId,
    pub manifest_digest: Digest,
    pub bottle_id: RowId,
    pub bottle_digest: Digest,
    pub details: Vec<SignatureRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRow {
    pub signature_type: String,
    pub signature: Vec<u8>,
    pub public_key: String,
    pub fingerprint: String,
    pub valid: bool,
    pub annotations: BTreeMap<String, String>,
}
