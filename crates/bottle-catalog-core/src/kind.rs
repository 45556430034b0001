//! Object kinds and their dependency order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The kinds of object the catalog ingests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Blob,
    Bottle,
    Manifest,
    Event,
    Signature,
}

/// Kinds in the order they must be applied so every dependency precedes its
/// dependents.
pub const TOPOLOGICAL_ORDER: [ObjectKind; 5] = [
    ObjectKind::Blob,
    ObjectKind::Bottle,
    ObjectKind::Manifest,
    ObjectKind::Event,
    ObjectKind::Signature,
];

/// Media type of a bottle config.
pub const BOTTLE_CONFIG_MEDIA_TYPE: &str = "application/vnd.act3-ace.bottle.config.v1+json";

/// Media type of an OCI image manifest.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

impl ObjectKind {
    /// Singular name, used as the URL path segment and mirror directory.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Bottle => "bottle",
            ObjectKind::Manifest => "manifest",
            ObjectKind::Event => "event",
            ObjectKind::Signature => "signature",
        }
    }

    /// Name of the projection table for this kind.
    pub const fn table(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blobs",
            ObjectKind::Bottle => "bottles",
            ObjectKind::Manifest => "manifests",
            ObjectKind::Event => "events",
            ObjectKind::Signature => "signatures",
        }
    }

    /// Content type of the raw bytes served for this kind.
    pub const fn content_type(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "application/octet-stream",
            ObjectKind::Bottle => BOTTLE_CONFIG_MEDIA_TYPE,
            ObjectKind::Manifest => OCI_MANIFEST_MEDIA_TYPE,
            ObjectKind::Event | ObjectKind::Signature => "application/json",
        }
    }

    /// The kind whose objects this kind references, one level down.
    pub const fn dependency(&self) -> Option<ObjectKind> {
        match self {
            ObjectKind::Blob => None,
            ObjectKind::Bottle => Some(ObjectKind::Blob),
            ObjectKind::Manifest => Some(ObjectKind::Bottle),
            ObjectKind::Event | ObjectKind::Signature => Some(ObjectKind::Manifest),
        }
    }
}

impl FromStr for ObjectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" | "blobs" => Ok(ObjectKind::Blob),
            "bottle" | "bottles" => Ok(ObjectKind::Bottle),
            "manifest" | "manifests" => Ok(ObjectKind::Manifest),
            "event" | "events" => Ok(ObjectKind::Event),
            "signature" | "signatures" => Ok(ObjectKind::Signature),
            other => Err(CoreError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
