//! OCI image manifests referencing a bottle config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{CoreError, Result};
use crate::kind::OCI_MANIFEST_MEDIA_TYPE;

/// An OCI content descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: Digest,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// An OCI image manifest whose config is a bottle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: String,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    /// Decode and validate a manifest, defaulting an empty media type.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| CoreError::malformed("manifest", e))?;
        if manifest.media_type.is_empty() {
            manifest.media_type = OCI_MANIFEST_MEDIA_TYPE.to_string();
        }
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != 2 {
            return Err(CoreError::invalid(
                "manifest",
                format!("schemaVersion must be 2, got {}", self.schema_version),
            ));
        }
        if self.media_type != OCI_MANIFEST_MEDIA_TYPE {
            return Err(CoreError::invalid(
                "manifest",
                format!("unexpected mediaType {:?}", self.media_type),
            ));
        }
        Ok(())
    }

    /// The bottle this manifest packages.
    pub fn bottle_digest(&self) -> &Digest {
        &self.config.digest
    }

    /// Each layer carries one bottle part.
    pub fn check_parts(&self, parts: usize) -> Result<()> {
        let layers = self.layers.len();
        if layers != parts {
            return Err(CoreError::invalid(
                "manifest",
                format!("there are {layers} layers but {parts} parts (they must be equal)"),
            ));
        }
        Ok(())
    }
}
