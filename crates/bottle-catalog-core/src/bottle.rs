//! Bottle config schema.
//!
//! A bottle config is the JSON document that describes a dataset: its parts,
//! provenance sources, authors, metrics, public artifacts and metadata.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::digest::Digest;
use crate::error::{CoreError, Result};

/// A decoded bottle config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleConfig {
    #[serde(default)]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub public_artifacts: Vec<PublicArtifact>,
    #[serde(default)]
    pub deprecates: Vec<Digest>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
}

/// A metric; `value` is a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicArtifact {
    pub name: String,
    #[serde(default)]
    pub media_type: String,
    pub path: String,
    pub digest: Digest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub digest: Digest,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl BottleConfig {
    /// Decode and validate a bottle config.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let config: BottleConfig =
            serde_json::from_slice(bytes).map_err(|e| CoreError::malformed("bottle", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the structural rules serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.kind.is_empty() && self.kind != "Bottle" {
            return Err(CoreError::invalid(
                "bottle",
                format!("kind must be \"Bottle\", got {:?}", self.kind),
            ));
        }

        let mut names = HashSet::new();
        for part in &self.parts {
            if part.name.is_empty() {
                return Err(CoreError::invalid("bottle", "part name is required"));
            }
            if !names.insert(part.name.as_str()) {
                return Err(CoreError::invalid(
                    "bottle",
                    format!("duplicate part name {:?}", part.name),
                ));
            }
        }

        let mut paths = HashSet::new();
        for artifact in &self.public_artifacts {
            if artifact.name.is_empty() || artifact.path.is_empty() {
                return Err(CoreError::invalid(
                    "bottle",
                    "public artifact name and path are required",
                ));
            }
            if !paths.insert(artifact.path.as_str()) {
                return Err(CoreError::invalid(
                    "bottle",
                    format!("duplicate public artifact path {:?}", artifact.path),
                ));
            }
        }

        if self.sources.iter().any(|s| s.name.is_empty() || s.uri.is_empty()) {
            return Err(CoreError::invalid("bottle", "source name and uri are required"));
        }
        if self.authors.iter().any(|a| a.name.is_empty()) {
            return Err(CoreError::invalid("bottle", "author name is required"));
        }
        if self.metrics.iter().any(|m| m.name.is_empty()) {
            return Err(CoreError::invalid("bottle", "metric name is required"));
        }
        Ok(())
    }
}

/// What a source URI points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRef {
    /// The parent bottle, when the source is another bottle.
    pub bottle_digest: Option<Digest>,
    /// Part selectors restricting which parts of the parent were used.
    pub part_selectors: Vec<String>,
}

/// Parse a source URI.
///
/// `bottle:<alg>:<hex>?selector=...` and `hash://<alg>/<hex>?selector=...`
/// reference a parent bottle. Any other well-formed URL is an external
/// source with no parent.
pub fn parse_source_uri(uri: &str) -> Result<SourceRef> {
    let url = Url::parse(uri).map_err(|e| CoreError::invalid("source uri", format!("{uri}: {e}")))?;

    let bottle_digest = match url.scheme() {
        "bottle" => Some(Digest::parse(url.path())?),
        "hash" => {
            let alg = url.host_str().unwrap_or_default();
            let hex = url.path().trim_start_matches('/');
            Some(Digest::parse(&format!("{alg}:{hex}"))?)
        }
        _ => None,
    };

    let part_selectors = match bottle_digest {
        Some(_) => url
            .query_pairs()
            .filter(|(k, _)| k == "selector")
            .map(|(_, v)| v.into_owned())
            .collect(),
        None => Vec::new(),
    };

    Ok(SourceRef {
        bottle_digest,
        part_selectors,
    })
}
