//! Wire format of list pages.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::digest::Digest;

/// One object in a list page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    #[serde(alias = "CreatedAt")]
    pub created_at: DateTime<Utc>,
    /// Every alias digest known for the content, sorted.
    #[serde(alias = "Digests", default)]
    pub digests: Vec<Digest>,
    #[serde(alias = "Data", with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Response body of `GET /{kind}?since=&limit=`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    #[serde(rename = "Results", default)]
    pub results: Vec<ListEntry>,
}

/// Render a timestamp the way list cursors and mirror checkpoints store it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse an RFC 3339 timestamp with optional fractional seconds.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s.trim()).map(|ts| ts.with_timezone(&Utc))
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
