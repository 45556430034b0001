//! Push/pull events reported by clients.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{CoreError, Result};

/// What the client did with the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Push,
    Pull,
}

impl EventAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventAction::Push => "push",
            EventAction::Pull => "pull",
        }
    }
}

/// Body of a `PUT /event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_digest: Option<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<EventAction>,
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(default)]
    pub auth_required: bool,
    /// Bytes per second.
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub username: String,
}

/// Where a bottle has been seen, reported by `GET /location`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    pub repository: String,
    pub auth_required: bool,
    /// Manifest the event named.
    pub digest: Digest,
}

/// Allowed clock skew for event timestamps, in seconds.
const CLOCK_SKEW_SECS: i64 = 60;

impl Event {
    /// Decode and validate an event against the current time.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_at(bytes, Utc::now())
    }

    pub fn parse_at(bytes: &[u8], now: DateTime<Utc>) -> Result<Self> {
        let event: Event =
            serde_json::from_slice(bytes).map_err(|e| CoreError::malformed("event", e))?;
        event.validate(now)?;
        Ok(event)
    }

    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.manifest_digest.is_none() {
            return Err(CoreError::invalid("event", "manifestDigest is required"));
        }
        if self.repository.is_empty() {
            return Err(CoreError::invalid("event", "repository is required"));
        }
        if self.username.is_empty() {
            return Err(CoreError::invalid("event", "username is required"));
        }
        match self.timestamp {
            None => Err(CoreError::invalid("event", "timestamp is required")),
            Some(ts) if ts > now + Duration::seconds(CLOCK_SKEW_SECS) => Err(CoreError::invalid(
                "event",
                format!("timestamp {} is in the future", ts.to_rfc3339()),
            )),
            Some(_) => Ok(()),
        }
    }
}
