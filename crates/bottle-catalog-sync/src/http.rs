//! HTTP transport for a remote catalog server.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use bottle_catalog_core::{format_timestamp, Digest, ListEntry, ListPage, ObjectKind};

use crate::error::{Result, SyncError};
use crate::transport::{PutOutcome, Transport};

/// Response header carrying the digest the server stored content under.
pub const CONTENT_DIGEST_HEADER: &str = "X-Content-Digest";

/// Body of a 412 response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MissingBody {
    #[serde(default)]
    missing_digests: Vec<Digest>,
}

/// Body of other error responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

/// Talks to a catalog server at `base`, one path segment per kind.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base: Url,
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let base = Url::parse(base).map_err(|e| SyncError::Transport(format!("{base}: {e}")))?;
        Ok(Self::with_client(base, client))
    }

    /// Create a transport sharing an existing client.
    pub fn with_client(mut base: Url, client: Client) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base, client }
    }

    fn endpoint(&self, kind: ObjectKind) -> Result<Url> {
        self.base
            .join(kind.as_str())
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    fn send_error(&self, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout(format!("{}: {e}", self.base))
        } else {
            SyncError::Transport(format!("{}: {e}", self.base))
        }
    }

    async fn rejected(&self, url: &Url, response: Response) -> SyncError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) if !body.detail.is_empty() => body.detail,
            Ok(body) if !body.title.is_empty() => body.title,
            _ => text,
        };
        SyncError::Rejected {
            endpoint: url.to_string(),
            status,
            message,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    async fn put(
        &self,
        kind: ObjectKind,
        bytes: &[u8],
        digest: Option<&Digest>,
    ) -> Result<PutOutcome> {
        let mut url = self.endpoint(kind)?;
        if let Some(digest) = digest {
            url.query_pairs_mut()
                .append_pair("digest", &digest.to_string());
        }

        let response = self
            .client
            .put(url.clone())
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        let stored = response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Digest::parse(v).ok())
            .or_else(|| digest.cloned());

        match status {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                let stored = stored.ok_or_else(|| {
                    SyncError::Transport(format!("{url}: response lacks {CONTENT_DIGEST_HEADER}"))
                })?;
                tracing::debug!(%kind, digest = %stored, status = status.as_u16(), "put");
                if status == StatusCode::CREATED {
                    Ok(PutOutcome::Created(stored))
                } else {
                    Ok(PutOutcome::Unchanged(stored))
                }
            }
            StatusCode::PRECONDITION_FAILED => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| self.send_error(e))?;
                let body: MissingBody = serde_json::from_slice(&body)?;
                Err(SyncError::MissingDependencies {
                    kind,
                    missing: body.missing_digests,
                })
            }
            StatusCode::CONFLICT => {
                let text = response.text().await.unwrap_or_default();
                Err(SyncError::DigestMismatch(text))
            }
            _ => Err(self.rejected(&url, response).await),
        }
    }

    async fn get(&self, kind: ObjectKind, digest: &Digest) -> Result<Vec<u8>> {
        let mut url = self.endpoint(kind)?;
        url.query_pairs_mut()
            .append_pair("digest", &digest.to_string());

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        match response.status() {
            StatusCode::OK => Ok(response
                .bytes()
                .await
                .map_err(|e| self.send_error(e))?
                .to_vec()),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound {
                kind,
                digest: digest.clone(),
            }),
            _ => Err(self.rejected(&url, response).await),
        }
    }

    async fn list(
        &self,
        kind: ObjectKind,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ListEntry>> {
        let mut url = self.endpoint(kind)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(since) = since {
                query.append_pair("since", &format_timestamp(&since));
            }
            query.append_pair("limit", &limit.to_string());
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        if response.status() != StatusCode::OK {
            return Err(self.rejected(&url, response).await);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.send_error(e))?;
        let page: ListPage = serde_json::from_slice(&body)?;
        tracing::debug!(%kind, rows = page.results.len(), "listed");
        Ok(page.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let transport = HttpTransport::new("http://catalog.example/api", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            transport.endpoint(ObjectKind::Manifest).unwrap().as_str(),
            "http://catalog.example/api/manifest"
        );
    }

    #[test]
    fn test_missing_body_shape() {
        let digest = Digest::compute(bottle_catalog_core::Algorithm::Sha256, b"a");
        let json = format!(r#"{{"missingDigests":["{digest}"]}}"#);
        let body: MissingBody = serde_json::from_str(&json).unwrap();
        assert_eq!(body.missing_digests, vec![digest]);
    }

    #[test]
    fn test_bad_base_url() {
        let err = HttpTransport::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }
}
