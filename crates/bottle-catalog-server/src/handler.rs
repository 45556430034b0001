//! Request handlers.
//!
//! Every object kind shares one path, `/{kind}`:
//!
//! - `PUT /{kind}[?digest=<alg>:<hex> | ?digest-alg=<alg>]` ingests the body
//! - `GET /{kind}?digest=<alg>:<hex>` (and `HEAD`) returns the raw bytes
//! - `GET /{kind}?since=<rfc3339>&limit=<n>` returns a list page

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use bottle_catalog::{Catalog, DeclaredDigest, IngestResult};
use bottle_catalog_core::{
    format_timestamp, parse_timestamp, Algorithm, Digest, ListPage, ObjectKind,
};
use bottle_catalog_store::{SqliteStore, Store};
use bottle_catalog_sync::CONTENT_DIGEST_HEADER;

use crate::error::{ServerError, ServerResult};

/// Response header carrying when the object was first ingested.
pub const CREATION_DATE_HEADER: &str = "Creation-Date";

/// Page size when a list request names none.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Largest page a list request may ask for.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog<SqliteStore>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PutParams {
    pub digest: Option<String>,
    #[serde(rename = "digest-alg")]
    pub digest_alg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
    pub digest: Option<String>,
    pub since: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BottleParams {
    pub bottle_digest: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateParams {
    pub bottle_digest: Option<String>,
    pub key_fingerprint: Option<String>,
}

fn parse_kind(kind: &str) -> ServerResult<ObjectKind> {
    kind.parse()
        .map_err(|_| ServerError::NotFound(format!("unknown object kind {kind:?}")))
}

fn parse_digest(param: &str, value: &str) -> ServerResult<Digest> {
    Digest::parse(value).map_err(|e| ServerError::digest_param(param, e))
}

fn required_digest(param: &str, value: Option<&str>) -> ServerResult<Digest> {
    let value = value.ok_or_else(|| ServerError::BadRequest(format!("{param} is required")))?;
    parse_digest(param, value)
}

/// How the client named the body: a digest wins over an algorithm.
fn declared_digest(params: &PutParams) -> ServerResult<DeclaredDigest> {
    if let Some(digest) = params.digest.as_deref().filter(|d| !d.is_empty()) {
        return Ok(DeclaredDigest::Digest(parse_digest("digest", digest)?));
    }
    if let Some(alg) = params.digest_alg.as_deref().filter(|a| !a.is_empty()) {
        let alg = alg
            .parse::<Algorithm>()
            .map_err(|e| ServerError::digest_param("digest-alg", e))?;
        return Ok(DeclaredDigest::Algorithm(alg));
    }
    Ok(DeclaredDigest::Default)
}

// ─────────────────────────────────────────────────────────────────────────────
// Objects
// ─────────────────────────────────────────────────────────────────────────────

/// `PUT /{kind}`
pub async fn put_object(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<PutParams>,
    body: Bytes,
) -> ServerResult<Response> {
    let kind = parse_kind(&kind)?;
    let declared = declared_digest(&params)?;
    let ingested = state.catalog.put(kind, &body, &declared).await?;

    let status = match ingested.result {
        IngestResult::Created => StatusCode::CREATED,
        IngestResult::NoOp => StatusCode::NO_CONTENT,
        IngestResult::Conflict { missing } => {
            return Err(ServerError::MissingDependencies { kind, missing })
        }
    };
    tracing::debug!(%kind, digest = %ingested.digest, status = status.as_u16(), "put");
    Ok((status, [(CONTENT_DIGEST_HEADER, ingested.digest.to_string())]).into_response())
}

/// `GET /{kind}` and `HEAD /{kind}`: one object by digest, or a list page.
pub async fn get_objects(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<GetParams>,
) -> ServerResult<Response> {
    let kind = parse_kind(&kind)?;
    match params.digest.as_deref() {
        Some(digest) => get_object(&state, kind, digest).await,
        None => list_objects(&state, kind, &params).await,
    }
}

async fn get_object(state: &AppState, kind: ObjectKind, digest: &str) -> ServerResult<Response> {
    let digest = parse_digest("digest", digest)?;
    let stored = state
        .catalog
        .get(kind, &digest)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("{kind} {digest} not found")))?;

    Ok((
        [
            (header::CONTENT_TYPE, kind.content_type().to_string()),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
        ],
        [
            (CONTENT_DIGEST_HEADER, digest.to_string()),
            (CREATION_DATE_HEADER, format_timestamp(&stored.created_at)),
        ],
        stored.bytes,
    )
        .into_response())
}

async fn list_objects(
    state: &AppState,
    kind: ObjectKind,
    params: &GetParams,
) -> ServerResult<Response> {
    let since = match params.since.as_deref().filter(|s| !s.is_empty()) {
        Some(since) => Some(
            parse_timestamp(since)
                .map_err(|e| ServerError::BadRequest(format!("Invalid \"since\" parameter: {e}")))?,
        ),
        None => None,
    };
    let limit = match params.limit.as_deref() {
        Some(limit) => limit
            .parse::<usize>()
            .map_err(|e| ServerError::BadRequest(format!("Invalid \"limit\" parameter: {e}")))?,
        None => DEFAULT_LIST_LIMIT,
    };

    let results = state
        .catalog
        .list(kind, since, limit.min(MAX_LIST_LIMIT))
        .await?;
    tracing::debug!(%kind, rows = results.len(), "listed");
    Ok(Json(ListPage { results }).into_response())
}

// ─────────────────────────────────────────────────────────────────────────────
// Read paths
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /signatures?bottle_digest=`
pub async fn signatures(
    State(state): State<AppState>,
    Query(params): Query<BottleParams>,
) -> ServerResult<Response> {
    let bottle = required_digest("bottle_digest", params.bottle_digest.as_deref())?;
    let summaries = state.catalog.signatures_for_bottle(&bottle).await?;
    Ok(Json(summaries).into_response())
}

/// `GET /signature/validate?bottle_digest=&key_fingerprint=`
pub async fn validate_signature(
    State(state): State<AppState>,
    Query(params): Query<ValidateParams>,
) -> ServerResult<Response> {
    let bottle = required_digest("bottle_digest", params.bottle_digest.as_deref())?;
    let key = required_digest("key_fingerprint", params.key_fingerprint.as_deref())?;
    let valid = state.catalog.signatures_by_key(&bottle, &key).await?;
    Ok(Json(valid).into_response())
}

/// `GET /location?bottle_digest=`
pub async fn locations(
    State(state): State<AppState>,
    Query(params): Query<BottleParams>,
) -> ServerResult<Response> {
    let bottle = required_digest("bottle_digest", params.bottle_digest.as_deref())?;
    let locations = state.catalog.locations(&bottle).await?;
    Ok(Json(locations).into_response())
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> ServerResult<Response> {
    let stats = state.catalog.store().stats().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "contents": stats.contents,
        "aliases": stats.aliases,
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_digest_precedence() {
        let digest = Digest::compute(Algorithm::Sha512, b"x");
        let params = PutParams {
            digest: Some(digest.to_string()),
            digest_alg: Some("blake3".into()),
        };
        assert_eq!(
            declared_digest(&params).unwrap(),
            DeclaredDigest::Digest(digest)
        );

        let params = PutParams {
            digest: None,
            digest_alg: Some("blake3".into()),
        };
        assert_eq!(
            declared_digest(&params).unwrap(),
            DeclaredDigest::Algorithm(Algorithm::Blake3)
        );
        assert_eq!(
            declared_digest(&PutParams::default()).unwrap(),
            DeclaredDigest::Default
        );
    }

    #[test]
    fn unknown_kind_is_not_found() {
        assert!(matches!(parse_kind("widgets"), Err(ServerError::NotFound(_))));
        assert_eq!(parse_kind("manifest").unwrap(), ObjectKind::Manifest);
    }
}
