//! Server errors and their HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use bottle_catalog::CatalogError;
use bottle_catalog_core::{CoreError, Digest, ObjectKind};
use bottle_catalog_store::StoreError;

/// Body of every error response except 412.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub title: String,
    pub detail: String,
}

/// Body of a 412 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingBody {
    pub missing_digests: Vec<Digest>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The object references content the catalog does not have yet.
    #[error("{kind} references {} missing objects", .missing.len())]
    MissingDependencies { kind: ObjectKind, missing: Vec<Digest> },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// A malformed `digest` or `digest-alg` query parameter.
    pub fn digest_param(param: &str, e: CoreError) -> Self {
        match e {
            CoreError::UnknownAlgorithm(_) => ServerError::Catalog(e.into()),
            other => ServerError::BadRequest(format!("Invalid {param:?} parameter: {other}")),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Catalog(e) => match e {
                CatalogError::DigestMismatch { .. } => StatusCode::CONFLICT,
                CatalogError::Validation(_) | CatalogError::UnknownAlgorithm(_) => {
                    StatusCode::BAD_REQUEST
                }
                CatalogError::UnknownKind(_) => StatusCode::NOT_FOUND,
                CatalogError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                CatalogError::IntegrityViolation { .. } | CatalogError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServerError::MissingDependencies { .. } => StatusCode::PRECONDITION_FAILED,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Config(_) | ServerError::Store(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ServerError::MissingDependencies { kind, missing } = self {
            tracing::debug!(%kind, missing = missing.len(), "missing dependencies");
            return (status, Json(MissingBody { missing_digests: missing })).into_response();
        }

        let detail = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
            match &self {
                ServerError::Catalog(CatalogError::DigestMismatch { .. }) => {
                    "Digests for content and specified in query param do not match".to_string()
                }
                other => other.to_string(),
            }
        };
        let title = status.canonical_reason().unwrap_or("Error").to_string();
        (status, Json(ErrorBody { title, detail })).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
