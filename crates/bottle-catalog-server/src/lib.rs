//! HTTP server for the bottle catalog.
//!
//! Exposes content-addressed upload and download of every object kind,
//! incremental listing for mirrors, and signature summaries per bottle.
//!
//! | Status | Meaning on `PUT /{kind}` |
//! |--------|--------------------------|
//! | 201 | Created, or rebuilt by a newer processor |
//! | 204 | Already ingested |
//! | 400 | Malformed payload or query, unknown digest algorithm |
//! | 409 | Declared digest does not match the body |
//! | 412 | Missing dependencies, body `{"missingDigests":[...]}` |
//!
//! Successful puts carry the stored digest in `X-Content-Digest`.
//!
//! Read paths beside the object routes:
//!
//! - `GET /signatures?bottle_digest=` signature summaries for a bottle
//! - `GET /signature/validate?bottle_digest=&key_fingerprint=` signatures
//!   over a bottle made with one key
//! - `GET /location?bottle_digest=` repositories events reported for a bottle
//! - `GET /health` row counts

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use router::build_router;
pub use server::CatalogServer;
