//! # Bottle Catalog Testkit
//!
//! Testing utilities for the bottle catalog.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: An in-memory catalog plus builders for bottles, manifests,
//!   events and signature summaries
//! - **Signing keys**: Deterministic keys that produce cosign and notary
//!   (`ES256`, `EdDSA`) signatures the catalog verifies
//! - **Generators**: Proptest strategies for digests, content and bottles
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use bottle_catalog_testkit::fixtures::{Chain, TestFixture};
//!
//! async fn example() {
//!     let fixture = TestFixture::new().await;
//!     let chain = Chain::new(1);
//!     chain.ingest(&fixture).await;
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use bottle_catalog_testkit::generators::{bottle_from_params, BottleParams};
//!
//! proptest! {
//!     #[test]
//!     fn bottle_digest_is_stable(params: BottleParams) {
//!         let a = bottle_from_params(&params);
//!         let b = bottle_from_params(&params);
//!         prop_assert_eq!(a.digest, b.digest);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    event_for, manifest_for, manifest_with_layers, sha256, signature_for, Bottle, BottleBuilder,
    Chain, TestFixture, TestKeys,
};
pub use generators::{bottle_from_params, BottleParams};
