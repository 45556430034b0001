//! Proptest generators for property-based testing.

use proptest::prelude::*;

use bottle_catalog_core::{Algorithm, Digest, ObjectKind, TOPOLOGICAL_ORDER};

use crate::fixtures::{Bottle, BottleBuilder};

/// Generate a supported digest algorithm.
pub fn algorithm() -> impl Strategy<Value = Algorithm> {
    prop::sample::select(Algorithm::ALL.to_vec())
}

/// Generate an object kind.
pub fn object_kind() -> impl Strategy<Value = ObjectKind> {
    prop::sample::select(TOPOLOGICAL_ORDER.to_vec())
}

/// Generate content bytes of at most `max_len` bytes.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a digest of random content.
pub fn digest() -> impl Strategy<Value = Digest> {
    (algorithm(), content(64)).prop_map(|(alg, bytes)| alg.hash(&bytes))
}

/// Generate a batch of distinct blobs.
pub fn distinct_blobs(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(content(32), 1..=max).prop_map(|set| set.into_iter().collect())
}

/// Generate a label key.
pub fn label_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9.-]{0,15}".prop_map(String::from)
}

/// Parameters for generating a bottle.
#[derive(Debug, Clone)]
pub struct BottleParams {
    pub description: String,
    pub parts: Vec<(String, Vec<u8>)>,
    pub labels: Vec<(String, String)>,
}

impl Arbitrary for BottleParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            "[a-zA-Z ]{0,40}",
            prop::collection::btree_map("[a-z][a-z0-9_.]{0,11}", content(16), 0..6),
            prop::collection::btree_map(label_key(), "[a-z0-9]{0,8}", 0..4),
        )
            .prop_map(|(description, parts, labels)| BottleParams {
                description,
                parts: parts.into_iter().collect(),
                labels: labels.into_iter().collect(),
            })
            .boxed()
    }
}

/// Build a bottle from generated parameters.
pub fn bottle_from_params(params: &BottleParams) -> Bottle {
    let mut builder = BottleBuilder::new().description(&params.description);
    for (name, data) in &params.parts {
        builder = builder.part(name, data);
    }
    for (key, value) in &params.labels {
        builder = builder.label(key, value);
    }
    builder.build()
}
