//! End-to-end ingest properties over a real SQLite catalog.

use std::sync::Arc;

use async_trait::async_trait;
use bottle_catalog::store::{ObjectView, SqliteStore, Store};
use bottle_catalog::{
    default_processors, Catalog, CatalogConfig, CatalogError, DeclaredDigest, IngestResult,
    ProcessError, ProcessOutcome, Processor,
};
use bottle_catalog_core::{
    Algorithm, Digest, EventAction, LabelRow, Location, ObjectKind, Projection,
};
use bottle_catalog_testkit::fixtures::{
    event_for, manifest_for, manifest_with_layers, sha256, signature_for, BottleBuilder, Chain,
    TestFixture, TestKeys,
};

// ─────────────────────────────────────────────────────────────────────────────
// Deduplication and digest integrity
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn same_bytes_under_two_algorithms_store_one_content() {
    let fixture = TestFixture::new().await;
    let data = b"shared payload";

    let first = fixture
        .catalog
        .put(
            ObjectKind::Blob,
            data,
            &DeclaredDigest::Digest(Digest::compute(Algorithm::Sha256, data)),
        )
        .await
        .unwrap();
    let second = fixture
        .catalog
        .put(
            ObjectKind::Blob,
            data,
            &DeclaredDigest::Algorithm(Algorithm::Sha512),
        )
        .await
        .unwrap();

    assert_eq!(first.content_id, second.content_id);
    assert_eq!(first.result, IngestResult::Created);
    assert_eq!(second.result, IngestResult::NoOp);

    let stats = fixture.catalog.store().stats().await.unwrap();
    assert_eq!(stats.contents, 1);
    assert_eq!(stats.aliases, 2);

    let page = fixture
        .catalog
        .list(ObjectKind::Blob, None, 10)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].digests.len(), 2);
}

#[tokio::test]
async fn concurrent_puts_of_one_content_converge() {
    let fixture = TestFixture::new().await;
    let mut tasks = Vec::new();
    for alg in [Algorithm::Sha256, Algorithm::Sha512, Algorithm::Blake3, Algorithm::Sha256] {
        let catalog = fixture.catalog.clone();
        tasks.push(tokio::spawn(async move {
            catalog
                .put(
                    ObjectKind::Blob,
                    b"raced",
                    &DeclaredDigest::Algorithm(alg),
                )
                .await
                .unwrap()
        }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().content_id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(fixture.catalog.store().stats().await.unwrap().contents, 1);
}

#[tokio::test]
async fn mismatched_digest_leaves_no_trace() {
    let fixture = TestFixture::new().await;
    let declared = Digest::compute(Algorithm::Sha256, b"something else");

    let err = fixture
        .catalog
        .put(
            ObjectKind::Blob,
            b"actual bytes",
            &DeclaredDigest::Digest(declared.clone()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::DigestMismatch { .. }));

    let stats = fixture.catalog.store().stats().await.unwrap();
    assert_eq!(stats.contents, 0);
    assert_eq!(stats.aliases, 0);
    assert!(fixture
        .catalog
        .get(ObjectKind::Blob, &declared)
        .await
        .unwrap()
        .is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency gating
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn manifest_is_gated_on_its_bottle() {
    let fixture = TestFixture::new().await;
    let bottle = BottleBuilder::new().part("a", b"a").build();
    let manifest = manifest_for(&bottle);

    let early = fixture.put(ObjectKind::Manifest, &manifest).await;
    assert_eq!(
        early.result,
        IngestResult::Conflict {
            missing: vec![bottle.digest.clone()]
        }
    );

    fixture.put(ObjectKind::Bottle, &bottle.bytes).await;
    let retried = fixture.put(ObjectKind::Manifest, &manifest).await;
    assert_eq!(retried.result, IngestResult::Created);
}

#[tokio::test]
async fn bottle_reports_every_missing_artifact_at_once() {
    let fixture = TestFixture::new().await;
    let bottle = BottleBuilder::new()
        .artifact("readme", "README.md", b"readme")
        .artifact("license", "LICENSE", b"license")
        .artifact("notes", "docs/notes.md", b"notes")
        .build();
    fixture.put(ObjectKind::Blob, b"license").await;

    let ingested = fixture.put(ObjectKind::Bottle, &bottle.bytes).await;
    let IngestResult::Conflict { mut missing } = ingested.result else {
        panic!("expected missing artifacts, got {:?}", ingested.result);
    };
    missing.sort();
    let mut expected = vec![sha256(b"readme"), sha256(b"notes")];
    expected.sort();
    assert_eq!(missing, expected);
}

#[tokio::test]
async fn layer_part_mismatch_is_a_validation_error() {
    let fixture = TestFixture::new().await;
    let bottle = BottleBuilder::new().part("a", b"a").part("b", b"b").build();
    fixture.put(ObjectKind::Bottle, &bottle.bytes).await;

    let err = fixture
        .catalog
        .put(
            ObjectKind::Manifest,
            &manifest_with_layers(&bottle, 3),
            &DeclaredDigest::Default,
        )
        .await
        .unwrap_err();
    match err {
        CatalogError::Validation(msg) => {
            assert!(msg.contains("there are 3 layers but 2 parts"), "{msg}")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn event_waits_for_manifest() {
    let fixture = TestFixture::new().await;
    let chain = Chain::new(11);

    let early = fixture.put(ObjectKind::Event, &chain.event).await;
    assert_eq!(
        early.result,
        IngestResult::Conflict {
            missing: vec![chain.manifest_digest()]
        }
    );

    for (_, data) in &chain.bottle.artifacts {
        fixture.put(ObjectKind::Blob, data).await;
    }
    fixture.put(ObjectKind::Bottle, &chain.bottle.bytes).await;
    fixture.put(ObjectKind::Manifest, &chain.manifest).await;

    let pull = event_for(&chain.manifest, EventAction::Pull);
    assert_eq!(
        fixture.put(ObjectKind::Event, &pull).await.result,
        IngestResult::Created
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Signatures and bottle read paths
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn signatures_are_verified_and_recorded() {
    let fixture = TestFixture::new().await;
    let chain = Chain::new(21);
    chain.ingest(&fixture).await;

    let summaries = fixture
        .catalog
        .signatures_for_bottle(&chain.bottle.digest)
        .await
        .unwrap();
    assert_eq!(summaries.len(), 3);
    for summary in &summaries {
        assert!(summary.valid);
        assert_eq!(summary.subject_manifest, chain.manifest_digest());
        assert!(summary.fingerprint.starts_with("sha256:"));
    }
}

#[tokio::test]
async fn signature_for_another_bottle_is_rejected() {
    let fixture = TestFixture::new().await;
    let chain = Chain::new(31);
    chain.ingest(&fixture).await;

    let other = BottleBuilder::new().description("other").build();
    fixture.put(ObjectKind::Bottle, &other.bytes).await;

    let keys = TestKeys::with_seed(31);
    let forged = signature_for(
        &chain.manifest,
        &other,
        vec![keys.notary_eddsa(&chain.manifest_digest())],
    );
    let err = fixture
        .catalog
        .put(ObjectKind::Signature, &forged, &DeclaredDigest::Default)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)), "{err}");
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let fixture = TestFixture::new().await;
    let chain = Chain::new(41);
    chain.ingest(&fixture).await;

    let keys = TestKeys::with_seed(41);
    let other_keys = TestKeys::with_seed(42);
    let mut detail = keys.notary_es256(&chain.manifest_digest());
    detail.public_key = other_keys.notary_es256(&chain.manifest_digest()).public_key;
    let summary = signature_for(&chain.manifest, &chain.bottle, vec![detail]);

    let err = fixture
        .catalog
        .put(ObjectKind::Signature, &summary, &DeclaredDigest::Default)
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)), "{err}");
}

#[tokio::test]
async fn deprecation_and_labels_are_queryable() {
    let fixture = TestFixture::new().await;
    let old = BottleBuilder::new().description("v1").label("stage", "raw").build();
    let new = BottleBuilder::new()
        .description("v2")
        .label("stage", "clean")
        .deprecates(&old.digest)
        .build();
    fixture.put(ObjectKind::Bottle, &old.bytes).await;
    fixture.put(ObjectKind::Bottle, &new.bytes).await;

    let by = fixture.catalog.deprecated_by(&old.digest).await.unwrap();
    assert_eq!(by.len(), 1);
    assert!(fixture
        .catalog
        .deprecated_by(&new.digest)
        .await
        .unwrap()
        .is_empty());

    let labels = fixture.catalog.bottle_labels(&new.digest).await.unwrap();
    assert_eq!(labels.get("stage").map(String::as_str), Some("clean"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Reprocessing
// ─────────────────────────────────────────────────────────────────────────────

/// Delegates to another processor under a higher version.
struct Bumped(Arc<dyn Processor>);

#[async_trait]
impl Processor for Bumped {
    fn kind(&self) -> ObjectKind {
        self.0.kind()
    }

    fn version(&self) -> u32 {
        self.0.version() + 1
    }

    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        self.0.process(bytes, view).await
    }
}

#[tokio::test]
async fn reopening_with_newer_processors_reprocesses_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let chain = Chain::new(51);

    let (content_id, row_id, old_version) = {
        let catalog = Catalog::open(SqliteStore::open(&path).unwrap(), CatalogConfig::default())
            .await
            .unwrap();
        for (_, data) in &chain.bottle.artifacts {
            catalog
                .put(ObjectKind::Blob, data, &DeclaredDigest::Default)
                .await
                .unwrap();
        }
        catalog
            .put(ObjectKind::Bottle, &chain.bottle.bytes, &DeclaredDigest::Default)
            .await
            .unwrap();
        let manifest = catalog
            .put(ObjectKind::Manifest, &chain.manifest, &DeclaredDigest::Default)
            .await
            .unwrap();
        let row = catalog
            .store()
            .find_object(ObjectKind::Manifest, manifest.content_id)
            .await
            .unwrap()
            .unwrap();
        (manifest.content_id, row.id, row.processor_version)
    };

    let processors = default_processors()
        .into_iter()
        .map(|p| -> Arc<dyn Processor> {
            if p.kind() == ObjectKind::Manifest {
                Arc::new(Bumped(p))
            } else {
                p
            }
        })
        .collect();
    let catalog = Catalog::open_with_processors(
        SqliteStore::open(&path).unwrap(),
        CatalogConfig::default(),
        processors,
    )
    .await
    .unwrap();

    let row = catalog
        .store()
        .find_object(ObjectKind::Manifest, content_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.id, row_id);
    assert_eq!(row.processor_version, old_version + 1);

    // Already current: a re-put is a no-op and the version never moves back.
    let again = catalog
        .put(ObjectKind::Manifest, &chain.manifest, &DeclaredDigest::Default)
        .await
        .unwrap();
    assert_eq!(again.result, IngestResult::NoOp);
    let report = catalog
        .reprocess(&tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.updated(), 0);
}

/// A newer bottle processor that derives one more label.
struct Relabelled(Arc<dyn Processor>);

#[async_trait]
impl Processor for Relabelled {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Bottle
    }

    fn version(&self) -> u32 {
        self.0.version() + 1
    }

    async fn process(
        &self,
        bytes: &[u8],
        view: &dyn ObjectView,
    ) -> Result<ProcessOutcome, ProcessError> {
        match self.0.process(bytes, view).await? {
            ProcessOutcome::Ready(Projection::Bottle(mut bottle)) => {
                bottle.labels.push(LabelRow {
                    key: "tier".to_string(),
                    value: "gold".to_string(),
                    numeric_value: f64::NAN,
                });
                Ok(ProcessOutcome::Ready(Projection::Bottle(bottle)))
            }
            other => Ok(other),
        }
    }
}

#[tokio::test]
async fn reprocessing_rederives_fields_and_keeps_dependents_linked() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.db");
    let chain = Chain::new(52);

    let manifest_before = {
        let catalog = Catalog::open(SqliteStore::open(&path).unwrap(), CatalogConfig::default())
            .await
            .unwrap();
        for (_, data) in &chain.bottle.artifacts {
            catalog
                .put(ObjectKind::Blob, data, &DeclaredDigest::Default)
                .await
                .unwrap();
        }
        for (kind, bytes) in [
            (ObjectKind::Bottle, &chain.bottle.bytes),
            (ObjectKind::Manifest, &chain.manifest),
            (ObjectKind::Event, &chain.event),
        ] {
            catalog.put(kind, bytes, &DeclaredDigest::Default).await.unwrap();
        }
        let labels = catalog.bottle_labels(&chain.bottle.digest).await.unwrap();
        assert!(!labels.contains_key("tier"));
        catalog
            .store()
            .find_manifest(&chain.manifest_digest())
            .await
            .unwrap()
            .unwrap()
    };

    let processors = default_processors()
        .into_iter()
        .map(|p| -> Arc<dyn Processor> {
            match p.kind() {
                ObjectKind::Bottle => Arc::new(Relabelled(p)),
                ObjectKind::Event => Arc::new(Bumped(p)),
                _ => p,
            }
        })
        .collect();
    let catalog = Catalog::open_with_processors(
        SqliteStore::open(&path).unwrap(),
        CatalogConfig::default(),
        processors,
    )
    .await
    .unwrap();

    // The new label is derived from the stored bytes, the old ones survive.
    let labels = catalog.bottle_labels(&chain.bottle.digest).await.unwrap();
    assert_eq!(labels.get("tier").map(String::as_str), Some("gold"));
    assert_eq!(labels.get("seed").map(String::as_str), Some("52"));

    // The manifest still points at the same bottle row.
    let manifest_after = catalog
        .store()
        .find_manifest(&chain.manifest_digest())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manifest_after.id, manifest_before.id);
    assert_eq!(manifest_after.bottle_id, manifest_before.bottle_id);

    // The event row still joins through to the bottle.
    let locations = catalog.locations(&chain.bottle.digest).await.unwrap();
    assert_eq!(
        locations,
        vec![Location {
            repository: "registry.example/data/bottle".to_string(),
            auth_required: false,
            digest: chain.manifest_digest(),
        }]
    );
}
