//! Sync client against in-process catalogs: cascading pushes and mirrors.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use bottle_catalog::store::Store;
use bottle_catalog_core::{ObjectKind, TOPOLOGICAL_ORDER};
use bottle_catalog_sync::mirror::{read_index, read_latest};
use bottle_catalog_sync::{
    MirrorResolver, MultiClient, PutOutcome, SyncClient, SyncConfig, SyncError, INDEX_FILE,
    LATEST_FILE,
};
use bottle_catalog_testkit::fixtures::{Chain, TestFixture};
use bottle_catalog_testkit::generators::distinct_blobs;

fn config(batch_size: usize) -> SyncConfig {
    SyncConfig {
        batch_size,
        ..SyncConfig::default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cascading push
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn event_push_into_empty_catalog_converges() {
    let fixture = TestFixture::new().await;
    let client = SyncClient::new(fixture.transport("local"), SyncConfig::default());
    let chain = Chain::new(1);
    let resolver = chain.resolver();

    let outcome = client.send_event(&chain.event, &resolver).await.unwrap();
    assert!(matches!(outcome, PutOutcome::Created(_)));

    for (digest, _) in &chain.bottle.artifacts {
        assert!(fixture.catalog.get(ObjectKind::Blob, digest).await.unwrap().is_some());
    }
    assert!(fixture
        .catalog
        .get(ObjectKind::Bottle, &chain.bottle.digest)
        .await
        .unwrap()
        .is_some());
    assert!(fixture
        .catalog
        .get(ObjectKind::Manifest, &chain.manifest_digest())
        .await
        .unwrap()
        .is_some());

    // The signature only needs the manifest, which is now there.
    let signed = client
        .send_signature(&chain.signature, &resolver)
        .await
        .unwrap();
    assert!(matches!(signed, PutOutcome::Created(_)));

    // Everything again is a no-op.
    let again = client.send_event(&chain.event, &resolver).await.unwrap();
    assert!(matches!(again, PutOutcome::Unchanged(_)));
}

#[tokio::test]
async fn cascade_without_the_bytes_fails_cleanly() {
    let fixture = TestFixture::new().await;
    let client = SyncClient::new(fixture.transport("local"), SyncConfig::default());
    let chain = Chain::new(2);

    let err = client
        .send_manifest(&chain.manifest, &bottle_catalog_sync::MapResolver::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnresolvedDependency(ref d) if *d == chain.bottle.digest));
    assert!(fixture
        .catalog
        .get(ObjectKind::Manifest, &chain.manifest_digest())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn fan_out_reaches_every_catalog() {
    let fixtures = [TestFixture::new().await, TestFixture::new().await];
    let multi = MultiClient::new(
        fixtures
            .iter()
            .enumerate()
            .map(|(i, f)| SyncClient::new(f.transport(&format!("catalog-{i}")), SyncConfig::default()))
            .collect(),
    );
    let chain = Chain::new(3);

    let outcomes = multi
        .send(ObjectKind::Event, chain.event.clone(), Arc::new(chain.resolver()))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    for fixture in &fixtures {
        let events = fixture.catalog.list(ObjectKind::Event, None, 10).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mirrors
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mirror_round_trip_rebuilds_the_catalog() {
    let source = TestFixture::new().await;
    for seed in 10..13 {
        Chain::new(seed).ingest(&source).await;
    }
    let dir = tempfile::tempdir().unwrap();
    let reader = SyncClient::new(source.transport("source"), config(2));
    reader.download_all(dir.path(), None, false).await.unwrap();

    let destination = TestFixture::new().await;
    let writer = SyncClient::new(destination.transport("destination"), config(2));
    writer.upload_all(dir.path()).await.unwrap();

    for kind in TOPOLOGICAL_ORDER {
        let from = source.catalog.list(kind, None, 100).await.unwrap();
        let to = destination.catalog.list(kind, None, 100).await.unwrap();
        assert_eq!(from.len(), to.len(), "{kind}");
        for (a, b) in from.iter().zip(&to) {
            assert_eq!(a.data, b.data, "{kind}");
            assert_eq!(a.digests, b.digests, "{kind}");
        }
    }
    assert_eq!(
        source.catalog.store().stats().await.unwrap(),
        destination.catalog.store().stats().await.unwrap()
    );
}

#[tokio::test]
async fn mirror_resolver_feeds_a_cascade() {
    let source = TestFixture::new().await;
    let chain = Chain::new(20);
    chain.ingest(&source).await;
    let dir = tempfile::tempdir().unwrap();
    SyncClient::new(source.transport("source"), SyncConfig::default())
        .download_all(dir.path(), None, false)
        .await
        .unwrap();

    let destination = TestFixture::new().await;
    let client = SyncClient::new(destination.transport("destination"), SyncConfig::default());
    let resolver = MirrorResolver::new(dir.path());
    client.send_event(&chain.event, &resolver).await.unwrap();
    assert_eq!(
        destination
            .catalog
            .list(ObjectKind::Blob, None, 10)
            .await
            .unwrap()
            .len(),
        chain.bottle.artifacts.len()
    );
}

async fn mirror_in_rounds(rounds: Vec<Vec<Vec<u8>>>, batch_size: usize) {
    let fixture = TestFixture::new().await;
    let client = SyncClient::new(fixture.transport("local"), config(batch_size));
    let dir = tempfile::tempdir().unwrap();

    let mut pushed = 0;
    let mut seen = HashSet::new();
    for round in rounds {
        for blob in round {
            if seen.insert(blob.clone()) {
                client.put(ObjectKind::Blob, &blob, None).await.unwrap();
                pushed += 1;
            }
        }
        client
            .download(ObjectKind::Blob, dir.path(), None, true)
            .await
            .unwrap();
    }

    let rows = read_index(&dir.path().join(INDEX_FILE)).await.unwrap();
    let names: HashSet<_> = rows.iter().map(|r| r.file_name.clone()).collect();
    assert_eq!(rows.len(), pushed, "every object mirrored once");
    assert_eq!(names.len(), pushed, "no object mirrored twice");

    if pushed > 0 {
        let all = fixture
            .catalog
            .list(ObjectKind::Blob, None, pushed + 1)
            .await
            .unwrap();
        let latest = read_latest(&dir.path().join(LATEST_FILE)).await.unwrap();
        assert_eq!(latest, all[pushed - 1].created_at);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn checkpointed_mirrors_have_no_gaps_or_repeats(
        rounds in prop::collection::vec(distinct_blobs(6), 1..4),
        batch_size in 1usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(mirror_in_rounds(rounds, batch_size));
    }
}
