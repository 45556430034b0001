//! Test fixtures and helpers.
//!
//! Payload builders for every object kind, signing keys for both signature
//! schemes, and an in-memory catalog to push them into.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use rand::rngs::StdRng;
use rand::SeedableRng;

use bottle_catalog::{Catalog, CatalogConfig, DeclaredDigest, Ingested, LocalTransport};
use bottle_catalog_core::bottle::{Author, Metric, Part, PublicArtifact, Source};
use bottle_catalog_core::kind::{BOTTLE_CONFIG_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE};
use bottle_catalog_core::signature::{
    COSIGN_PAYLOAD_MEDIA_TYPE, COSIGN_SIGNATURE_TYPE, JWS_ENVELOPE_MEDIA_TYPE,
    NOTARY_SIGNATURE_TYPE,
};
use bottle_catalog_core::{
    Algorithm, BottleConfig, Descriptor, Digest, Event, EventAction, Manifest, ObjectKind,
    SignatureDetail, SignaturesSummary,
};
use bottle_catalog_store::SqliteStore;
use bottle_catalog_sync::MapResolver;

/// Layer media type used by generated manifests.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.act3-ace.bottle.layer.v1.tar";

/// The default alias clients use.
pub fn sha256(bytes: &[u8]) -> Digest {
    Digest::compute(Algorithm::Sha256, bytes)
}

/// A catalog over an in-memory SQLite store.
pub struct TestFixture {
    pub catalog: Arc<Catalog<SqliteStore>>,
}

impl TestFixture {
    /// Open a fresh catalog with the default processors.
    pub async fn new() -> Self {
        let store = SqliteStore::open_memory().expect("open in-memory store");
        let catalog = Catalog::open(store, CatalogConfig::default())
            .await
            .expect("open catalog");
        Self {
            catalog: Arc::new(catalog),
        }
    }

    /// Ingest `bytes` under the default algorithm.
    pub async fn put(&self, kind: ObjectKind, bytes: &[u8]) -> Ingested {
        self.catalog
            .put(kind, bytes, &DeclaredDigest::Default)
            .await
            .expect("ingest")
    }

    /// A transport that ingests straight into this fixture's catalog.
    pub fn transport(&self, name: &str) -> LocalTransport<SqliteStore> {
        LocalTransport::new(name, self.catalog.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bottles
// ─────────────────────────────────────────────────────────────────────────────

/// A serialized bottle config plus the blobs its public artifacts name.
#[derive(Debug, Clone)]
pub struct Bottle {
    pub config: BottleConfig,
    pub bytes: Vec<u8>,
    /// sha256 of `bytes`; what manifests reference.
    pub digest: Digest,
    pub artifacts: Vec<(Digest, Vec<u8>)>,
}

impl Bottle {
    pub fn parts(&self) -> usize {
        self.config.parts.len()
    }
}

/// Builds bottle configs.
#[derive(Debug, Clone)]
pub struct BottleBuilder {
    config: BottleConfig,
    artifacts: Vec<(Digest, Vec<u8>)>,
}

impl BottleBuilder {
    pub fn new() -> Self {
        Self {
            config: BottleConfig {
                api_version: "data.act3-ace.io/v1".to_string(),
                kind: "Bottle".to_string(),
                ..BottleConfig::default()
            },
            artifacts: Vec::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.config.description = description.to_string();
        self
    }

    /// Add a part whose content is `data`.
    pub fn part(mut self, name: &str, data: &[u8]) -> Self {
        self.config.parts.push(Part {
            name: name.to_string(),
            size: data.len() as u64,
            digest: sha256(data),
            labels: BTreeMap::new(),
        });
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.config.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.config
            .annotations
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Add a public artifact; `data` must be uploaded as a blob first.
    pub fn artifact(mut self, name: &str, path: &str, data: &[u8]) -> Self {
        let digest = sha256(data);
        self.config.public_artifacts.push(PublicArtifact {
            name: name.to_string(),
            media_type: "text/plain".to_string(),
            path: path.to_string(),
            digest: digest.clone(),
        });
        self.artifacts.push((digest, data.to_vec()));
        self
    }

    pub fn source(mut self, name: &str, uri: &str) -> Self {
        self.config.sources.push(Source {
            name: name.to_string(),
            uri: uri.to_string(),
        });
        self
    }

    pub fn author(mut self, name: &str, email: &str) -> Self {
        self.config.authors.push(Author {
            name: name.to_string(),
            url: String::new(),
            email: email.to_string(),
        });
        self
    }

    pub fn metric(mut self, name: &str, value: &str) -> Self {
        self.config.metrics.push(Metric {
            name: name.to_string(),
            description: String::new(),
            value: value.to_string(),
        });
        self
    }

    pub fn deprecates(mut self, bottle: &Digest) -> Self {
        self.config.deprecates.push(bottle.clone());
        self
    }

    pub fn build(self) -> Bottle {
        let bytes = serde_json::to_vec(&self.config).expect("serialize bottle");
        Bottle {
            digest: sha256(&bytes),
            config: self.config,
            bytes,
            artifacts: self.artifacts,
        }
    }
}

impl Default for BottleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifests, events and signatures
// ─────────────────────────────────────────────────────────────────────────────

/// A manifest for `bottle` with one layer per part.
pub fn manifest_for(bottle: &Bottle) -> Vec<u8> {
    manifest_with_layers(bottle, bottle.parts())
}

/// A manifest for `bottle` with exactly `layers` layers.
pub fn manifest_with_layers(bottle: &Bottle, layers: usize) -> Vec<u8> {
    let layers = (0..layers)
        .map(|i| Descriptor {
            media_type: LAYER_MEDIA_TYPE.to_string(),
            digest: sha256(format!("layer {i} of {}", bottle.digest).as_bytes()),
            size: 64,
            annotations: BTreeMap::new(),
        })
        .collect();
    let manifest = Manifest {
        schema_version: 2,
        media_type: OCI_MANIFEST_MEDIA_TYPE.to_string(),
        config: Descriptor {
            media_type: BOTTLE_CONFIG_MEDIA_TYPE.to_string(),
            digest: bottle.digest.clone(),
            size: bottle.bytes.len() as u64,
            annotations: BTreeMap::new(),
        },
        layers,
        annotations: BTreeMap::new(),
    };
    serde_json::to_vec(&manifest).expect("serialize manifest")
}

/// A push or pull of `manifest`, timestamped now.
pub fn event_for(manifest: &[u8], action: EventAction) -> Vec<u8> {
    event_at(manifest, action, Utc::now())
}

pub fn event_at(manifest: &[u8], action: EventAction, timestamp: DateTime<Utc>) -> Vec<u8> {
    let event = Event {
        manifest_digest: Some(sha256(manifest)),
        action: Some(action),
        repository: "registry.example/data/bottle".to_string(),
        tag: "v1".to_string(),
        auth_required: false,
        bandwidth: 1 << 20,
        timestamp: Some(timestamp),
        username: "tester".to_string(),
    };
    serde_json::to_vec(&event).expect("serialize event")
}

/// A signature summary over `manifest` of `bottle`.
pub fn signature_for(manifest: &[u8], bottle: &Bottle, signatures: Vec<SignatureDetail>) -> Vec<u8> {
    let summary = SignaturesSummary {
        subject_manifest: sha256(manifest),
        subject_bottle: bottle.digest.clone(),
        signatures,
    };
    serde_json::to_vec(&summary).expect("serialize signature summary")
}

/// Signing keys for both signature schemes.
pub struct TestKeys {
    pub p256: p256::ecdsa::SigningKey,
    pub ed25519: ed25519_dalek::SigningKey,
}

impl TestKeys {
    /// Deterministic keys from a seed.
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            p256: p256::ecdsa::SigningKey::random(&mut rng),
            ed25519: ed25519_dalek::SigningKey::generate(&mut rng),
        }
    }

    fn p256_pem(&self) -> String {
        self.p256
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode P-256 key")
    }

    fn ed25519_pem(&self) -> String {
        self.ed25519
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode Ed25519 key")
    }

    /// A cosign signature over a simple-signing `payload`.
    pub fn cosign(&self, payload: &[u8]) -> SignatureDetail {
        use p256::ecdsa::signature::hazmat::PrehashSigner;

        let digest = sha256(payload);
        let sig: p256::ecdsa::Signature = self
            .p256
            .sign_prehash(&digest.to_bytes())
            .expect("sign prehash");
        SignatureDetail {
            signature_type: COSIGN_SIGNATURE_TYPE.to_string(),
            signature: STANDARD.encode(sig.to_der().as_bytes()),
            descriptor: Descriptor {
                media_type: COSIGN_PAYLOAD_MEDIA_TYPE.to_string(),
                digest,
                size: payload.len() as u64,
                annotations: BTreeMap::new(),
            },
            public_key: self.p256_pem(),
            annotations: BTreeMap::new(),
        }
    }

    /// A notary JWS signature with `ES256` naming `subject`.
    pub fn notary_es256(&self, subject: &Digest) -> SignatureDetail {
        use p256::ecdsa::signature::Signer;

        self.notary("ES256", subject, self.p256_pem(), |input| {
            let sig: p256::ecdsa::Signature = self.p256.sign(input);
            sig.to_bytes().to_vec()
        })
    }

    /// A notary JWS signature with `EdDSA` naming `subject`.
    pub fn notary_eddsa(&self, subject: &Digest) -> SignatureDetail {
        use ed25519_dalek::Signer;

        self.notary("EdDSA", subject, self.ed25519_pem(), |input| {
            self.ed25519.sign(input).to_bytes().to_vec()
        })
    }

    fn notary(
        &self,
        alg: &str,
        subject: &Digest,
        public_key: String,
        sign: impl Fn(&[u8]) -> Vec<u8>,
    ) -> SignatureDetail {
        let header = serde_json::json!({ "alg": alg, "cty": NOTARY_SIGNATURE_TYPE });
        let payload = serde_json::json!({
            "targetArtifact": {
                "mediaType": OCI_MANIFEST_MEDIA_TYPE,
                "digest": subject.to_string(),
                "size": 512,
            }
        });
        let protected = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        let sig = sign(format!("{protected}.{payload}").as_bytes());
        let envelope = serde_json::json!({
            "protected": protected,
            "payload": payload,
            "signature": URL_SAFE_NO_PAD.encode(sig),
        })
        .to_string();

        SignatureDetail {
            signature_type: NOTARY_SIGNATURE_TYPE.to_string(),
            signature: STANDARD.encode(envelope.as_bytes()),
            descriptor: Descriptor {
                media_type: JWS_ENVELOPE_MEDIA_TYPE.to_string(),
                digest: sha256(envelope.as_bytes()),
                size: envelope.len() as u64,
                annotations: BTreeMap::new(),
            },
            public_key,
            annotations: BTreeMap::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Whole dependency chains
// ─────────────────────────────────────────────────────────────────────────────

/// A bottle with one public artifact, its manifest, an event and a
/// signature summary carrying all three signature flavours.
pub struct Chain {
    pub bottle: Bottle,
    pub manifest: Vec<u8>,
    pub event: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Chain {
    pub fn new(seed: u64) -> Self {
        let bottle = BottleBuilder::new()
            .description(&format!("chain {seed}"))
            .part("train.csv", format!("train {seed}").as_bytes())
            .part("test.csv", format!("test {seed}").as_bytes())
            .label("seed", &seed.to_string())
            .artifact("readme", "README.md", format!("readme {seed}").as_bytes())
            .build();
        let manifest = manifest_for(&bottle);
        let subject = sha256(&manifest);
        let keys = TestKeys::with_seed(seed);
        let signature = signature_for(
            &manifest,
            &bottle,
            vec![
                keys.cosign(format!("payload {seed}").as_bytes()),
                keys.notary_es256(&subject),
                keys.notary_eddsa(&subject),
            ],
        );
        let event = event_for(&manifest, EventAction::Push);
        Self {
            bottle,
            manifest,
            event,
            signature,
        }
    }

    pub fn manifest_digest(&self) -> Digest {
        sha256(&self.manifest)
    }

    /// Bytes of everything below events and signatures, keyed by the
    /// digests their dependents use.
    pub fn resolver(&self) -> MapResolver {
        let mut resolver = MapResolver::new()
            .with(self.bottle.digest.clone(), self.bottle.bytes.clone())
            .with(self.manifest_digest(), self.manifest.clone());
        for (digest, data) in &self.bottle.artifacts {
            resolver.insert(digest.clone(), data.clone());
        }
        resolver
    }

    /// Ingest the whole chain, dependencies first.
    pub async fn ingest(&self, fixture: &TestFixture) {
        for (_, data) in &self.bottle.artifacts {
            fixture.put(ObjectKind::Blob, data).await;
        }
        fixture.put(ObjectKind::Bottle, &self.bottle.bytes).await;
        fixture.put(ObjectKind::Manifest, &self.manifest).await;
        fixture.put(ObjectKind::Event, &self.event).await;
        fixture.put(ObjectKind::Signature, &self.signature).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bottle_catalog::IngestResult;

    #[test]
    fn test_payloads_parse() {
        let chain = Chain::new(7);
        BottleConfig::parse(&chain.bottle.bytes).unwrap();
        let manifest = Manifest::parse(&chain.manifest).unwrap();
        manifest.check_parts(chain.bottle.parts()).unwrap();
        Event::parse(&chain.event).unwrap();
        let summary = SignaturesSummary::parse(&chain.signature).unwrap();
        for detail in &summary.signatures {
            detail.verify(&chain.manifest_digest()).unwrap();
        }
    }

    #[test]
    fn test_seeded_keys_are_deterministic() {
        let a = TestKeys::with_seed(1);
        let b = TestKeys::with_seed(1);
        let c = TestKeys::with_seed(2);
        assert_eq!(a.p256_pem(), b.p256_pem());
        assert_ne!(a.ed25519_pem(), c.ed25519_pem());
    }

    #[tokio::test]
    async fn test_chain_ingests() {
        let fixture = TestFixture::new().await;
        let chain = Chain::new(3);
        chain.ingest(&fixture).await;

        let again = fixture.put(ObjectKind::Signature, &chain.signature).await;
        assert_eq!(again.result, IngestResult::NoOp);
        let sigs = fixture
            .catalog
            .signatures_for_bottle(&chain.bottle.digest)
            .await
            .unwrap();
        assert_eq!(sigs.len(), 3);
    }
}
