//! Signature summaries and their verification.
//!
//! A signature object carries one or more detached signatures over a manifest.
//! Two schemes are accepted:
//!
//! - **cosign**: ECDSA P-256 over the SHA-256 digest of a simple-signing
//!   payload. The payload digest is the descriptor digest, so verification
//!   works on the prehash directly.
//! - **notary**: a JWS envelope in flattened JSON form whose payload names
//!   the signed manifest as `targetArtifact`. `ES256` and `EdDSA` are
//!   supported; COSE envelopes are rejected.

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::digest::{Algorithm, Digest};
use crate::error::{CoreError, Result};
use crate::manifest::Descriptor;

/// Signature type of cosign-generated signatures.
pub const COSIGN_SIGNATURE_TYPE: &str = "dev.cosignproject.cosign/signature";
/// Signature type of notary-generated signatures.
pub const NOTARY_SIGNATURE_TYPE: &str = "application/vnd.cncf.notary.payload.v1+json";
/// Descriptor media type of a cosign simple-signing payload.
pub const COSIGN_PAYLOAD_MEDIA_TYPE: &str = "application/vnd.dev.cosign.simplesigning.v1+json";
/// Descriptor media type of a JWS envelope.
pub const JWS_ENVELOPE_MEDIA_TYPE: &str = "application/jose+json";
/// Descriptor media type of a COSE envelope.
pub const COSE_ENVELOPE_MEDIA_TYPE: &str = "application/cose";
/// Annotation holding the signing certificate thumbprint (SHA-256 hex).
pub const THUMBPRINT_ANNOTATION: &str = "io.cncf.notary.x509chain.thumbprint#S256";

const MAX_PAYLOAD_SIZE: u64 = 5000;

/// A single signature over a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureDetail {
    pub signature_type: String,
    /// Base64 (standard alphabet) signature bytes.
    pub signature: String,
    #[serde(rename = "ociDescriptor")]
    pub descriptor: Descriptor,
    /// PEM encoded public key.
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Body of a `PUT /signature`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignaturesSummary {
    #[serde(rename = "subjectManifest")]
    pub subject_manifest: Digest,
    #[serde(rename = "subjectBottleid")]
    pub subject_bottle: Digest,
    #[serde(default)]
    pub signatures: Vec<SignatureDetail>,
}

/// Per-signature result reported by `GET /signatures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureValidationSummary {
    #[serde(rename = "subjectManifest")]
    pub subject_manifest: Digest,
    #[serde(rename = "subjectBottleID")]
    pub subject_bottle: Digest,
    #[serde(rename = "sigValid")]
    pub valid: bool,
    #[serde(rename = "sigFingerprint")]
    pub fingerprint: String,
    #[serde(rename = "sigAnnotations")]
    pub annotations: BTreeMap<String, String>,
}

/// Whether a key signed a bottle, reported by `GET /signature/validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureValid {
    #[serde(rename = "subjectBottleID")]
    pub subject_bottle: Digest,
    #[serde(rename = "keyFingerprint")]
    pub key_fingerprint: String,
    pub validated: bool,
}

impl SignaturesSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let summary: SignaturesSummary =
            serde_json::from_slice(bytes).map_err(|e| CoreError::malformed("signature", e))?;
        for detail in &summary.signatures {
            detail.validate()?;
        }
        Ok(summary)
    }
}

impl SignatureDetail {
    pub fn validate(&self) -> Result<()> {
        if self.signature_type != COSIGN_SIGNATURE_TYPE && self.signature_type != NOTARY_SIGNATURE_TYPE
        {
            return Err(CoreError::invalid(
                "signature",
                format!("unknown signatureType {:?}", self.signature_type),
            ));
        }
        if self.signature.is_empty() {
            return Err(CoreError::invalid("signature", "signature is required"));
        }
        if self.public_key.is_empty() {
            return Err(CoreError::invalid("signature", "publicKey is required"));
        }
        let media_type = self.descriptor.media_type.as_str();
        if ![COSIGN_PAYLOAD_MEDIA_TYPE, JWS_ENVELOPE_MEDIA_TYPE, COSE_ENVELOPE_MEDIA_TYPE].contains(&media_type) {
            return Err(CoreError::invalid(
                "signature",
                format!("unexpected descriptor mediaType {media_type:?}"),
            ));
        }
        if self.descriptor.size == 0 || self.descriptor.size > MAX_PAYLOAD_SIZE {
            return Err(CoreError::invalid(
                "signature",
                format!(
                    "descriptor size {} must be between 1 and {MAX_PAYLOAD_SIZE}",
                    self.descriptor.size
                ),
            ));
        }
        Ok(())
    }

    /// Decoded signature bytes.
    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.signature)
            .map_err(|e| CoreError::invalid("signature", format!("expected base64: {e}")))
    }

    /// Fingerprint of the signing identity.
    ///
    /// The notary certificate thumbprint annotation wins over the public key.
    pub fn fingerprint(&self) -> String {
        match self.annotations.get(THUMBPRINT_ANNOTATION) {
            Some(thumbprint) => format!("{}:{thumbprint}", Algorithm::Sha256),
            None => Digest::compute(Algorithm::Sha256, self.public_key.as_bytes()).to_string(),
        }
    }

    /// Verify the signature cryptographically.
    pub fn verify(&self, subject_manifest: &Digest) -> Result<()> {
        let sig = self.signature_bytes()?;
        match (self.signature_type.as_str(), self.descriptor.media_type.as_str()) {
            (COSIGN_SIGNATURE_TYPE, COSIGN_PAYLOAD_MEDIA_TYPE) => {
                verify_cosign(&self.public_key, &sig, &self.descriptor.digest)
            }
            (NOTARY_SIGNATURE_TYPE, JWS_ENVELOPE_MEDIA_TYPE) => {
                verify_jws(&self.public_key, &sig, subject_manifest)
            }
            (NOTARY_SIGNATURE_TYPE, COSE_ENVELOPE_MEDIA_TYPE) => Err(
                CoreError::UnsupportedSignature(COSE_ENVELOPE_MEDIA_TYPE.to_string()),
            ),
            (kind, media_type) => Err(CoreError::invalid(
                "signature",
                format!("{kind} signatures cannot use a {media_type} descriptor"),
            )),
        }
    }
}

fn verify_cosign(public_key: &str, sig: &[u8], payload_digest: &Digest) -> Result<()> {
    use p256::ecdsa::signature::hazmat::PrehashVerifier;
    use p256::ecdsa::{Signature, VerifyingKey};
    use p256::pkcs8::DecodePublicKey;

    if payload_digest.algorithm() != Algorithm::Sha256 {
        return Err(CoreError::invalid(
            "signature",
            "cosign payload digest must be sha256",
        ));
    }
    let key = VerifyingKey::from_public_key_pem(public_key)
        .map_err(|e| CoreError::invalid("signature", format!("bad P-256 public key: {e}")))?;
    let sig = Signature::from_der(sig)
        .or_else(|_| Signature::from_slice(sig))
        .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
    key.verify_prehash(&payload_digest.to_bytes(), &sig)
        .map_err(|_| CoreError::InvalidSignature("cosign signature does not verify".into()))
}

#[derive(Deserialize)]
struct JwsEnvelope {
    protected: String,
    payload: String,
    signature: String,
}

#[derive(Deserialize)]
struct JwsHeader {
    alg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotaryPayload {
    target_artifact: Descriptor,
}

fn verify_jws(public_key: &str, envelope: &[u8], subject_manifest: &Digest) -> Result<()> {
    let envelope: JwsEnvelope = serde_json::from_slice(envelope)
        .map_err(|e| CoreError::malformed("jws envelope", e))?;
    let header: JwsHeader = decode_segment(&envelope.protected, "jws protected header")?;
    let payload: NotaryPayload = decode_segment(&envelope.payload, "jws payload")?;
    let sig = URL_SAFE_NO_PAD
        .decode(&envelope.signature)
        .map_err(|e| CoreError::malformed("jws signature", e))?;

    if payload.target_artifact.digest != *subject_manifest {
        return Err(CoreError::InvalidSignature(format!(
            "signed artifact {} is not the subject manifest {subject_manifest}",
            payload.target_artifact.digest
        )));
    }

    let signing_input = format!("{}.{}", envelope.protected, envelope.payload);
    match header.alg.as_str() {
        "ES256" => {
            use p256::ecdsa::signature::Verifier;
            use p256::ecdsa::{Signature, VerifyingKey};
            use p256::pkcs8::DecodePublicKey;

            let key = VerifyingKey::from_public_key_pem(public_key)
                .map_err(|e| CoreError::invalid("signature", format!("bad P-256 public key: {e}")))?;
            let sig = Signature::from_slice(&sig)
                .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
            key.verify(signing_input.as_bytes(), &sig)
                .map_err(|_| CoreError::InvalidSignature("jws signature does not verify".into()))
        }
        "EdDSA" => {
            use ed25519_dalek::pkcs8::DecodePublicKey;
            use ed25519_dalek::{Signature, Verifier, VerifyingKey};

            let key = VerifyingKey::from_public_key_pem(public_key)
                .map_err(|e| CoreError::invalid("signature", format!("bad Ed25519 public key: {e}")))?;
            let sig = Signature::from_slice(&sig)
                .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
            key.verify(signing_input.as_bytes(), &sig)
                .map_err(|_| CoreError::InvalidSignature("jws signature does not verify".into()))
        }
        other => Err(CoreError::UnsupportedSignature(format!("jws alg {other}"))),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &'static str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CoreError::malformed(what, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::malformed(what, e))
}
