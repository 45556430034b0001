//! Content digests.
//!
//! A [`Digest`] is `<algorithm>:<lowercase hex>`. Clients may name content
//! with any supported [`Algorithm`]; the catalog additionally computes a
//! [`canonical`](Digest::canonical) digest with a fixed internal algorithm and
//! uses that as the deduplication key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;

use crate::error::{CoreError, Result};

/// A supported hash algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha512,
    Blake3,
}

impl Algorithm {
    /// Internal algorithm used for the deduplication key.
    pub const CANONICAL: Algorithm = Algorithm::Blake3;

    /// Algorithm used when a client declares neither a digest nor an algorithm.
    pub const DEFAULT: Algorithm = Algorithm::Sha256;

    /// Every supported algorithm.
    pub const ALL: [Algorithm; 3] = [Algorithm::Sha256, Algorithm::Sha512, Algorithm::Blake3];

    /// The name used in digest strings.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// Length of the hex-encoded hash.
    pub const fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 | Algorithm::Blake3 => 64,
            Algorithm::Sha512 => 128,
        }
    }

    /// Hash `bytes` with this algorithm.
    pub fn hash(&self, bytes: &[u8]) -> Digest {
        let hex = match self {
            Algorithm::Sha256 => hex::encode(sha2::Sha256::digest(bytes)),
            Algorithm::Sha512 => hex::encode(sha2::Sha512::digest(bytes)),
            Algorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        };
        Digest {
            algorithm: *self,
            hex,
        }
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha512" => Ok(Algorithm::Sha512),
            "blake3" => Ok(Algorithm::Blake3),
            other => Err(CoreError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content digest, `<algorithm>:<hex>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// Compute the digest of `bytes` with `algorithm`.
    pub fn compute(algorithm: Algorithm, bytes: &[u8]) -> Self {
        algorithm.hash(bytes)
    }

    /// Compute the canonical (deduplication) digest of `bytes`.
    pub fn canonical(bytes: &[u8]) -> Self {
        Algorithm::CANONICAL.hash(bytes)
    }

    /// Parse `<algorithm>:<hex>`.
    ///
    /// Unknown algorithms are reported as [`CoreError::UnknownAlgorithm`] so
    /// callers can tell them apart from garbage input.
    pub fn parse(s: &str) -> Result<Self> {
        let (alg, hex) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidDigest(s.to_string()))?;
        Self::from_parts(alg, hex, s)
    }

    /// Parse a mirror file name, `<algorithm>-<hex>`.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let (alg, hex) = name
            .split_once('-')
            .ok_or_else(|| CoreError::InvalidDigest(name.to_string()))?;
        Self::from_parts(alg, hex, name)
    }

    fn from_parts(alg: &str, hex: &str, original: &str) -> Result<Self> {
        let algorithm: Algorithm = alg.parse()?;
        let well_formed = hex.len() == algorithm.hex_len()
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(CoreError::InvalidDigest(original.to_string()));
        }
        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex-encoded hash without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Raw hash bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Hex is validated on construction.
        hex::decode(&self.hex).unwrap_or_default()
    }

    /// True when `bytes` hash to this digest.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        self.algorithm.hash(bytes) == *self
    }

    /// File name used for this digest in a local mirror, `<algorithm>-<hex>`.
    pub fn file_name(&self) -> String {
        format!("{}-{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, &self.hex[..16.min(self.hex.len())])
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_sha256() {
        let d = Digest::compute(Algorithm::Sha256, b"hello");
        assert_eq!(
            d.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_canonical_is_blake3() {
        let d = Digest::canonical(b"hello");
        assert_eq!(d.algorithm(), Algorithm::Blake3);
        assert_eq!(d.hex().len(), 64);
    }

    #[test]
    fn test_verify() {
        let d = Digest::compute(Algorithm::Sha512, b"payload");
        assert!(d.verify(b"payload"));
        assert!(!d.verify(b"payload2"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            Digest::parse("md5:abcd"),
            Err(CoreError::UnknownAlgorithm(_))
        ));
        assert!(matches!(
            Digest::parse("sha256:abcd"),
            Err(CoreError::InvalidDigest(_))
        ));
        assert!(matches!(Digest::parse("nocolon"), Err(CoreError::InvalidDigest(_))));
        let upper = format!("sha256:{}", "A".repeat(64));
        assert!(matches!(Digest::parse(&upper), Err(CoreError::InvalidDigest(_))));
    }

    #[test]
    fn test_file_name() {
        let d = Digest::compute(Algorithm::Sha256, b"x");
        let name = d.file_name();
        assert!(name.starts_with("sha256-"));
        assert_eq!(Digest::from_file_name(&name).unwrap(), d);
    }

    #[test]
    fn test_serde_as_string() {
        let d = Digest::compute(Algorithm::Blake3, b"x");
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", d));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_debug_truncated() {
        let d = Digest::compute(Algorithm::Sha256, b"x");
        let debug = format!("{:?}", d);
        assert!(debug.starts_with("Digest(sha256:"));
        assert!(debug.len() < 40);
    }

    proptest! {
        #[test]
        fn prop_rendered_digest_parses(bytes in proptest::collection::vec(any::<u8>(), 0..256), idx in 0usize..3) {
            let alg = Algorithm::ALL[idx];
            let d = Digest::compute(alg, &bytes);
            let parsed = Digest::parse(&d.to_string()).unwrap();
            prop_assert_eq!(&parsed, &d);
            prop_assert!(parsed.verify(&bytes));
        }
    }
}
