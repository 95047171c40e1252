//! Seed extraction: hash the accumulator contents into a fixed-size digest.
//!
//! The digest is never stored. Every call hashes whatever the buffer holds at
//! that moment, so two calls on an unchanged buffer return the same bytes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::str::FromStr;

/// Algorithm name used when nothing else is configured.
pub const DEFAULT_DIGEST_ALGORITHM: &str = "SHA-512";

/// Digest algorithms the extractor can construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    #[default]
    Sha512,
}

impl DigestAlgorithm {
    /// Canonical name, e.g. `SHA-512`.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Seed {
        let bytes = match self {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        };
        Seed {
            algorithm: self.name().to_string(),
            bytes,
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = SeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            _ => Err(SeedError::DigestUnavailable(s.to_string())),
        }
    }
}

/// Label carried by seeds that are unhashed accumulator contents.
pub const RAW_SEED_LABEL: &str = "RAW";

/// Seed material handed to a consumer.
///
/// Normally a digest of the accumulator. In raw mode it is the accumulator
/// bytes themselves, labelled [`RAW_SEED_LABEL`], and its length varies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    /// Algorithm that produced the bytes, or `RAW` for unhashed contents
    pub algorithm: String,
    bytes: Vec<u8>,
}

impl Seed {
    /// Whether the bytes are a digest rather than raw buffer contents.
    pub fn is_digest(&self) -> bool {
        self.algorithm != RAW_SEED_LABEL
    }

    /// Wrap unhashed accumulator bytes.
    pub(crate) fn raw(bytes: Vec<u8>) -> Self {
        Self {
            algorithm: RAW_SEED_LABEL.to_string(),
            bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex without separators.
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(self.bytes.len() * 2);
        for b in &self.bytes {
            let _ = write!(s, "{b:02x}");
        }
        s
    }
}

/// Maps buffer contents to a digest using a named algorithm.
///
/// The name is resolved on every call, so a misconfigured algorithm fails the
/// extraction call and nothing else.
#[derive(Debug, Clone)]
pub struct SeedExtractor {
    algorithm: String,
}

impl SeedExtractor {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn extract(&self, buffer: &[u8]) -> Result<Seed, SeedError> {
        extract(&self.algorithm, buffer)
    }
}

impl Default for SeedExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DIGEST_ALGORITHM)
    }
}

/// Hash `buffer` with the algorithm called `algorithm`.
pub fn extract(algorithm: &str, buffer: &[u8]) -> Result<Seed, SeedError> {
    let algorithm: DigestAlgorithm = algorithm.parse()?;
    Ok(algorithm.digest(buffer))
}

/// Seed extraction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    /// The named digest algorithm cannot be constructed
    DigestUnavailable(String),
}

impl std::fmt::Display for SeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedError::DigestUnavailable(name) => {
                write!(f, "Digest algorithm not available: {name}")
            }
        }
    }
}

impl std::error::Error for SeedError {}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA512_OF_ZERO_BYTE: &str = "b8244d028981d693af7b456af8efa4cad63d282e19ff14942c246e50d9351d22704a802a71c3580b6370de4ceb293c324a8423342557d4e5c38438f0e36910ee";

    #[test]
    fn test_sentinel_digest_is_fixed() {
        let digest = extract("SHA-512", &[0]).unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest.to_hex(), SHA512_OF_ZERO_BYTE);
    }

    #[test]
    fn test_raw_seed_is_labelled() {
        let digest = extract("SHA-512", &[0]).unwrap();
        assert!(digest.is_digest());

        let raw = Seed::raw(vec![0, 1, 2]);
        assert_eq!(raw.algorithm, RAW_SEED_LABEL);
        assert!(!raw.is_digest());
        assert_eq!(raw.len(), 3);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let extractor = SeedExtractor::default();
        let buffer = [0u8, 0x3f, 0x80, 0, 0];
        assert_eq!(
            extractor.extract(&buffer).unwrap(),
            extractor.extract(&buffer).unwrap()
        );
    }

    #[test]
    fn test_changed_buffer_changes_digest() {
        let d0 = extract("SHA-512", &[0]).unwrap();
        let d1 = extract("SHA-512", &[0, 1, 2, 3]).unwrap();
        assert_ne!(d0, d1);
        assert_eq!(
            d1.to_hex(),
            "4ec54b09e2b209ddb9a678522bb451740c513f488cb27a0883630718571745141920036aebdb78c0b4cd783a4a6eecc937a40c6104e427512d709a634b412f60"
        );

        let d2 = extract("SHA-512", &[0, 1, 2, 4]).unwrap();
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_algorithm_name_parsing() {
        assert_eq!("sha512".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha512));
        assert_eq!("SHA_384".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha384));
        assert_eq!("Sha-256".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha256));
        assert_eq!(DigestAlgorithm::default().name(), DEFAULT_DIGEST_ALGORITHM);
    }

    #[test]
    fn test_output_lengths() {
        for algorithm in [
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(algorithm.digest(&[0]).len(), algorithm.output_len());
        }
        assert_eq!(
            extract("SHA-256", &[0]).unwrap().to_hex(),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn test_unknown_algorithm_is_unavailable() {
        let extractor = SeedExtractor::new("MD4");
        assert_eq!(
            extractor.extract(&[0]),
            Err(SeedError::DigestUnavailable("MD4".to_string()))
        );
    }
}
