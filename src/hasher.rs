//! Content hashing of normalized text.
//!
//! SHA-256 is the default. XXH3-128 is offered for large corpora where
//! hashing cost matters more than adversarial collision resistance; at 128
//! bits the birthday bound is far beyond any realistic document count.

use crate::error::Pdf2DocError;
use crate::model::NormalizedText;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Digest function used to derive cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Xxh3_128,
}

impl HashAlgorithm {
    /// Stable name, embedded in persisted cache keys.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Xxh3_128 => "xxh3-128",
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Xxh3_128 => 32,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = Pdf2DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "xxh3" | "xxh3-128" | "xxh3_128" => Ok(HashAlgorithm::Xxh3_128),
            other => Err(Pdf2DocError::InvalidConfig(format!(
                "unknown hash algorithm '{other}' (expected sha256 or xxh3)"
            ))),
        }
    }
}

/// Fixed-size digest of a text, tagged with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    hex: String,
}

impl ContentHash {
    /// Hash normalized text.
    pub fn of(text: &NormalizedText, algorithm: HashAlgorithm) -> Self {
        Self::of_bytes(text.as_str().as_bytes(), algorithm)
    }

    pub fn of_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> Self {
        let hex = match algorithm {
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            HashAlgorithm::Xxh3_128 => format!("{:032x}", xxhash_rust::xxh3::xxh3_128(bytes)),
        };
        Self { algorithm, hex }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        let h = ContentHash::of_bytes(b"hello world", HashAlgorithm::Sha256);
        assert_eq!(
            h.hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(h.to_string(), format!("sha256:{}", h.hex()));
    }

    #[test]
    fn digests_have_fixed_length() {
        for algo in [HashAlgorithm::Sha256, HashAlgorithm::Xxh3_128] {
            for input in ["", "a", "a much longer piece of text to hash"] {
                let h = ContentHash::of_bytes(input.as_bytes(), algo);
                assert_eq!(h.hex().len(), algo.hex_len(), "{algo:?} on {input:?}");
            }
        }
    }

    #[test]
    fn same_text_same_digest() {
        let a = NormalizedText::new("The quick brown fox").unwrap();
        let b = NormalizedText::new("The quick brown fox").unwrap();
        let c = NormalizedText::new("The quick brown fox.").unwrap();
        for algo in [HashAlgorithm::Sha256, HashAlgorithm::Xxh3_128] {
            assert_eq!(ContentHash::of(&a, algo), ContentHash::of(&b, algo));
            assert_ne!(ContentHash::of(&a, algo), ContentHash::of(&c, algo));
        }
    }

    #[test]
    fn parse_algorithm_names() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("XXH3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Xxh3_128);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }
}
