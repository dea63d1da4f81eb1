//! Checksums and compile fingerprints
//!
//! [`Checksum`] guards file immutability. [`Fingerprint`] is the cache key for
//! compilation: it hashes file lists in order and option maps independent of
//! insertion order, with length-prefixed framing so adjacent values cannot
//! run together.

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::version::SchemaFile;

/// SHA256 checksum for schema content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn of_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Combined checksum over an ordered list of checksums
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a Checksum>) -> Self {
        let joined: Vec<&str> = parts.into_iter().map(|c| c.as_str()).collect();
        Self::of_str(&joined.join(","))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, content: &str) -> bool {
        Self::of_str(content) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// Fingerprint
// =============================================================================

/// Deterministic hash over compile inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn builder() -> FingerprintBuilder {
        FingerprintBuilder {
            hasher: Sha256::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incremental fingerprint construction
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    fn frame(&mut self, tag: u8, bytes: &[u8]) {
        self.hasher.update([tag]);
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    /// Section marker so the same files in different roles hash differently
    pub fn section(mut self, name: &str) -> Self {
        self.frame(b'S', name.as_bytes());
        self
    }

    /// Files in order: path and content both count
    pub fn files<'a>(mut self, files: impl IntoIterator<Item = &'a SchemaFile>) -> Self {
        for file in files {
            self.frame(b'P', file.path.as_bytes());
            self.frame(b'C', file.content.as_bytes());
        }
        self
    }

    pub fn text(mut self, value: &str) -> Self {
        self.frame(b'T', value.as_bytes());
        self
    }

    pub fn flag(mut self, value: bool) -> Self {
        self.frame(b'B', &[value as u8]);
        self
    }

    /// Key/value pairs hashed in key order, whatever order they arrive in
    pub fn options<'a, I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let sorted: BTreeMap<&String, &String> = options.into_iter().collect();
        for (key, value) in sorted {
            self.frame(b'K', key.as_bytes());
            self.frame(b'V', value.as_bytes());
        }
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(format!("{:x}", self.hasher.finalize()))
    }
}
