//! Content ETags
//!
//! An ETag is the lower-hex SHA-256 of an entity's serialized bytes. Stored
//! tags are bare hex; HTTP headers carry them quoted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Fingerprint serialized content
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a stored or client-supplied tag, dropping surrounding quotes
    pub fn parse(raw: &str) -> Self {
        Self(normalize(raw).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quoted form for `ETag` response headers
    pub fn header_value(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Byte-for-byte comparison against a client-supplied tag, quoted or not
    pub fn matches(&self, candidate: &str) -> bool {
        normalize(candidate) == self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
}
