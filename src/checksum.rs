//! Checksum utilities for snapshot integrity verification

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA256 checksum over snapshot content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from any serializable value
    ///
    /// Values are hashed through `serde_json::Value`, whose object maps are
    /// key-sorted, so equal content always hashes equally.
    pub fn of<T: Serialize>(value: &T) -> crate::Result<Self> {
        let canonical = serde_json::to_value(value)?;
        Ok(Self::from_bytes(serde_json::to_string(&canonical)?.as_bytes()))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that a value hashes to this checksum
    pub fn verify<T: Serialize>(&self, value: &T) -> crate::Result<bool> {
        Ok(Self::of(value)? == *self)
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
