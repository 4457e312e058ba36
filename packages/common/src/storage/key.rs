use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::BlobError;

/// Content-derived blob key: the SHA-256 digest of the blob's bytes.
///
/// Two uploads with identical content always map to the same key, which is
/// what makes the store deduplicating.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobKey([u8; 32]);

impl BlobKey {
    /// Hash the given bytes into a key.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wrap a precomputed SHA-256 digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, BlobError> {
        if s.len() != 64 {
            return Err(BlobError::InvalidKey(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }

        let bytes =
            hex::decode(s).map_err(|e| BlobError::InvalidKey(format!("invalid hex: {e}")))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BlobError::InvalidKey("decoded to wrong length".into()))?;

        Ok(Self(digest))
    }

    /// Lowercase hex form, as stored in the file catalog.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 2 hex characters. Used to fan blobs out over 256 directories.
    pub fn shard_dir(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Remaining 62 hex characters, the filename inside the shard.
    pub fn shard_file(&self) -> String {
        hex::encode(&self.0[1..])
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({})", self.to_hex())
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for BlobKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
