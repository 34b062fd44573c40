//! Streaming SHA-256 over mirrored bodies

use super::pending::{write_fully, PartialWrite};
use sha2::{Digest, Sha256};
use std::fmt;

/// Running digest of the bytes written to one mirror file
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    inner: Sha256,
    hashed: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `data` with the same short-write discipline as the file
    pub(crate) fn update(&mut self, data: &[u8]) -> Result<(), PartialWrite> {
        let result = write_fully(&mut self.inner, data);
        let consumed = match &result {
            Ok(()) => data.len(),
            Err(partial) => partial.written,
        };
        self.hashed += consumed as u64;
        result
    }

    /// Bytes hashed so far
    pub fn hashed(&self) -> u64 {
        self.hashed
    }

    pub fn finish(self) -> ContentDigest {
        ContentDigest(self.inner.finalize().into())
    }
}

/// A finished SHA-256 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Digest of an in-memory buffer
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, the form persisted in sidecars and attributes
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
