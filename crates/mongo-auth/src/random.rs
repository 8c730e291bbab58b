//! Randomness used for client nonces.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;

/// Source of client nonces.
///
/// Swapped out in tests to make exchanges reproducible.
pub trait RandomSource: Send + Sync {
    /// `len` random bytes.
    fn bytes(&self, len: usize) -> Vec<u8>;

    /// A printable SCRAM client nonce (no commas).
    fn scram_nonce(&self) -> String {
        BASE64.encode(self.bytes(24))
    }
}

/// Operating-system randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        buf
    }
}

/// Fixed output, for reproducing published test vectors.
#[derive(Debug, Clone, Default)]
pub struct FixedRandom {
    nonce: String,
    bytes: Vec<u8>,
}

impl FixedRandom {
    /// Always answer `nonce` for SCRAM nonces.
    pub fn scram(nonce: impl Into<String>) -> Self {
        Self {
            nonce: nonce.into(),
            bytes: Vec::new(),
        }
    }

    /// Always answer `bytes` (cycled to the requested length) for raw bytes.
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            nonce: String::new(),
            bytes: bytes.into(),
        }
    }
}

impl RandomSource for FixedRandom {
    fn bytes(&self, len: usize) -> Vec<u8> {
        if self.bytes.is_empty() {
            return vec![0; len];
        }
        self.bytes.iter().copied().cycle().take(len).collect()
    }

    fn scram_nonce(&self) -> String {
        self.nonce.clone()
    }
}
