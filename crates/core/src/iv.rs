//! IV embedding protocol
//!
//! Every encrypted artifact, local or remote, is laid out as
//!
//! ```text
//! [16 bytes: IV, raw][N bytes: AES-CTR ciphertext of the N plaintext bytes]
//! ```
//!
//! The IV is drawn from the OS-seeded CSPRNG once per file and is never
//! itself encrypted.

use rand::RngCore;

use crate::error::{Error, Result};

/// IV size in bytes (one AES block)
pub const IV_LEN: usize = 16;

/// Per-file initialization vector
#[derive(Clone, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    /// Draw a fresh random IV
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Use fixed IV bytes
    pub fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Iv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Iv({})", hex::encode(self.0))
    }
}

/// Artifact length for a plaintext of `plaintext_len` bytes
pub fn artifact_len(plaintext_len: u64) -> Result<u64> {
    plaintext_len
        .checked_add(IV_LEN as u64)
        .ok_or_else(|| Error::Internal(format!("plaintext of {plaintext_len} bytes is too large")))
}

/// Ciphertext length carried by an artifact of `artifact_len` bytes
pub fn payload_len(artifact_len: u64) -> Result<u64> {
    artifact_len
        .checked_sub(IV_LEN as u64)
        .ok_or(Error::TooSmallObject {
            size: artifact_len,
            minimum: IV_LEN as u64,
        })
}
