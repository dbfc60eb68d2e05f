//! AES-128 counter mode keystream adapter
//!
//! The whole 16-byte IV is the initial counter block and the counter is
//! incremented as a 128-bit big-endian integer, so the keystream for a
//! given byte offset depends only on key, IV and offset. Encryption and
//! decryption are the same XOR.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

use crate::error::{Error, Result};
use crate::iv::Iv;

/// AES key size in bytes
pub const KEY_LEN: usize = 16;

/// Length of the hex form of the key
pub const KEY_HEX_LEN: usize = KEY_LEN * 2;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Symmetric key decoded from the configuration
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; KEY_LEN]);

impl CipherKey {
    /// Decode a 32 character hex key
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        if hex_key.len() != KEY_HEX_LEN {
            return Err(Error::Config(format!(
                "Invalid AES key: expected {KEY_HEX_LEN} hex characters, got {}",
                hex_key.len()
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(hex_key, &mut bytes)
            .map_err(|e| Error::Config(format!("Failed to decode AES key: {e}")))?;
        Ok(Self(bytes))
    }

    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(********)")
    }
}

/// Keystream state for one file transfer
///
/// Chunks must be fed in increasing, contiguous order. The adapter
/// tracks how many bytes it has transformed.
pub struct KeystreamCipher {
    inner: Aes128Ctr,
    iv: Iv,
    consumed: u64,
}

impl KeystreamCipher {
    /// Start a keystream at byte 0 of the IV's block 0
    pub fn new(key: &CipherKey, iv: &Iv) -> Self {
        Self {
            inner: Aes128Ctr::new(key.as_bytes().into(), iv.as_bytes().into()),
            iv: iv.clone(),
            consumed: 0,
        }
    }

    /// Start a keystream positioned at an absolute byte offset
    pub fn at_offset(key: &CipherKey, iv: &Iv, offset: u64) -> Result<Self> {
        let mut stream = Self::new(key, iv);
        stream
            .inner
            .try_seek(offset)
            .map_err(|e| Error::Alignment(format!("cannot seek keystream to {offset}: {e}")))?;
        stream.consumed = offset;
        Ok(stream)
    }

    /// Total bytes transformed so far
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// XOR `input` with the keystream into `output`
    ///
    /// Both slices must have the same length.
    pub fn apply(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::Internal(format!(
                "keystream input is {} bytes but output is {}",
                input.len(),
                output.len()
            )));
        }

        let next = self.consumed.checked_add(input.len() as u64).ok_or_else(|| {
            Error::Alignment(format!(
                "{} bytes at offset {} overflow the keystream counter",
                input.len(),
                self.consumed
            ))
        })?;

        output.copy_from_slice(input);
        self.inner
            .try_apply_keystream(output)
            .map_err(|e| Error::Alignment(e.to_string()))?;
        self.consumed = next;
        Ok(())
    }
}

impl std::fmt::Debug for KeystreamCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystreamCipher")
            .field("iv", &self.iv)
            .field("consumed", &self.consumed)
            .finish()
    }
}
