//! AES-128-GCM sealing of individual stored values.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::CryptoError;

/// AES key length in bytes.
pub const AEAD_KEY_LEN: usize = 16;

/// GCM initialisation vector length.
pub const IV_LEN: usize = 12;

/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// The 16-byte AES-128 key held in RAM while the device is unsealed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; AEAD_KEY_LEN]);

impl AeadKey {
    pub fn from_bytes(bytes: [u8; AEAD_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice of exactly [`AEAD_KEY_LEN`] bytes, as read
    /// from an NFC tag.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; AEAD_KEY_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; AEAD_KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes128Gcm {
        Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AeadKey").field(&"[REDACTED]").finish()
    }
}

/// Output of [`encrypt`]: IV, ciphertext (same length as the plaintext) and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
///
/// # Errors
///
/// Returns [`CryptoError::EncryptFailed`] if the cipher refuses the input
/// (only possible for plaintexts far larger than any stored value).
pub fn encrypt(plaintext: &[u8], key: &AeadKey) -> Result<Sealed, CryptoError> {
    encrypt_with_rng(plaintext, key, &mut OsRng)
}

/// As [`encrypt`], drawing the IV from `rng`.
///
/// # Errors
///
/// See [`encrypt`].
pub fn encrypt_with_rng(
    plaintext: &[u8],
    key: &AeadKey,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<Sealed, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let mut combined = key
        .cipher()
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::EncryptFailed)?;

    // aes-gcm appends the tag to the ciphertext.
    let split = combined.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&combined[split..]);
    combined.truncate(split);

    Ok(Sealed {
        iv,
        ciphertext: combined,
        tag,
    })
}

/// Verifies and decrypts a sealed value.
///
/// # Errors
///
/// Returns [`CryptoError::AuthFailed`] on any tag mismatch; no plaintext is
/// returned in that case.
pub fn decrypt(sealed: &Sealed, key: &AeadKey) -> Result<Vec<u8>, CryptoError> {
    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    key.cipher()
        .decrypt(Nonce::from_slice(&sealed.iv), combined.as_slice())
        .map_err(|_| CryptoError::AuthFailed)
}
