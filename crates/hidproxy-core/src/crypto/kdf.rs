//! Password to key derivation.
//!
//! # How the key is made (for beginners)
//!
//! A password typed on a keyboard is short and guessable, so it is never used
//! as an encryption key directly.  Instead it is *stretched*:
//!
//! 1. A per-device salt is computed as `SHA-256(device_id || SALT_TAG)`.  Two
//!    devices given the same password therefore still derive different keys.
//! 2. `HMAC-SHA256(key = password, msg = salt)` produces a first 32-byte block.
//! 3. The block is fed back through `HMAC-SHA256(key = password, msg = block)`
//!    until [`KDF_ITERATIONS`] rounds have run.
//!
//! The first 16 bytes of the result are the AES-128 key.  The iteration count
//! is deliberately modest: the derivation runs on a microcontroller every time
//! the user unlocks the device.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::aead::AeadKey;
use crate::crypto::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Fixed tag mixed into the salt.
pub const SALT_TAG: &[u8] = b"b59497ea562367d8";

/// Total number of HMAC rounds.
pub const KDF_ITERATIONS: u32 = 600;

/// Length of the full derivation output.
pub const DERIVED_KEY_LEN: usize = 32;

/// The 32-byte output of [`derive_key`].  Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; DERIVED_KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
        &self.0
    }

    /// The AES-128 key: the first 16 bytes of the derivation.
    pub fn aead_key(&self) -> AeadKey {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.0[..16]);
        let key = AeadKey::from_bytes(bytes);
        bytes.zeroize();
        key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DerivedKey").field(&"[REDACTED]").finish()
    }
}

/// Computes the per-device salt.
pub fn device_salt(device_id: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(device_id);
    hasher.update(SALT_TAG);
    hasher.finalize().into()
}

/// Derives a key from `password` and the board's unique id.
///
/// Any password length is accepted, including zero.
///
/// # Errors
///
/// Returns [`CryptoError::Kdf`] if the HMAC primitive rejects the password
/// as a key.  HMAC-SHA256 accepts keys of any length, so this does not happen
/// in practice.
pub fn derive_key(password: &[u8], device_id: &[u8]) -> Result<DerivedKey, CryptoError> {
    let salt = device_salt(device_id);
    let mut block = hmac_round(password, &salt)?;
    for _ in 1..KDF_ITERATIONS {
        let next = hmac_round(password, &block)?;
        block.zeroize();
        block = next;
    }
    let key = DerivedKey(block);
    block.zeroize();
    Ok(key)
}

fn hmac_round(password: &[u8], message: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(password).map_err(|_| CryptoError::Kdf)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &[u8] = &[0xE6, 0x60, 0x58, 0x38, 0x83, 0x1A, 0x2B, 0x2F];

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(derive_key(b"secret", DEVICE).unwrap(), derive_key(b"secret", DEVICE).unwrap());
    }

    #[test]
    fn test_different_passwords_give_different_keys() {
        assert_ne!(derive_key(b"secret", DEVICE).unwrap(), derive_key(b"wrong", DEVICE).unwrap());
    }

    #[test]
    fn test_device_id_changes_the_key() {
        let other = [0u8; 8];
        assert_ne!(derive_key(b"secret", DEVICE).unwrap(), derive_key(b"secret", &other).unwrap());
    }

    #[test]
    fn test_empty_password_derives() {
        let key = derive_key(b"", DEVICE).unwrap();
        assert_ne!(key.as_bytes(), &[0u8; DERIVED_KEY_LEN]);
    }

    #[test]
    fn test_salt_includes_fixed_tag() {
        // Arrange
        let mut hasher = Sha256::new();
        hasher.update(DEVICE);
        hasher.update(b"b59497ea562367d8");
        let expected: [u8; 32] = hasher.finalize().into();

        // Act / Assert
        assert_eq!(device_salt(DEVICE), expected);
    }

    #[test]
    fn test_aead_key_is_first_sixteen_bytes() {
        let derived = derive_key(b"a", DEVICE).unwrap();
        assert_eq!(derived.aead_key().as_bytes()[..], derived.as_bytes()[..16]);
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let text = format!("{:?}", derive_key(b"a", DEVICE).unwrap());
        assert!(text.contains("REDACTED"));
    }
}
