//! Password accumulation and password-hash verification.

use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::aead::AeadKey;

/// Capacity of the password accumulator.  Further bytes are dropped silently.
pub const MAX_PASSWORD_LEN: usize = 128;

/// Length of the stored password hash.
pub const PASSWORD_HASH_LEN: usize = 32;

/// Bounded buffer collecting password bytes as they are typed.  Wiped on
/// [`PasswordBuffer::clear`] and on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PasswordBuffer {
    bytes: [u8; MAX_PASSWORD_LEN],
    len: usize,
}

impl PasswordBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; MAX_PASSWORD_LEN],
            len: 0,
        }
    }

    /// Appends one byte; ignored once the buffer is full.
    pub fn push(&mut self, byte: u8) {
        if self.len < MAX_PASSWORD_LEN {
            self.bytes[self.len] = byte;
            self.len += 1;
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.zeroize();
    }

    /// Returns `true` when no byte of the backing storage is set.
    pub fn is_zeroed(&self) -> bool {
        self.len == 0 && self.bytes.iter().all(|&b| b == 0)
    }
}

impl Default for PasswordBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PasswordBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordBuffer")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// The value stored at `auth.password_hash`: SHA-256 over the AES key.
pub fn password_hash(key: &AeadKey) -> [u8; PASSWORD_HASH_LEN] {
    Sha256::digest(key.as_bytes()).into()
}

/// Compares `key`'s hash with `stored` in constant time.  A stored value of
/// the wrong length never matches.
pub fn verify_password_hash(key: &AeadKey, stored: &[u8]) -> bool {
    if stored.len() != PASSWORD_HASH_LEN {
        return false;
    }
    let hash = password_hash(key);
    hash[..].ct_eq(stored).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_truncates_silently_at_capacity() {
        // Arrange
        let mut buf = PasswordBuffer::new();

        // Act
        for i in 0..(MAX_PASSWORD_LEN + 1) {
            buf.push(i as u8);
        }

        // Assert
        assert_eq!(buf.len(), MAX_PASSWORD_LEN);
        assert_eq!(buf.as_bytes()[MAX_PASSWORD_LEN - 1], (MAX_PASSWORD_LEN - 1) as u8);
    }

    #[test]
    fn test_clear_wipes_backing_storage() {
        let mut buf = PasswordBuffer::new();
        buf.push(0x04);
        buf.push(0x05);
        buf.clear();
        assert!(buf.is_zeroed());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_debug_does_not_print_contents() {
        let mut buf = PasswordBuffer::new();
        buf.push(b'z');
        assert!(!format!("{buf:?}").contains("122"));
    }

    #[test]
    fn test_hash_verification_accepts_only_matching_key() {
        // Arrange
        let good = AeadKey::from_bytes([1; 16]);
        let bad = AeadKey::from_bytes([2; 16]);
        let stored = password_hash(&good);

        // Act / Assert
        assert!(verify_password_hash(&good, &stored));
        assert!(!verify_password_hash(&bad, &stored));
        assert!(!verify_password_hash(&good, &stored[..31]));
    }
}
