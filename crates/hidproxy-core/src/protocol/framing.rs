//! One-byte framing of stored values.
//!
//! Every value in the KV store starts with a frame byte:
//!
//! ```text
//! 0x00 [plaintext...]
//! 0x01 [iv:12][ciphertext...][tag:16]
//! ```
//!
//! Plain and sealed values are separate types so a caller holding a
//! [`PlainValue`] can never write it where a [`SealedValue`] is required.

use crate::crypto::{self, AeadKey, CryptoError, Sealed, IV_LEN, TAG_LEN};
use crate::protocol::codec::CodecError;

pub const FRAME_PLAIN: u8 = 0x00;
pub const FRAME_SEALED: u8 = 0x01;

/// Bytes a sealed value adds on top of its plaintext.
pub const SEALED_OVERHEAD: usize = 1 + IV_LEN + TAG_LEN;

/// A value stored without encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainValue(Vec<u8>);

impl PlainValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_frame(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len());
        out.push(FRAME_PLAIN);
        out.extend_from_slice(&self.0);
        out
    }
}

/// A value encrypted and authenticated with the device key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedValue(Sealed);

impl SealedValue {
    /// Encrypts `plaintext` under `key`.
    ///
    /// # Errors
    ///
    /// Propagates [`CryptoError::EncryptFailed`].
    pub fn seal(plaintext: &[u8], key: &AeadKey) -> Result<Self, CryptoError> {
        crypto::encrypt(plaintext, key).map(Self)
    }

    /// Verifies and decrypts.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AuthFailed`] for a wrong key or tampered bytes.
    pub fn open(&self, key: &AeadKey) -> Result<Vec<u8>, CryptoError> {
        crypto::decrypt(&self.0, key)
    }

    pub fn to_frame(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SEALED_OVERHEAD + self.0.ciphertext.len());
        out.push(FRAME_SEALED);
        out.extend_from_slice(&self.0.iv);
        out.extend_from_slice(&self.0.ciphertext);
        out.extend_from_slice(&self.0.tag);
        out
    }
}

/// A framed value as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Plain(PlainValue),
    Sealed(SealedValue),
}

impl StoredValue {
    /// Splits a framed value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InsufficientData`] for an empty value or a sealed
    /// value too short to hold IV and tag, and [`CodecError::UnknownFrame`]
    /// for any other frame byte.
    pub fn from_frame(bytes: &[u8]) -> Result<Self, CodecError> {
        let (&header, body) = bytes.split_first().ok_or(CodecError::InsufficientData {
            needed: 1,
            available: 0,
        })?;
        match header {
            FRAME_PLAIN => Ok(StoredValue::Plain(PlainValue::new(body))),
            FRAME_SEALED => {
                if body.len() < IV_LEN + TAG_LEN {
                    return Err(CodecError::InsufficientData {
                        needed: SEALED_OVERHEAD,
                        available: bytes.len(),
                    });
                }
                let mut iv = [0u8; IV_LEN];
                iv.copy_from_slice(&body[..IV_LEN]);
                let tag_start = body.len() - TAG_LEN;
                let mut tag = [0u8; TAG_LEN];
                tag.copy_from_slice(&body[tag_start..]);
                Ok(StoredValue::Sealed(SealedValue(Sealed {
                    iv,
                    ciphertext: body[IV_LEN..tag_start].to_vec(),
                    tag,
                })))
            }
            other => Err(CodecError::UnknownFrame(other)),
        }
    }

    pub fn to_frame(&self) -> Vec<u8> {
        match self {
            StoredValue::Plain(v) => v.to_frame(),
            StoredValue::Sealed(v) => v.to_frame(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, StoredValue::Sealed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_frame_layout() {
        let frame = PlainValue::new(b"abc".to_vec()).to_frame();
        assert_eq!(frame, vec![0x00, b'a', b'b', b'c']);
    }

    #[test]
    fn test_sealed_frame_has_fixed_overhead() {
        // Arrange
        let key = AeadKey::from_bytes([9; 16]);

        // Act
        let frame = SealedValue::seal(b"hello", &key).unwrap().to_frame();

        // Assert
        assert_eq!(frame[0], FRAME_SEALED);
        assert_eq!(frame.len(), 5 + SEALED_OVERHEAD);
        assert_eq!(SEALED_OVERHEAD, 29);
    }

    #[test]
    fn test_sealed_frame_parses_and_opens() {
        let key = AeadKey::from_bytes([9; 16]);
        let frame = SealedValue::seal(b"hello", &key).unwrap().to_frame();
        match StoredValue::from_frame(&frame).unwrap() {
            StoredValue::Sealed(v) => assert_eq!(v.open(&key).unwrap(), b"hello"),
            other => panic!("expected sealed value, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_value_is_rejected() {
        assert!(matches!(
            StoredValue::from_frame(&[]),
            Err(CodecError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_short_sealed_value_is_rejected() {
        let frame = [FRAME_SEALED; 20];
        assert!(matches!(
            StoredValue::from_frame(&frame),
            Err(CodecError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_unknown_frame_byte_is_rejected() {
        assert_eq!(
            StoredValue::from_frame(&[0x02, 1, 2]),
            Err(CodecError::UnknownFrame(0x02))
        );
    }
}
