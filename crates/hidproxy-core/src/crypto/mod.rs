//! Key derivation, value sealing and password verification.
//!
//! # Overview (for beginners)
//!
//! Private macros are stored encrypted.  The key is never stored: it is
//! re-derived from the password every time the user unlocks the device
//! ([`kdf`]).  Values are sealed with AES-128-GCM, which both hides and
//! authenticates them ([`aead`]): a wrong key or a flipped bit is detected
//! instead of yielding garbage.
//!
//! To tell a right password from a wrong one without decrypting anything, the
//! store keeps `SHA-256(key)` and compares it in constant time ([`password`]).

pub mod aead;
pub mod kdf;
pub mod password;

use thiserror::Error;

pub use aead::{decrypt, encrypt, AeadKey, Sealed, IV_LEN, TAG_LEN};
pub use kdf::{derive_key, DerivedKey};
pub use password::{password_hash, verify_password_hash, PasswordBuffer, MAX_PASSWORD_LEN};

/// Errors from the crypto layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Tag verification failed: wrong key or tampered data.
    #[error("authentication failed")]
    AuthFailed,

    #[error("encryption failed")]
    EncryptFailed,

    #[error("key derivation failed")]
    Kdf,
}
