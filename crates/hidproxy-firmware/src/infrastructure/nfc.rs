//! NFC key service: unlock by tapping a tag that carries the AES key.
//!
//! The reader driver is an external collaborator.  While the device is
//! sealed, executor D polls [`NfcKeyService::try_read_key`] once per tick; a
//! key that matches the stored password hash unseals the device, anything
//! else is reported back through [`NfcKeyService::bad_key`] so the reader
//! can signal the failure.
//!
//! Writing works the other way round: the PRINT command hands the current
//! key to [`NfcKeyService::write_key`] with an absolute deadline.  The
//! adapter keeps the request until a tag is presented and discards it once
//! the deadline has passed.

use std::time::Instant;

use hidproxy_core::crypto::AeadKey;
use tracing::warn;

/// Result of one poll of the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NfcRead {
    NoTag,
    /// A tag with a well-formed key record.
    Key(AeadKey),
    /// A tag was present but carried no usable key.
    BadKey,
}

/// Contract with the NFC reader driver.
#[cfg_attr(test, mockall::automock)]
pub trait NfcKeyService: Send {
    fn try_read_key(&mut self) -> NfcRead;

    /// Tells the reader the last key it produced was rejected.
    fn bad_key(&mut self);

    /// Queues `key` to be written to the next tag presented before `deadline`.
    fn write_key(&mut self, key: &AeadKey, deadline: Instant);
}

/// Used when no reader is fitted.
#[derive(Debug, Default)]
pub struct NullNfc;

impl NfcKeyService for NullNfc {
    fn try_read_key(&mut self) -> NfcRead {
        NfcRead::NoTag
    }

    fn bad_key(&mut self) {}

    fn write_key(&mut self, _key: &AeadKey, _deadline: Instant) {
        warn!("nfc: no reader fitted, key not written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_reader_never_sees_a_tag() {
        let mut nfc = NullNfc;
        assert_eq!(nfc.try_read_key(), NfcRead::NoTag);
    }
}
