//! Framed values on top of the log store.
//!
//! Every value carries the one-byte plain/sealed header.  Writers choose the
//! frame by the type they hand in ([`PlainValue`] or [`SealedValue`]); readers
//! get a [`Fetched`] value that says which frame was found and, for sealed
//! values, whether it authenticated.

use hidproxy_core::crypto::AeadKey;
use hidproxy_core::protocol::{PlainValue, SealedValue, StoredValue};
use tracing::warn;

use super::log::{KvError, LogStats, LogStore};

/// A value read back through [`KvStore::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Decrypted or plain bytes.  Empty whenever `encrypted && !authenticated`.
    pub bytes: Vec<u8>,
    pub encrypted: bool,
    /// Meaningful only for encrypted values.
    pub authenticated: bool,
}

/// Key/value store with plain and sealed framing.
#[derive(Debug)]
pub struct KvStore {
    log: LogStore,
}

impl KvStore {
    pub fn new(log: LogStore) -> Self {
        Self { log }
    }

    pub fn set_plain(&mut self, key: &str, value: &PlainValue) -> Result<(), KvError> {
        self.log.set(key, &value.to_frame())
    }

    pub fn set_sealed(&mut self, key: &str, value: &SealedValue) -> Result<(), KvError> {
        self.log.set(key, &value.to_frame())
    }

    /// Reads `key`, decrypting with `aead` when the value is sealed.
    ///
    /// A sealed value read without a key, or with the wrong one, comes back
    /// with `authenticated == false` and no bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::NotFound`] when absent.  A value that fails its
    /// checksum or carries an unknown frame byte is logged and reported as
    /// not found.
    pub fn get(&self, key: &str, aead: Option<&AeadKey>) -> Result<Fetched, KvError> {
        match self.get_stored(key)? {
            StoredValue::Plain(value) => Ok(Fetched {
                bytes: value.into_bytes(),
                encrypted: false,
                authenticated: false,
            }),
            StoredValue::Sealed(value) => {
                let opened = aead.map(|k| value.open(k));
                match opened {
                    Some(Ok(bytes)) => Ok(Fetched {
                        bytes,
                        encrypted: true,
                        authenticated: true,
                    }),
                    _ => Ok(Fetched {
                        bytes: Vec::new(),
                        encrypted: true,
                        authenticated: false,
                    }),
                }
            }
        }
    }

    /// Reads the framed value without decrypting it.
    ///
    /// # Errors
    ///
    /// As for [`KvStore::get`].
    pub fn get_stored(&self, key: &str) -> Result<StoredValue, KvError> {
        let raw = match self.log.get(key) {
            Ok(raw) => raw,
            Err(KvError::Corrupt { .. }) => return Err(KvError::NotFound),
            Err(e) => return Err(e),
        };
        StoredValue::from_frame(&raw).map_err(|e| {
            warn!(key, error = %e, "kvstore: unreadable value frame");
            KvError::NotFound
        })
    }

    pub fn delete(&mut self, key: &str) -> Result<bool, KvError> {
        self.log.delete(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.log.contains(key)
    }

    pub fn find(&self, prefix: &str) -> Vec<String> {
        self.log.find(prefix)
    }

    pub fn stats(&self) -> LogStats {
        self.log.stats()
    }

    pub fn into_log(self) -> LogStore {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kvstore::block_device::RamDevice;

    fn store() -> KvStore {
        KvStore::new(LogStore::mount(Box::new(RamDevice::new(8192, 1024))).unwrap())
    }

    #[test]
    fn test_plain_value_reads_back_unencrypted() {
        // Arrange
        let mut kv = store();

        // Act
        kv.set_plain("wifi.ssid", &PlainValue::new(b"home".to_vec())).unwrap();
        let fetched = kv.get("wifi.ssid", None).unwrap();

        // Assert
        assert_eq!(fetched.bytes, b"home");
        assert!(!fetched.encrypted);
    }

    #[test]
    fn test_sealed_value_needs_the_right_key() {
        // Arrange
        let mut kv = store();
        let key = AeadKey::from_bytes([1; 16]);
        let wrong = AeadKey::from_bytes([2; 16]);
        let sealed = SealedValue::seal(b"hunter2", &key).unwrap();
        kv.set_sealed("wifi.password", &sealed).unwrap();

        // Act
        let good = kv.get("wifi.password", Some(&key)).unwrap();
        let bad = kv.get("wifi.password", Some(&wrong)).unwrap();
        let none = kv.get("wifi.password", None).unwrap();

        // Assert
        assert!(good.encrypted && good.authenticated);
        assert_eq!(good.bytes, b"hunter2");
        for f in [bad, none] {
            assert!(f.encrypted && !f.authenticated);
            assert!(f.bytes.is_empty());
        }
    }

    #[test]
    fn test_missing_key_is_not_found() {
        assert!(matches!(store().get("nope", None), Err(KvError::NotFound)));
    }
}
