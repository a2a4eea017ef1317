//! WiFi settings kept alongside the macros.
//!
//! `wifi.ssid`, `wifi.country` and `wifi.enabled` are plain; `wifi.password`
//! is sealed under the derived key, so it can only be read or changed while
//! unsealed.  Password changes re-seal it together with the private macros
//! (see `MacroStore::change_password`).

use hidproxy_core::crypto::AeadKey;

use crate::application::macro_store::MacroStoreError;
use crate::infrastructure::kvstore::{KvError, KvStore};

pub const WIFI_SSID_KEY: &str = "wifi.ssid";
pub const WIFI_COUNTRY_KEY: &str = "wifi.country";
pub const WIFI_ENABLED_KEY: &str = "wifi.enabled";
pub const WIFI_PASSWORD_KEY: &str = "wifi.password";

/// Station-mode WiFi configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WifiSettings {
    pub ssid: String,
    /// Two-letter regulatory domain.
    pub country: String,
    pub enabled: bool,
    /// `None` while sealed or when never set.
    pub password: Option<String>,
}

fn read_plain(kv: &KvStore, key: &str) -> Result<Option<String>, MacroStoreError> {
    match kv.get(key, None) {
        Ok(fetched) => Ok(Some(String::from_utf8_lossy(&fetched.bytes).into_owned())),
        Err(KvError::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl WifiSettings {
    /// Loads the settings.  The password is only read when `key` is given
    /// and opens it.
    ///
    /// # Errors
    ///
    /// Propagates storage read failures other than absent keys.
    pub fn load(kv: &KvStore, key: Option<&AeadKey>) -> Result<Self, MacroStoreError> {
        let password = match kv.get(WIFI_PASSWORD_KEY, key) {
            Ok(f) if f.encrypted && f.authenticated => {
                Some(String::from_utf8_lossy(&f.bytes).into_owned())
            }
            Ok(_) | Err(KvError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            ssid: read_plain(kv, WIFI_SSID_KEY)?.unwrap_or_default(),
            country: read_plain(kv, WIFI_COUNTRY_KEY)?.unwrap_or_default(),
            enabled: read_plain(kv, WIFI_ENABLED_KEY)?.as_deref() == Some("1"),
            password,
        })
    }

    /// Writes the settings.  A `Some` password needs `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MacroStoreError::Locked`] when a password is given without a
    /// key, or the underlying storage error.
    #[cfg(test)]
    pub fn save(&self, kv: &mut KvStore, key: Option<&AeadKey>) -> Result<(), MacroStoreError> {
        use hidproxy_core::protocol::{PlainValue, SealedValue};

        if let Some(password) = &self.password {
            let key = key.ok_or(MacroStoreError::Locked)?;
            kv.set_sealed(WIFI_PASSWORD_KEY, &SealedValue::seal(password.as_bytes(), key)?)?;
        }
        kv.set_plain(WIFI_SSID_KEY, &PlainValue::new(self.ssid.as_bytes().to_vec()))?;
        kv.set_plain(WIFI_COUNTRY_KEY, &PlainValue::new(self.country.as_bytes().to_vec()))?;
        let enabled: &[u8] = if self.enabled { b"1" } else { b"0" };
        kv.set_plain(WIFI_ENABLED_KEY, &PlainValue::new(enabled.to_vec()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kvstore::{LogStore, RamDevice};

    fn kv() -> KvStore {
        KvStore::new(LogStore::mount(Box::new(RamDevice::new(16 * 1024, 4096))).unwrap())
    }

    fn sample() -> WifiSettings {
        WifiSettings {
            ssid: "home".into(),
            country: "GB".into(),
            enabled: true,
            password: Some("hunter2".into()),
        }
    }

    #[test]
    fn test_settings_round_trip_with_key() {
        // Arrange
        let mut kv = kv();
        let key = AeadKey::from_bytes([9; 16]);

        // Act
        sample().save(&mut kv, Some(&key)).unwrap();
        let loaded = WifiSettings::load(&kv, Some(&key)).unwrap();

        // Assert
        assert_eq!(loaded, sample());
        assert!(kv.get_stored(WIFI_PASSWORD_KEY).unwrap().is_sealed());
        assert!(!kv.get_stored(WIFI_SSID_KEY).unwrap().is_sealed());
    }

    #[test]
    fn test_password_hidden_while_sealed() {
        let mut kv = kv();
        sample().save(&mut kv, Some(&AeadKey::from_bytes([9; 16]))).unwrap();

        let loaded = WifiSettings::load(&kv, None).unwrap();

        assert_eq!(loaded.ssid, "home");
        assert_eq!(loaded.password, None);
    }

    #[test]
    fn test_saving_password_without_key_is_refused() {
        let mut kv = kv();
        assert!(matches!(
            sample().save(&mut kv, None),
            Err(MacroStoreError::Locked)
        ));
    }

    #[test]
    fn test_missing_settings_load_as_default() {
        assert_eq!(WifiSettings::load(&kv(), None).unwrap(), WifiSettings::default());
    }
}
