//! Typed view of the key/value store for macros and the password hash.
//!
//! Keydefs live under `keydef.0xHH`.  Private keydefs (`require_unlock`) are
//! written as [`SealedValue`]s under the derived key; public ones as
//! [`PlainValue`]s.  The password hash lives in plain framing under
//! [`PASSWORD_HASH_KEY`].
//!
//! Only executor D owns a `MacroStore`.

use hidproxy_core::crypto::{password_hash, verify_password_hash, AeadKey, CryptoError};
use hidproxy_core::domain::Keydef;
use hidproxy_core::protocol::{
    decode_keydef, encode_keydef, keydef_key, parse_keydef_key, CodecError, PlainValue,
    SealedValue, StoredValue, KEYDEF_PREFIX,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infrastructure::kvstore::{KvError, KvStore};

/// Key of the SHA-256 of the derived key.
pub const PASSWORD_HASH_KEY: &str = "auth.password_hash";

/// Error type for macro store operations.
#[derive(Debug, Error)]
pub enum MacroStoreError {
    #[error("not found")]
    NotFound,

    /// Wrong key, or a tampered value.
    #[error("authentication failed")]
    AuthFailed,

    /// A private value was requested or written without a key.
    #[error("device is sealed")]
    Locked,

    #[error("value at {key} carries trigger {found:#04x}")]
    TriggerMismatch { key: String, found: u8 },

    #[error("keydef encoding: {0}")]
    Codec(#[from] CodecError),

    #[error("storage: {0}")]
    Kv(KvError),

    #[error("crypto: {0}")]
    Crypto(CryptoError),
}

impl From<KvError> for MacroStoreError {
    fn from(e: KvError) -> Self {
        match e {
            KvError::NotFound => MacroStoreError::NotFound,
            other => MacroStoreError::Kv(other),
        }
    }
}

impl From<CryptoError> for MacroStoreError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthFailed => MacroStoreError::AuthFailed,
            other => MacroStoreError::Crypto(other),
        }
    }
}

/// Macro and password persistence.
#[derive(Debug)]
pub struct MacroStore {
    kv: KvStore,
}

impl MacroStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut KvStore {
        &mut self.kv
    }

    // ── Keydefs ───────────────────────────────────────────────────────────────

    /// Persists `def`, replacing any keydef with the same trigger.
    ///
    /// # Errors
    ///
    /// Returns [`MacroStoreError::Locked`] for a private keydef without a key,
    /// or the underlying storage error.
    pub fn save(&mut self, def: &Keydef, key: Option<&AeadKey>) -> Result<(), MacroStoreError> {
        let name = keydef_key(def.trigger());
        let encoded = encode_keydef(def);
        if def.require_unlock {
            let key = key.ok_or(MacroStoreError::Locked)?;
            self.kv.set_sealed(&name, &SealedValue::seal(&encoded, key)?)?;
        } else {
            self.kv.set_plain(&name, &PlainValue::new(encoded))?;
        }
        debug!(
            trigger = def.trigger(),
            actions = def.len(),
            private = def.require_unlock,
            "macro saved"
        );
        Ok(())
    }

    /// Loads the keydef for `trigger`.
    ///
    /// # Errors
    ///
    /// - [`MacroStoreError::NotFound`] if nothing is stored (or the record is
    ///   unreadable).
    /// - [`MacroStoreError::Locked`] for a private keydef when `key` is `None`.
    /// - [`MacroStoreError::AuthFailed`] when `key` does not open it.
    /// - [`MacroStoreError::TriggerMismatch`] if the stored trigger disagrees
    ///   with the key name.
    pub fn load(&self, trigger: u8, key: Option<&AeadKey>) -> Result<Keydef, MacroStoreError> {
        let name = keydef_key(trigger);
        let bytes = match self.kv.get_stored(&name)? {
            StoredValue::Plain(value) => value.into_bytes(),
            StoredValue::Sealed(value) => value.open(key.ok_or(MacroStoreError::Locked)?)?,
        };
        let def = decode_keydef(&bytes)?;
        if def.trigger() != trigger {
            return Err(MacroStoreError::TriggerMismatch {
                key: name,
                found: def.trigger(),
            });
        }
        Ok(def)
    }

    /// Removes the keydef for `trigger`.  Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Propagates storage write failures.
    pub fn delete(&mut self, trigger: u8) -> Result<bool, MacroStoreError> {
        Ok(self.kv.delete(&keydef_key(trigger))?)
    }

    /// Triggers of every stored keydef, ascending.  Trigger 0 is never listed.
    pub fn list(&self) -> Vec<u8> {
        let mut triggers: Vec<u8> = self
            .kv
            .find(KEYDEF_PREFIX)
            .iter()
            .filter_map(|name| parse_keydef_key(name))
            .filter(|&t| t != 0)
            .collect();
        triggers.sort_unstable();
        triggers.dedup();
        triggers
    }

    /// Every keydef readable with `key`.  Unreadable ones are logged and
    /// skipped.
    pub fn load_all(&self, key: Option<&AeadKey>) -> Vec<Keydef> {
        self.list()
            .into_iter()
            .filter_map(|trigger| match self.load(trigger, key) {
                Ok(def) => Some(def),
                Err(e) => {
                    warn!(trigger, error = %e, "skipping unreadable macro");
                    None
                }
            })
            .collect()
    }

    /// Deletes every keydef, then saves `defs`.  Returns how many were saved.
    ///
    /// Not atomic: a failure part-way leaves the earlier writes in place.
    ///
    /// # Errors
    ///
    /// As for [`MacroStore::save`] and [`MacroStore::delete`].
    pub fn replace_all(
        &mut self,
        defs: &[Keydef],
        key: Option<&AeadKey>,
    ) -> Result<usize, MacroStoreError> {
        if key.is_none() && defs.iter().any(|d| d.require_unlock) {
            return Err(MacroStoreError::Locked);
        }
        for trigger in self.list() {
            self.delete(trigger)?;
        }
        for def in defs {
            self.save(def, key)?;
        }
        info!(count = defs.len(), "macros replaced");
        Ok(defs.len())
    }

    // ── Password ──────────────────────────────────────────────────────────────

    pub fn has_password_hash(&self) -> bool {
        self.kv.contains(PASSWORD_HASH_KEY)
    }

    /// Checks `key` against the stored hash in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`MacroStoreError::NotFound`] when no password has been set.
    pub fn check_password(&self, key: &AeadKey) -> Result<bool, MacroStoreError> {
        let stored = self.kv.get(PASSWORD_HASH_KEY, None)?;
        Ok(verify_password_hash(key, &stored.bytes))
    }

    /// Checks `key` against the stored hash.  With no hash stored this is
    /// first-time setup: the hash of `key` is written and the check passes.
    ///
    /// # Errors
    ///
    /// Propagates storage read and write failures.
    pub fn validate_password(&mut self, key: &AeadKey) -> Result<bool, MacroStoreError> {
        match self.check_password(key) {
            Err(MacroStoreError::NotFound) => {
                self.set_password_hash(key)?;
                info!("first password stored");
                Ok(true)
            }
            checked => checked,
        }
    }

    /// Stores the hash of `key` as the password.
    ///
    /// # Errors
    ///
    /// Propagates storage write failures.
    pub fn set_password_hash(&mut self, key: &AeadKey) -> Result<(), MacroStoreError> {
        self.kv
            .set_plain(PASSWORD_HASH_KEY, &PlainValue::new(password_hash(key).to_vec()))?;
        Ok(())
    }

    /// Re-seals every sealed value (private keydefs and `wifi.password`)
    /// under `new`, then writes the new password hash.  Returns how many
    /// values were re-sealed.
    ///
    /// Each value is rewritten atomically, the set as a whole is not.  A
    /// value that does not open under `old` is left untouched and logged.
    ///
    /// # Errors
    ///
    /// Propagates storage write failures; the hash is only written once every
    /// value has been handled.
    pub fn change_password(&mut self, old: &AeadKey, new: &AeadKey) -> Result<usize, MacroStoreError> {
        let mut resealed = 0;
        for name in self.kv.find("") {
            let value = match self.kv.get_stored(&name) {
                Ok(StoredValue::Sealed(value)) => value,
                Ok(StoredValue::Plain(_)) | Err(KvError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            };
            match value.open(old) {
                Ok(plain) => {
                    self.kv.set_sealed(&name, &SealedValue::seal(&plain, new)?)?;
                    resealed += 1;
                }
                Err(_) => warn!(key = %name, "value does not open under the current key"),
            }
        }
        self.set_password_hash(new)?;
        info!(resealed, "password changed");
        Ok(resealed)
    }

    /// Deletes every stored key: macros, settings and the password hash.
    ///
    /// # Errors
    ///
    /// Propagates storage write failures.
    pub fn wipe(&mut self) -> Result<(), MacroStoreError> {
        for name in self.kv.find("") {
            self.kv.delete(&name)?;
        }
        info!("device wiped");
        Ok(())
    }
}
