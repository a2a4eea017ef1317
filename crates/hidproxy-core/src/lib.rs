//! # hidproxy-core
//!
//! Shared library for the HID proxy firmware: report types, the device status
//! enum, the macro ("keydef") model, key code tables, the persisted and
//! textual macro formats, report-descriptor parsing, and the crypto used to
//! protect private macros.
//!
//! It performs no I/O and knows nothing about USB stacks, flash or sockets.
//!
//! # Architecture overview (for beginners)
//!
//! The proxy sits on the cable between a physical keyboard and a computer.
//! Keystrokes normally pass straight through.  Holding both Shift keys and
//! releasing them escapes into a small command language: unlock with a
//! password, record a macro, lock again.  Recorded macros are kept in flash,
//! private ones encrypted under a key derived from the password.
//!
//! This crate is the shared foundation:
//!
//! - **`domain`** – keyboard and mouse reports, device status, keydefs.
//! - **`keymap`** – keycode constants and the mnemonic and character tables.
//! - **`protocol`** – how keydefs are laid out in flash, how stored values are
//!   framed, the `macros.txt` format, and report-descriptor parsing.
//! - **`crypto`** – password stretching, AES-GCM sealing, password hashes.

pub mod crypto;
pub mod domain;
pub mod keymap;
pub mod protocol;

pub use crypto::{AeadKey, CryptoError, PasswordBuffer};
pub use domain::{
    DeviceStatus, DownstreamRecord, KeyboardReport, Keydef, KeydefError, MacroAction, MouseReport,
    UpstreamReport,
};
pub use protocol::codec::{decode_keydef, encode_keydef, CodecError};
pub use protocol::text::{parse_macros, serialize_macros, MacroParseError};
