//! Key code tables.
//!
//! # Overview (for beginners)
//!
//! Everything the proxy sees on the wire is a USB HID keycode: a number that
//! names a physical key position.  Humans, however, write macros with
//! characters (`"hello"`) and key names (`ENTER`, `F5`).  This module holds the
//! two translation tables between those worlds:
//!
//! - [`mnemonic`] maps symbolic names to keycodes and back.
//! - [`ascii`] maps printable characters to the key (plus Shift) that types
//!   them on the host, and back.
//!
//! [`hid`] holds the raw constants and the modifier bitmap type.

pub mod ascii;
pub mod hid;
pub mod mnemonic;

pub use ascii::Keystroke;
pub use hid::ModifierFlags;
