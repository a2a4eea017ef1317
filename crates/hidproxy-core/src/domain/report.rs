//! HID report values and the records that carry them between executors.
//!
//! # Report shapes (for beginners)
//!
//! A boot-protocol keyboard sends an eight-byte *report* every time its
//! state changes:
//!
//! ```text
//! [modifier][reserved][key1][key2][key3][key4][key5][key6]
//! ```
//!
//! `modifier` is a bitmap (see [`ModifierFlags`]); each `keyN` slot holds the
//! HID Usage ID of a key currently held down, or 0 for an empty slot.  A
//! report with every byte zero means "nothing is pressed" and is called a
//! *release-all* report.
//!
//! Mouse reports are shorter: buttons, X delta, Y delta, wheel and pan.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keymap::hid::ModifierFlags;

/// Size of a boot-protocol keyboard report.
pub const KEYBOARD_REPORT_LEN: usize = 8;

/// Size of the mouse report forwarded downstream.
pub const MOUSE_REPORT_LEN: usize = 5;

/// Largest raw report the upstream side will queue.  Matches the full-speed
/// interrupt endpoint packet size.
pub const MAX_UPSTREAM_REPORT_LEN: usize = 64;

/// Largest report the downstream interface ever sends (the keyboard report).
pub const MAX_DOWNSTREAM_REPORT_LEN: usize = KEYBOARD_REPORT_LEN;

/// Downstream interface carrying both keyboard and mouse reports.
pub const ITF_KEYBOARD: u8 = 0;

/// Report id of the keyboard collection on the downstream interface.
pub const REPORT_ID_KEYBOARD: u8 = 1;

/// Report id of the mouse collection on the downstream interface.
pub const REPORT_ID_MOUSE: u8 = 2;

/// A report buffer was larger than the record can carry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("report of {len} bytes exceeds the {max}-byte inline buffer")]
pub struct ReportTooLong {
    pub len: usize,
    pub max: usize,
}

// ── Keyboard report ───────────────────────────────────────────────────────────

/// An eight-byte boot-protocol keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyboardReport {
    pub modifier: u8,
    pub reserved: u8,
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    /// Every key and modifier released.
    pub const RELEASE_ALL: KeyboardReport = KeyboardReport {
        modifier: 0,
        reserved: 0,
        keycodes: [0; 6],
    };

    /// Builds a report with the given modifier and up to six keycodes.
    pub fn new(modifier: u8, keycodes: [u8; 6]) -> Self {
        Self {
            modifier,
            reserved: 0,
            keycodes,
        }
    }

    /// Builds a report holding a single key (or none when `keycode` is 0).
    pub fn key(modifier: u8, keycode: u8) -> Self {
        Self::new(modifier, [keycode, 0, 0, 0, 0, 0])
    }

    /// Parses the first eight bytes of `bytes`.  Returns `None` if fewer are available.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < KEYBOARD_REPORT_LEN {
            return None;
        }
        let mut keycodes = [0u8; 6];
        keycodes.copy_from_slice(&bytes[2..8]);
        Some(Self {
            modifier: bytes[0],
            reserved: bytes[1],
            keycodes,
        })
    }

    /// Returns the wire representation.
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_LEN] {
        let mut out = [0u8; KEYBOARD_REPORT_LEN];
        out[0] = self.modifier;
        out[1] = self.reserved;
        out[2..].copy_from_slice(&self.keycodes);
        out
    }

    /// The first non-zero keycode in the report, or 0 when no key is held.
    pub fn first_key(&self) -> u8 {
        self.keycodes.iter().copied().find(|&k| k != 0).unwrap_or(0)
    }

    /// Returns `true` if no key slot is occupied.
    pub fn has_no_keys(&self) -> bool {
        self.keycodes.iter().all(|&k| k == 0)
    }

    /// Returns `true` when nothing at all is held.
    pub fn is_release_all(&self) -> bool {
        self.modifier == 0 && self.has_no_keys()
    }

    /// Returns `true` for the first edge of the magic sequence: both shift
    /// keys held and no other key or modifier.
    pub fn is_magic(&self) -> bool {
        ModifierFlags(self.modifier).is_both_shifts() && self.has_no_keys()
    }

    /// Returns `true` when both shifts are held together with `keycode`.
    pub fn is_magic_chord(&self, keycode: u8) -> bool {
        ModifierFlags(self.modifier).is_both_shifts() && self.first_key() == keycode
    }
}

impl fmt::Display for KeyboardReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "[{:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {:02x} {:02x}]",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

// ── Mouse report ──────────────────────────────────────────────────────────────

/// A relative mouse report: buttons, X/Y deltas, vertical wheel, horizontal pan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MouseReport {
    pub buttons: u8,
    pub x: i8,
    pub y: i8,
    pub wheel: i8,
    pub pan: i8,
}

impl MouseReport {
    /// Parses a boot or report-protocol mouse report.  Boot mice send only
    /// three bytes; missing trailing fields read as zero.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }
        let at = |i: usize| bytes.get(i).copied().unwrap_or(0) as i8;
        Some(Self {
            buttons: bytes[0],
            x: at(1),
            y: at(2),
            wheel: at(3),
            pan: at(4),
        })
    }

    /// Returns the wire representation.
    pub fn to_bytes(&self) -> [u8; MOUSE_REPORT_LEN] {
        [
            self.buttons,
            self.x as u8,
            self.y as u8,
            self.wheel as u8,
            self.pan as u8,
        ]
    }
}

// ── Upstream record ───────────────────────────────────────────────────────────

/// The interface protocol the upstream device declared in its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceProtocol {
    /// Not a boot device: reports must be interpreted via the report descriptor.
    None,
    Keyboard,
    Mouse,
}

impl InterfaceProtocol {
    /// Maps the `bInterfaceProtocol` value of a HID interface.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => InterfaceProtocol::Keyboard,
            2 => InterfaceProtocol::Mouse,
            _ => InterfaceProtocol::None,
        }
    }
}

/// Identifies one upstream HID interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub dev_addr: u8,
    pub instance: u8,
}

/// Report payload as delivered by the upstream host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamPayload {
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
    /// A report from a non-boot interface, still to be classified.
    Raw {
        len: u8,
        bytes: [u8; MAX_UPSTREAM_REPORT_LEN],
    },
}

/// One report received from the physical keyboard side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamReport {
    pub source: SourceId,
    pub payload: UpstreamPayload,
}

impl UpstreamReport {
    /// Wraps a received buffer according to the interface protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ReportTooLong`] for raw reports larger than
    /// [`MAX_UPSTREAM_REPORT_LEN`].  Boot keyboard and mouse reports that are
    /// too short to parse are carried as raw reports.
    pub fn from_received(
        source: SourceId,
        protocol: InterfaceProtocol,
        bytes: &[u8],
    ) -> Result<Self, ReportTooLong> {
        let parsed = match protocol {
            InterfaceProtocol::Keyboard => KeyboardReport::from_bytes(bytes).map(UpstreamPayload::Keyboard),
            InterfaceProtocol::Mouse => MouseReport::from_bytes(bytes).map(UpstreamPayload::Mouse),
            InterfaceProtocol::None => None,
        };
        let payload = match parsed {
            Some(p) => p,
            None => Self::raw_payload(bytes)?,
        };
        Ok(Self { source, payload })
    }

    fn raw_payload(bytes: &[u8]) -> Result<UpstreamPayload, ReportTooLong> {
        if bytes.len() > MAX_UPSTREAM_REPORT_LEN {
            return Err(ReportTooLong {
                len: bytes.len(),
                max: MAX_UPSTREAM_REPORT_LEN,
            });
        }
        let mut buf = [0u8; MAX_UPSTREAM_REPORT_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(UpstreamPayload::Raw {
            len: bytes.len() as u8,
            bytes: buf,
        })
    }
}

// ── Downstream record ─────────────────────────────────────────────────────────

/// One report waiting to be sent to the host computer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownstreamRecord {
    pub interface: u8,
    pub report_id: u8,
    len: u8,
    data: [u8; MAX_DOWNSTREAM_REPORT_LEN],
}

impl DownstreamRecord {
    /// Builds a record from raw parts.
    ///
    /// # Errors
    ///
    /// Returns [`ReportTooLong`] if `payload` does not fit the inline buffer.
    pub fn new(interface: u8, report_id: u8, payload: &[u8]) -> Result<Self, ReportTooLong> {
        if payload.len() > MAX_DOWNSTREAM_REPORT_LEN {
            return Err(ReportTooLong {
                len: payload.len(),
                max: MAX_DOWNSTREAM_REPORT_LEN,
            });
        }
        let mut data = [0u8; MAX_DOWNSTREAM_REPORT_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            interface,
            report_id,
            len: payload.len() as u8,
            data,
        })
    }

    /// A keyboard report on the keyboard collection.
    pub fn keyboard(report: &KeyboardReport) -> Self {
        Self {
            interface: ITF_KEYBOARD,
            report_id: REPORT_ID_KEYBOARD,
            len: KEYBOARD_REPORT_LEN as u8,
            data: report.to_bytes(),
        }
    }

    /// A mouse report on the mouse collection.
    pub fn mouse(report: &MouseReport) -> Self {
        let mut data = [0u8; MAX_DOWNSTREAM_REPORT_LEN];
        data[..MOUSE_REPORT_LEN].copy_from_slice(&report.to_bytes());
        Self {
            interface: ITF_KEYBOARD,
            report_id: REPORT_ID_MOUSE,
            len: MOUSE_REPORT_LEN as u8,
            data,
        }
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// The payload as a keyboard report, if this record carries one.
    pub fn as_keyboard(&self) -> Option<KeyboardReport> {
        if self.report_id == REPORT_ID_KEYBOARD {
            KeyboardReport::from_bytes(self.payload())
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
