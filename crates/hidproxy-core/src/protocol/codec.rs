//! Binary codec for persisted keydefs and the `keydef.0xHH` key namespace.
//!
//! Wire format (little-endian):
//! ```text
//! [trigger:1][require_unlock:1][count:2] then `count` actions:
//!   0x01 HID     [report:8]
//!   0x02 MQTT    [topic_len:1][topic][payload_len:1][payload]
//!   0x03 Delay   [millis:4]
//!   0x04 Mouse   [buttons:1][dx:1][dy:1][wheel:1]
//! ```
//! The encoded size is fully determined by the action list, so no outer
//! length field is stored.

use thiserror::Error;

use crate::domain::keydef::{Keydef, KeydefError, MacroAction, MAX_ACTIONS, MAX_MQTT_FIELD_LEN};
use crate::domain::report::{KeyboardReport, KEYBOARD_REPORT_LEN};

/// KV store key prefix shared by every macro definition.
pub const KEYDEF_PREFIX: &str = "keydef.";

/// Size of the fixed keydef header.
pub const KEYDEF_HEADER_LEN: usize = 4;

const TAG_HID: u8 = 0x01;
const TAG_MQTT: u8 = 0x02;
const TAG_DELAY: u8 = 0x03;
const TAG_MOUSE: u8 = 0x04;

/// Errors that can occur while decoding a persisted keydef.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended before the structure it describes.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// An action tag this version does not know.
    #[error("unknown action tag 0x{tag:02X} at offset {offset}")]
    UnknownActionTag { tag: u8, offset: usize },

    /// The header declares more actions than a keydef may hold.
    #[error("keydef declares {0} actions, limit is {MAX_ACTIONS}")]
    TooManyActions(usize),

    /// Bytes left over after the last declared action.
    #[error("{0} trailing bytes after the last action")]
    TrailingBytes(usize),

    /// A stored value starts with a frame byte other than plain or sealed.
    #[error("unknown value frame header 0x{0:02X}")]
    UnknownFrame(u8),

    /// A field decoded but its value is not acceptable.
    #[error("malformed keydef: {0}")]
    Malformed(String),
}

impl From<KeydefError> for CodecError {
    fn from(err: KeydefError) -> Self {
        CodecError::Malformed(err.to_string())
    }
}

// ── Key names ─────────────────────────────────────────────────────────────────

/// The KV store key for `trigger`: `keydef.0x` followed by two uppercase hex digits.
pub fn keydef_key(trigger: u8) -> String {
    format!("{KEYDEF_PREFIX}0x{}", hex::encode_upper([trigger]))
}

/// Parses the trigger back out of a `keydef.0xHH` key.  Accepts either hex
/// case; returns `None` for anything else, including trigger 0.
pub fn parse_keydef_key(key: &str) -> Option<u8> {
    let suffix = key.strip_prefix(KEYDEF_PREFIX)?;
    let digits = suffix
        .strip_prefix("0x")
        .or_else(|| suffix.strip_prefix("0X"))?;
    if digits.len() != 2 {
        return None;
    }
    let decoded = hex::decode(digits).ok()?;
    match decoded.as_slice() {
        [0] => None,
        [trigger] => Some(*trigger),
        _ => None,
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a keydef into its persisted byte form.
///
/// # Examples
///
/// ```rust
/// use hidproxy_core::domain::{Keydef, KeyboardReport};
/// use hidproxy_core::protocol::{decode_keydef, encode_keydef};
///
/// let mut def = Keydef::new(0x04, true).unwrap();
/// def.push_report(KeyboardReport::key(0, 0x05)).unwrap();
/// let bytes = encode_keydef(&def);
/// assert_eq!(decode_keydef(&bytes).unwrap(), def);
/// ```
pub fn encode_keydef(def: &Keydef) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(def));
    buf.push(def.trigger());
    buf.push(u8::from(def.require_unlock));
    buf.extend_from_slice(&(def.len() as u16).to_le_bytes());
    for action in def.actions() {
        encode_action(&mut buf, action);
    }
    buf
}

/// Number of bytes [`encode_keydef`] will produce.
pub fn encoded_len(def: &Keydef) -> usize {
    KEYDEF_HEADER_LEN + def.actions().iter().map(action_len).sum::<usize>()
}

/// Decodes a persisted keydef.
///
/// # Errors
///
/// Returns [`CodecError`] for truncated input, unknown action tags, a count
/// above [`MAX_ACTIONS`], trailing bytes, trigger 0 or over-long MQTT fields.
pub fn decode_keydef(bytes: &[u8]) -> Result<Keydef, CodecError> {
    require_len(bytes, 0, KEYDEF_HEADER_LEN)?;
    let trigger = bytes[0];
    let require_unlock = match bytes[1] {
        0 => false,
        1 => true,
        other => {
            return Err(CodecError::Malformed(format!(
                "require_unlock byte is 0x{other:02X}"
            )))
        }
    };
    let count = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    if count > MAX_ACTIONS {
        return Err(CodecError::TooManyActions(count));
    }

    let mut actions = Vec::with_capacity(count);
    let mut offset = KEYDEF_HEADER_LEN;
    for _ in 0..count {
        let (action, next) = decode_action(bytes, offset)?;
        actions.push(action);
        offset = next;
    }
    if offset != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - offset));
    }

    Ok(Keydef::with_actions(trigger, require_unlock, actions)?)
}

// ── Action encoding ───────────────────────────────────────────────────────────

fn encode_action(buf: &mut Vec<u8>, action: &MacroAction) {
    match action {
        MacroAction::Hid(report) => {
            buf.push(TAG_HID);
            buf.extend_from_slice(&report.to_bytes());
        }
        MacroAction::Mqtt { topic, payload } => {
            buf.push(TAG_MQTT);
            write_short_string(buf, topic);
            write_short_string(buf, payload);
        }
        MacroAction::Delay { millis } => {
            buf.push(TAG_DELAY);
            buf.extend_from_slice(&millis.to_le_bytes());
        }
        MacroAction::MouseMove {
            buttons,
            dx,
            dy,
            wheel,
        } => {
            buf.push(TAG_MOUSE);
            buf.extend_from_slice(&[*buttons, *dx as u8, *dy as u8, *wheel as u8]);
        }
    }
}

fn action_len(action: &MacroAction) -> usize {
    1 + match action {
        MacroAction::Hid(_) => KEYBOARD_REPORT_LEN,
        MacroAction::Mqtt { topic, payload } => {
            2 + topic.len().min(MAX_MQTT_FIELD_LEN) + payload.len().min(MAX_MQTT_FIELD_LEN)
        }
        MacroAction::Delay { .. } => 4,
        MacroAction::MouseMove { .. } => 4,
    }
}

// ── Action decoding ───────────────────────────────────────────────────────────

fn decode_action(buf: &[u8], offset: usize) -> Result<(MacroAction, usize), CodecError> {
    require_len(buf, offset, 1)?;
    let tag = buf[offset];
    let body = offset + 1;
    match tag {
        TAG_HID => {
            require_len(buf, body, KEYBOARD_REPORT_LEN)?;
            let report = KeyboardReport::from_bytes(&buf[body..body + KEYBOARD_REPORT_LEN])
                .ok_or(CodecError::InsufficientData {
                    needed: body + KEYBOARD_REPORT_LEN,
                    available: buf.len(),
                })?;
            Ok((MacroAction::Hid(report), body + KEYBOARD_REPORT_LEN))
        }
        TAG_MQTT => {
            let (topic, next) = read_short_string(buf, body)?;
            let (payload, next) = read_short_string(buf, next)?;
            Ok((MacroAction::mqtt(topic, payload)?, next))
        }
        TAG_DELAY => {
            require_len(buf, body, 4)?;
            let millis =
                u32::from_le_bytes([buf[body], buf[body + 1], buf[body + 2], buf[body + 3]]);
            Ok((MacroAction::Delay { millis }, body + 4))
        }
        TAG_MOUSE => {
            require_len(buf, body, 4)?;
            Ok((
                MacroAction::MouseMove {
                    buttons: buf[body],
                    dx: buf[body + 1] as i8,
                    dy: buf[body + 2] as i8,
                    wheel: buf[body + 3] as i8,
                },
                body + 4,
            ))
        }
        other => Err(CodecError::UnknownActionTag { tag: other, offset }),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_len(buf: &[u8], offset: usize, len: usize) -> Result<(), CodecError> {
    if buf.len() < offset + len {
        Err(CodecError::InsufficientData {
            needed: offset + len,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Writes a u8-length-prefixed string.  Callers go through
/// [`MacroAction::mqtt`], so the length always fits.
fn write_short_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(MAX_MQTT_FIELD_LEN);
    buf.push(len as u8);
    buf.extend_from_slice(&bytes[..len]);
}

fn read_short_string(buf: &[u8], offset: usize) -> Result<(String, usize), CodecError> {
    require_len(buf, offset, 1)?;
    let len = buf[offset] as usize;
    let start = offset + 1;
    require_len(buf, start, len)?;
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| CodecError::Malformed(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Keydef {
        Keydef::with_actions(
            0x3A,
            false,
            vec![
                MacroAction::Hid(KeyboardReport::key(0x02, 0x04)),
                MacroAction::mqtt("home/lights", "on").unwrap(),
                MacroAction::Delay { millis: 250 },
                MacroAction::MouseMove {
                    buttons: 1,
                    dx: -5,
                    dy: 7,
                    wheel: 0,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_header_layout() {
        // Arrange
        let def = Keydef::with_actions(
            0x04,
            true,
            vec![MacroAction::Hid(KeyboardReport::key(0, 0x05))],
        )
        .unwrap();

        // Act
        let bytes = encode_keydef(&def);

        // Assert
        assert_eq!(&bytes[..4], &[0x04, 0x01, 0x01, 0x00]);
        assert_eq!(bytes[4], TAG_HID);
        assert_eq!(&bytes[5..], &[0, 0, 0x05, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_all_action_kinds_survive() {
        let def = sample();
        let bytes = encode_keydef(&def);
        assert_eq!(bytes.len(), encoded_len(&def));
        assert_eq!(decode_keydef(&bytes).unwrap(), def);
    }

    #[test]
    fn test_full_keydef_survives() {
        let actions = vec![MacroAction::Hid(KeyboardReport::key(0, 0x05)); MAX_ACTIONS];
        let def = Keydef::with_actions(0x04, true, actions).unwrap();
        assert_eq!(decode_keydef(&encode_keydef(&def)).unwrap().len(), MAX_ACTIONS);
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let bytes = encode_keydef(&sample());
        let err = decode_keydef(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::InsufficientData { .. }));
    }

    #[test]
    fn test_short_header_is_rejected() {
        assert_eq!(
            decode_keydef(&[0x04, 0x01]),
            Err(CodecError::InsufficientData {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let bytes = [0x04, 0x01, 0x01, 0x00, 0x7F];
        assert_eq!(
            decode_keydef(&bytes),
            Err(CodecError::UnknownActionTag {
                tag: 0x7F,
                offset: 4
            })
        );
    }

    #[test]
    fn test_count_above_limit_is_rejected() {
        let bytes = [0x04, 0x01, 65, 0x00];
        assert_eq!(decode_keydef(&bytes), Err(CodecError::TooManyActions(65)));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut bytes = encode_keydef(&sample());
        bytes.push(0);
        assert_eq!(decode_keydef(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_trigger_zero_is_rejected_on_decode() {
        let bytes = [0x00, 0x01, 0x00, 0x00];
        assert!(matches!(decode_keydef(&bytes), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_keydef_key_is_uppercase_hex() {
        assert_eq!(keydef_key(0x3A), "keydef.0x3A");
        assert_eq!(keydef_key(0x04), "keydef.0x04");
    }

    #[test]
    fn test_parse_keydef_key() {
        assert_eq!(parse_keydef_key("keydef.0x3A"), Some(0x3A));
        assert_eq!(parse_keydef_key("keydef.0x3a"), Some(0x3A));
        assert_eq!(parse_keydef_key("keydef.0x00"), None);
        assert_eq!(parse_keydef_key("keydef.0x123"), None);
        assert_eq!(parse_keydef_key("keydef.3A"), None);
        assert_eq!(parse_keydef_key("wifi.ssid"), None);
    }
}
