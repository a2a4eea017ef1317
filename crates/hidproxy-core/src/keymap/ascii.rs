//! Character ↔ keystroke table for the textual macro format.
//!
//! The device types text on behalf of the user, so each character must map
//! to the physical key (plus Shift) that produces it on the host.  The table
//! follows the UK ISO layout the device ships for: `"` is Shift+2, `@` is
//! Shift+apostrophe, `#` and `~` share the key next to Enter, and `£` is
//! Shift+3.

use crate::keymap::hid::ModifierFlags;

/// A single key press that produces a character on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    pub modifier: u8,
    pub keycode: u8,
}

const NONE: u8 = 0;
const SHIFT: u8 = ModifierFlags::LEFT_SHIFT;

const fn ks(modifier: u8, keycode: u8) -> Keystroke {
    Keystroke { modifier, keycode }
}

/// `(character, keystroke)` pairs.  Each keystroke appears at most once.
const TABLE: &[(char, Keystroke)] = &[
    (' ', ks(NONE, 0x2C)),
    ('!', ks(SHIFT, 0x1E)),
    ('"', ks(SHIFT, 0x1F)),
    ('#', ks(NONE, 0x32)),
    ('$', ks(SHIFT, 0x21)),
    ('%', ks(SHIFT, 0x22)),
    ('&', ks(SHIFT, 0x24)),
    ('\'', ks(NONE, 0x34)),
    ('(', ks(SHIFT, 0x26)),
    (')', ks(SHIFT, 0x27)),
    ('*', ks(SHIFT, 0x25)),
    ('+', ks(SHIFT, 0x2E)),
    (',', ks(NONE, 0x36)),
    ('-', ks(NONE, 0x2D)),
    ('.', ks(NONE, 0x37)),
    ('/', ks(NONE, 0x38)),
    ('0', ks(NONE, 0x27)),
    ('1', ks(NONE, 0x1E)),
    ('2', ks(NONE, 0x1F)),
    ('3', ks(NONE, 0x20)),
    ('4', ks(NONE, 0x21)),
    ('5', ks(NONE, 0x22)),
    ('6', ks(NONE, 0x23)),
    ('7', ks(NONE, 0x24)),
    ('8', ks(NONE, 0x25)),
    ('9', ks(NONE, 0x26)),
    (':', ks(SHIFT, 0x33)),
    (';', ks(NONE, 0x33)),
    ('<', ks(SHIFT, 0x36)),
    ('=', ks(NONE, 0x2E)),
    ('>', ks(SHIFT, 0x37)),
    ('?', ks(SHIFT, 0x38)),
    ('@', ks(SHIFT, 0x34)),
    ('[', ks(NONE, 0x2F)),
    ('\\', ks(NONE, 0x31)),
    (']', ks(NONE, 0x30)),
    ('^', ks(SHIFT, 0x23)),
    ('_', ks(SHIFT, 0x2D)),
    ('`', ks(NONE, 0x35)),
    ('{', ks(SHIFT, 0x2F)),
    ('|', ks(SHIFT, 0x31)),
    ('}', ks(SHIFT, 0x30)),
    ('~', ks(SHIFT, 0x32)),
    ('£', ks(SHIFT, 0x20)),
];

/// Returns the keystroke that types `ch`, or `None` if the layout has no key for it.
pub fn keystroke_for(ch: char) -> Option<Keystroke> {
    match ch {
        'a'..='z' => Some(ks(NONE, 0x04 + (ch as u8 - b'a'))),
        'A'..='Z' => Some(ks(SHIFT, 0x04 + (ch as u8 - b'A'))),
        _ => TABLE.iter().find(|(c, _)| *c == ch).map(|(_, k)| *k),
    }
}

/// Returns the character produced by `keycode` with `modifier` held.
///
/// Only an exact modifier match counts: Right-Shift+a is not `A` here, so the
/// serializer never rewrites a report the user recorded with a different
/// shift key into a different report.
pub fn char_for(modifier: u8, keycode: u8) -> Option<char> {
    match (modifier, keycode) {
        (NONE, 0x04..=0x1D) => Some((b'a' + (keycode - 0x04)) as char),
        (SHIFT, 0x04..=0x1D) => Some((b'A' + (keycode - 0x04)) as char),
        _ => TABLE
            .iter()
            .find(|(_, k)| k.modifier == modifier && k.keycode == keycode)
            .map(|(c, _)| *c),
    }
}
