//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page) and modifier bits.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The **USB Human Interface Device (HID)** standard assigns a unique number to
//! every key on a keyboard.  A boot-protocol keyboard reports up to six of
//! these numbers at a time, plus one byte of modifier bits:
//!
//! | Key          | HID Usage ID |
//! |--------------|-------------|
//! | Letter A     | 0x04        |
//! | Letter B     | 0x05        |
//! | Enter        | 0x28        |
//! | Left Ctrl    | 0xE0        |
//!
//! HID codes describe **physical key positions**, not characters.  The host
//! decides which character a position produces from its own keyboard layout.
//!
//! The proxy only needs a handful of named keys (the command keys), so this
//! module exposes plain `u8` constants rather than an enum: keydef actions
//! store arbitrary keycodes and must round-trip values this table has never
//! heard of.

// ── Command and editing keys ──────────────────────────────────────────────────

pub const KEY_NONE: u8 = 0x00;
pub const KEY_A: u8 = 0x04;
pub const KEY_D: u8 = 0x07;
pub const KEY_Z: u8 = 0x1D;
pub const KEY_1: u8 = 0x1E;
pub const KEY_0: u8 = 0x27;
pub const KEY_ENTER: u8 = 0x28;
pub const KEY_ESCAPE: u8 = 0x29;
pub const KEY_BACKSPACE: u8 = 0x2A;
pub const KEY_TAB: u8 = 0x2B;
pub const KEY_SPACE: u8 = 0x2C;
pub const KEY_MINUS: u8 = 0x2D;
pub const KEY_EQUAL: u8 = 0x2E;
pub const KEY_CAPS_LOCK: u8 = 0x39;
pub const KEY_F1: u8 = 0x3A;
pub const KEY_F12: u8 = 0x45;
pub const KEY_PRINT_SCREEN: u8 = 0x46;
pub const KEY_INSERT: u8 = 0x49;
pub const KEY_HOME: u8 = 0x4A;
pub const KEY_DELETE: u8 = 0x4C;
pub const KEY_END: u8 = 0x4D;
pub const KEY_RIGHT_ARROW: u8 = 0x4F;
pub const KEY_UP_ARROW: u8 = 0x52;

// ── Modifier keys (as keycodes, 0xE0–0xE7) ────────────────────────────────────

pub const KEY_LEFT_CTRL: u8 = 0xE0;
pub const KEY_RIGHT_GUI: u8 = 0xE7;

/// Modifier bitmap carried in byte 0 of a keyboard report.
///
/// The bit order is fixed by the HID boot protocol: the left-hand modifiers
/// occupy the low nibble and the right-hand modifiers the high nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;

    /// Both shift keys and nothing else: the in-band escape modifier (0x22).
    pub const BOTH_SHIFTS: u8 = Self::LEFT_SHIFT | Self::RIGHT_SHIFT;

    /// Returns `true` if either Ctrl modifier is active.
    pub fn ctrl(&self) -> bool {
        self.0 & (Self::LEFT_CTRL | Self::RIGHT_CTRL) != 0
    }

    /// Returns `true` if either Shift modifier is active.
    pub fn shift(&self) -> bool {
        self.0 & (Self::LEFT_SHIFT | Self::RIGHT_SHIFT) != 0
    }

    /// Returns `true` if exactly the two shift bits are set.
    pub fn is_both_shifts(&self) -> bool {
        self.0 == Self::BOTH_SHIFTS
    }
}

/// Returns `true` for keycodes in the letter range `a`..=`z`.
pub fn is_letter(keycode: u8) -> bool {
    (KEY_A..=KEY_Z).contains(&keycode)
}

/// Returns `true` for the eight modifier keycodes (0xE0–0xE7).
pub fn is_modifier_key(keycode: u8) -> bool {
    (KEY_LEFT_CTRL..=KEY_RIGHT_GUI).contains(&keycode)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_shifts_is_0x22() {
        assert_eq!(ModifierFlags::BOTH_SHIFTS, 0x22);
        assert!(ModifierFlags(0x22).is_both_shifts());
    }

    #[test]
    fn test_single_shift_is_not_both_shifts() {
        assert!(!ModifierFlags(ModifierFlags::LEFT_SHIFT).is_both_shifts());
        assert!(ModifierFlags(ModifierFlags::LEFT_SHIFT).shift());
    }

    #[test]
    fn test_both_shifts_plus_ctrl_is_not_magic() {
        let flags = ModifierFlags(0x22 | ModifierFlags::LEFT_CTRL);
        assert!(!flags.is_both_shifts());
        assert!(flags.ctrl());
    }

    #[test]
    fn test_letter_range_bounds() {
        assert!(is_letter(KEY_A));
        assert!(is_letter(KEY_Z));
        assert!(!is_letter(KEY_1));
        assert!(!is_letter(0x03));
    }

    #[test]
    fn test_modifier_key_range() {
        assert!(is_modifier_key(0xE0));
        assert!(is_modifier_key(0xE7));
        assert!(!is_modifier_key(0xE8));
        assert!(!is_modifier_key(KEY_ENTER));
    }
}
