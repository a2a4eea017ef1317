//! Symbolic key names used by the textual macro format.
//!
//! Names are upper-case and match exactly (`ENTER`, `F1`, `RIGHT_ARROW`).
//! The table is ordered by keycode so that reverse lookups return the first,
//! canonical name for a code.

/// `(name, keycode)` pairs, ascending by keycode.
pub const MNEMONICS: &[(&str, u8)] = &[
    ("ENTER", 0x28),
    ("ESC", 0x29),
    ("BACKSPACE", 0x2A),
    ("TAB", 0x2B),
    ("SPACE", 0x2C),
    ("CAPSLOCK", 0x39),
    ("F1", 0x3A),
    ("F2", 0x3B),
    ("F3", 0x3C),
    ("F4", 0x3D),
    ("F5", 0x3E),
    ("F6", 0x3F),
    ("F7", 0x40),
    ("F8", 0x41),
    ("F9", 0x42),
    ("F10", 0x43),
    ("F11", 0x44),
    ("F12", 0x45),
    ("PRINTSCREEN", 0x46),
    ("SCROLLLOCK", 0x47),
    ("PAUSE", 0x48),
    ("INSERT", 0x49),
    ("HOME", 0x4A),
    ("PAGEUP", 0x4B),
    ("DELETE", 0x4C),
    ("END", 0x4D),
    ("PAGEDOWN", 0x4E),
    ("RIGHT_ARROW", 0x4F),
    ("LEFT_ARROW", 0x50),
    ("DOWN_ARROW", 0x51),
    ("UP_ARROW", 0x52),
    ("NUMLOCK", 0x53),
    ("KP_DIVIDE", 0x54),
    ("KP_MULTIPLY", 0x55),
    ("KP_MINUS", 0x56),
    ("KP_PLUS", 0x57),
    ("KP_ENTER", 0x58),
    ("KP_1", 0x59),
    ("KP_2", 0x5A),
    ("KP_3", 0x5B),
    ("KP_4", 0x5C),
    ("KP_5", 0x5D),
    ("KP_6", 0x5E),
    ("KP_7", 0x5F),
    ("KP_8", 0x60),
    ("KP_9", 0x61),
    ("KP_0", 0x62),
    ("KP_DOT", 0x63),
    ("APPLICATION", 0x65),
    ("POWER", 0x66),
    ("KP_EQUALS", 0x67),
    ("F13", 0x68),
    ("F14", 0x69),
    ("F15", 0x6A),
    ("F16", 0x6B),
    ("F17", 0x6C),
    ("F18", 0x6D),
    ("F19", 0x6E),
    ("F20", 0x6F),
    ("F21", 0x70),
    ("F22", 0x71),
    ("F23", 0x72),
    ("F24", 0x73),
    ("EXECUTE", 0x74),
    ("HELP", 0x75),
    ("MENU", 0x76),
    ("SELECT", 0x77),
    ("STOP", 0x78),
    ("AGAIN", 0x79),
    ("UNDO", 0x7A),
    ("CUT", 0x7B),
    ("COPY", 0x7C),
    ("PASTE", 0x7D),
    ("FIND", 0x7E),
    ("MUTE", 0x7F),
    ("VOLUME_UP", 0x80),
    ("VOLUME_DOWN", 0x81),
    ("LOCKING_CAPS_LOCK", 0x82),
    ("LOCKING_NUM_LOCK", 0x83),
    ("LOCKING_SCROLL_LOCK", 0x84),
    ("KP_COMMA", 0x85),
    ("KP_EQUALS_AS400", 0x86),
    ("LEFT_CTRL", 0xE0),
    ("LEFT_SHIFT", 0xE1),
    ("LEFT_ALT", 0xE2),
    ("LEFT_GUI", 0xE3),
    ("RIGHT_CTRL", 0xE4),
    ("RIGHT_SHIFT", 0xE5),
    ("RIGHT_ALT", 0xE6),
    ("RIGHT_GUI", 0xE7),
];

/// Looks up the keycode for a mnemonic.  Returns `None` for unknown names.
pub fn keycode_for(name: &str) -> Option<u8> {
    MNEMONICS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

/// Returns the canonical mnemonic for a keycode, if there is one.
pub fn name_for(keycode: u8) -> Option<&'static str> {
    MNEMONICS
        .iter()
        .find(|(_, code)| *code == keycode)
        .map(|(n, _)| *n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::hid;

    #[test]
    fn test_command_keys_have_mnemonics() {
        assert_eq!(keycode_for("ENTER"), Some(hid::KEY_ENTER));
        assert_eq!(keycode_for("ESC"), Some(hid::KEY_ESCAPE));
        assert_eq!(keycode_for("INSERT"), Some(hid::KEY_INSERT));
        assert_eq!(keycode_for("DELETE"), Some(hid::KEY_DELETE));
        assert_eq!(keycode_for("END"), Some(hid::KEY_END));
        assert_eq!(keycode_for("HOME"), Some(hid::KEY_HOME));
    }

    #[test]
    fn test_function_keys_are_contiguous() {
        assert_eq!(keycode_for("F1"), Some(0x3A));
        assert_eq!(keycode_for("F12"), Some(0x45));
        assert_eq!(keycode_for("F13"), Some(0x68));
        assert_eq!(keycode_for("F24"), Some(0x73));
    }

    #[test]
    fn test_unknown_mnemonic_is_none() {
        assert_eq!(keycode_for("enter"), None);
        assert_eq!(keycode_for("F25"), None);
        assert_eq!(keycode_for(""), None);
    }

    #[test]
    fn test_name_for_reverses_every_entry() {
        for (name, code) in MNEMONICS {
            assert_eq!(name_for(*code), Some(*name), "reverse lookup for {name}");
        }
    }

    #[test]
    fn test_table_is_sorted_without_duplicate_codes() {
        for pair in MNEMONICS.windows(2) {
            assert!(pair[0].1 < pair[1].1, "{} must precede {}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn test_letters_have_no_mnemonic() {
        assert_eq!(name_for(hid::KEY_A), None);
    }
}
