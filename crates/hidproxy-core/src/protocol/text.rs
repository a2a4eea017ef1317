//! The human-editable macro file format used for bulk upload and download.
//!
//! ```text
//! # comments run to end of line
//! [public]  F1 { "hello" ENTER }
//! [private] a  { ^c [02:04] MQTT("home/door", "open") }
//! 0x3B { "no prefix means private" }
//! ```
//!
//! Body tokens:
//!
//! | Token | Actions |
//! |---|---|
//! | `"text"` | press + release for each character (`\"` and `\\` escape) |
//! | `ENTER`, `F5`, ... | one press of that key, no release |
//! | `^x` | Ctrl + letter, one press |
//! | `[mm:kk]` / `[mm:k1:k2..]` | a literal report: modifier then up to six keycodes, hex |
//! | `MQTT("topic", "message")` | MQTT publish |
//! | `DELAY(ms)` | pause (reserved action) |
//! | `MOUSE(buttons, dx, dy, wheel)` | pointer move (reserved action) |

use std::collections::BTreeSet;
use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

use crate::domain::keydef::{Keydef, KeydefError, MacroAction};
use crate::domain::report::KeyboardReport;
use crate::keymap::hid::{ModifierFlags, KEY_A, KEY_Z};
use crate::keymap::{ascii, mnemonic};

/// Header written at the top of every serialized file.
const FILE_HEADER: &str = "\
# Macros file - Format: [public|private] trigger { commands... }
# Commands: \"text\" MNEMONIC ^C [mod:key] MQTT(\"topic\", \"message\")
# [public] keydefs work when device is locked
# [private] keydefs require device unlock (default)

";

/// A syntax or content error, with the 1-based line it was found on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacroParseError {
    #[error("line {line}: unexpected end of input, expected {expected}")]
    UnexpectedEof { line: usize, expected: &'static str },

    #[error("line {line}: expected {expected}, found {found:?}")]
    Unexpected {
        line: usize,
        expected: &'static str,
        found: char,
    },

    #[error("line {line}: unknown classification [{text}]")]
    UnknownClassification { line: usize, text: String },

    #[error("line {line}: invalid trigger {text:?}")]
    InvalidTrigger { line: usize, text: String },

    #[error("line {line}: trigger 0x{trigger:02X} is defined twice")]
    DuplicateTrigger { line: usize, trigger: u8 },

    #[error("line {line}: unknown key name {name:?}")]
    UnknownMnemonic { line: usize, name: String },

    #[error("line {line}: character {ch:?} cannot be typed on this layout")]
    UnmappableChar { line: usize, ch: char },

    #[error("line {line}: unsupported escape \\{ch}")]
    BadEscape { line: usize, ch: char },

    #[error("line {line}: invalid report literal [{text}]")]
    InvalidReport { line: usize, text: String },

    #[error("line {line}: invalid number {text:?}")]
    InvalidNumber { line: usize, text: String },

    #[error("line {line}: {source}")]
    Keydef {
        line: usize,
        #[source]
        source: KeydefError,
    },
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parses a macro file.  Nothing is returned unless the whole input is valid.
///
/// # Errors
///
/// Returns the first [`MacroParseError`] encountered.
///
/// # Examples
///
/// ```rust
/// use hidproxy_core::protocol::text::parse_macros;
///
/// let defs = parse_macros("[public] F1 { \"hi\" }").unwrap();
/// assert_eq!(defs.len(), 1);
/// assert_eq!(defs[0].trigger(), 0x3A);
/// assert_eq!(defs[0].len(), 4);
/// ```
pub fn parse_macros(input: &str) -> Result<Vec<Keydef>, MacroParseError> {
    let mut parser = Parser::new(input);
    let mut defs = Vec::new();
    let mut seen = BTreeSet::new();

    loop {
        parser.skip_whitespace_and_comments();
        if parser.at_end() {
            break;
        }
        let line = parser.line;
        let def = parser.definition()?;
        if !seen.insert(def.trigger()) {
            return Err(MacroParseError::DuplicateTrigger {
                line,
                trigger: def.trigger(),
            });
        }
        debug!(
            trigger = def.trigger(),
            actions = def.len(),
            public = !def.require_unlock,
            "parsed keydef"
        );
        defs.push(def);
    }
    Ok(defs)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            self.skip_whitespace();
            if self.peek() == Some('#') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else {
                return;
            }
        }
    }

    fn expect(&mut self, wanted: char, expected: &'static str) -> Result<(), MacroParseError> {
        match self.bump() {
            Some(c) if c == wanted => Ok(()),
            Some(found) => Err(MacroParseError::Unexpected {
                line: self.line,
                expected,
                found,
            }),
            None => Err(self.eof(expected)),
        }
    }

    fn eof(&self, expected: &'static str) -> MacroParseError {
        MacroParseError::UnexpectedEof {
            line: self.line,
            expected,
        }
    }

    /// Reads a run of characters that may form a name or number.
    fn word(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"' | '^' | '[' | ']' | '(' | ')' | ',' | ':') {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }

    fn definition(&mut self) -> Result<Keydef, MacroParseError> {
        let require_unlock = self.classification()?;
        self.skip_whitespace();
        let trigger = self.trigger()?;
        self.skip_whitespace();
        self.expect('{', "'{'")?;

        let line = self.line;
        let mut def = Keydef::new(trigger, require_unlock)
            .map_err(|source| MacroParseError::Keydef { line, source })?;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.eof("'}'")),
                Some('}') => {
                    self.bump();
                    return Ok(def);
                }
                Some(_) => {
                    for action in self.body_token()? {
                        let line = self.line;
                        def.push(action)
                            .map_err(|source| MacroParseError::Keydef { line, source })?;
                    }
                }
            }
        }
    }

    fn classification(&mut self) -> Result<bool, MacroParseError> {
        if self.peek() != Some('[') {
            return Ok(true);
        }
        self.bump();
        let text = self.word();
        self.expect(']', "']'")?;
        match text.as_str() {
            "public" => Ok(false),
            "private" => Ok(true),
            _ => Err(MacroParseError::UnknownClassification {
                line: self.line,
                text,
            }),
        }
    }

    fn trigger(&mut self) -> Result<u8, MacroParseError> {
        let line = self.line;
        let first = self.peek().ok_or_else(|| self.eof("a trigger"))?;

        // A single character followed by whitespace or '{' is a typed key.
        let next = self.peek_at(1);
        if next.map_or(true, |c| c.is_whitespace() || c == '{') {
            self.bump();
            return match ascii::keystroke_for(first) {
                Some(ks) if ks.keycode != 0 => Ok(ks.keycode),
                _ => Err(MacroParseError::InvalidTrigger {
                    line,
                    text: first.to_string(),
                }),
            };
        }

        let text = self.word();
        let code = if let Some(digits) = text.strip_prefix("0x") {
            u8::from_str_radix(digits, 16).ok()
        } else {
            mnemonic::keycode_for(&text)
        };
        match code {
            Some(c) if c != 0 => Ok(c),
            _ => Err(MacroParseError::InvalidTrigger { line, text }),
        }
    }

    fn body_token(&mut self) -> Result<Vec<MacroAction>, MacroParseError> {
        match self.peek() {
            Some('"') => self.typed_text(),
            Some('^') => self.ctrl_letter().map(|a| vec![a]),
            Some('[') => self.report_literal().map(|a| vec![a]),
            _ => {
                let line = self.line;
                let name = self.word();
                if name.is_empty() {
                    let found = self.peek().unwrap_or(' ');
                    return Err(MacroParseError::Unexpected {
                        line,
                        expected: "a macro command",
                        found,
                    });
                }
                match name.as_str() {
                    "MQTT" => self.mqtt().map(|a| vec![a]),
                    "DELAY" => self.delay().map(|a| vec![a]),
                    "MOUSE" => self.mouse().map(|a| vec![a]),
                    _ => match mnemonic::keycode_for(&name) {
                        Some(code) => Ok(vec![MacroAction::Hid(KeyboardReport::key(0, code))]),
                        None => Err(MacroParseError::UnknownMnemonic { line, name }),
                    },
                }
            }
        }
    }

    fn quoted(&mut self) -> Result<String, MacroParseError> {
        self.expect('"', "'\"'")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.eof("closing '\"'")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => out.push(c),
                    Some(ch) => {
                        return Err(MacroParseError::BadEscape {
                            line: self.line,
                            ch,
                        })
                    }
                    None => return Err(self.eof("escaped character")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn typed_text(&mut self) -> Result<Vec<MacroAction>, MacroParseError> {
        let line = self.line;
        let text = self.quoted()?;
        let mut actions = Vec::with_capacity(text.chars().count() * 2);
        for ch in text.chars() {
            let ks = ascii::keystroke_for(ch).ok_or(MacroParseError::UnmappableChar { line, ch })?;
            actions.push(MacroAction::Hid(KeyboardReport::key(ks.modifier, ks.keycode)));
            actions.push(MacroAction::Hid(KeyboardReport::RELEASE_ALL));
        }
        Ok(actions)
    }

    fn ctrl_letter(&mut self) -> Result<MacroAction, MacroParseError> {
        self.bump();
        let line = self.line;
        match self.bump() {
            Some(c) if c.is_ascii_alphabetic() => {
                let offset = c.to_ascii_lowercase() as u8 - b'a';
                Ok(MacroAction::Hid(KeyboardReport::key(
                    ModifierFlags::LEFT_CTRL,
                    KEY_A + offset,
                )))
            }
            Some(found) => Err(MacroParseError::Unexpected {
                line,
                expected: "a letter after '^'",
                found,
            }),
            None => Err(self.eof("a letter after '^'")),
        }
    }

    fn report_literal(&mut self) -> Result<MacroAction, MacroParseError> {
        self.bump();
        let line = self.line;
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.eof("']'")),
                Some(']') => break,
                Some(c) => text.push(c),
            }
        }
        let invalid = || MacroParseError::InvalidReport {
            line,
            text: text.clone(),
        };

        let fields: Vec<&str> = text.split(':').map(str::trim).collect();
        if fields.len() < 2 || fields.len() > 7 {
            return Err(invalid());
        }
        let mut bytes = Vec::with_capacity(fields.len());
        for field in &fields {
            bytes.push(u8::from_str_radix(field, 16).map_err(|_| invalid())?);
        }
        let mut keycodes = [0u8; 6];
        keycodes[..bytes.len() - 1].copy_from_slice(&bytes[1..]);
        Ok(MacroAction::Hid(KeyboardReport::new(bytes[0], keycodes)))
    }

    fn open_args(&mut self) -> Result<(), MacroParseError> {
        self.skip_whitespace();
        self.expect('(', "'('")
    }

    fn comma(&mut self) -> Result<(), MacroParseError> {
        self.skip_whitespace();
        self.expect(',', "','")?;
        self.skip_whitespace();
        Ok(())
    }

    fn close_args(&mut self) -> Result<(), MacroParseError> {
        self.skip_whitespace();
        self.expect(')', "')'")
    }

    fn number<T: std::str::FromStr>(&mut self) -> Result<T, MacroParseError> {
        self.skip_whitespace();
        let line = self.line;
        let text = self.word();
        text.parse()
            .map_err(|_| MacroParseError::InvalidNumber { line, text })
    }

    fn mqtt(&mut self) -> Result<MacroAction, MacroParseError> {
        self.open_args()?;
        self.skip_whitespace();
        let topic = self.quoted()?;
        self.comma()?;
        let message = self.quoted()?;
        self.close_args()?;
        let line = self.line;
        MacroAction::mqtt(topic, message).map_err(|source| MacroParseError::Keydef { line, source })
    }

    fn delay(&mut self) -> Result<MacroAction, MacroParseError> {
        self.open_args()?;
        let millis = self.number::<u32>()?;
        self.close_args()?;
        Ok(MacroAction::Delay { millis })
    }

    fn mouse(&mut self) -> Result<MacroAction, MacroParseError> {
        self.open_args()?;
        let buttons = self.number::<u8>()?;
        self.comma()?;
        let dx = self.number::<i8>()?;
        self.comma()?;
        let dy = self.number::<i8>()?;
        self.comma()?;
        let wheel = self.number::<i8>()?;
        self.close_args()?;
        Ok(MacroAction::MouseMove {
            buttons,
            dx,
            dy,
            wheel,
        })
    }
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// Renders keydefs in the textual format, ordered by trigger.
pub fn serialize_macros(defs: &[Keydef]) -> String {
    let mut sorted: Vec<&Keydef> = defs.iter().collect();
    sorted.sort_by_key(|d| d.trigger());

    let mut out = String::from(FILE_HEADER);
    for def in sorted {
        serialize_keydef(&mut out, def);
    }
    out
}

/// Appends one definition line.
pub fn serialize_keydef(out: &mut String, def: &Keydef) {
    out.push_str(if def.require_unlock {
        "[private] "
    } else {
        "[public] "
    });
    out.push_str(&trigger_text(def.trigger()));
    out.push_str(" { ");

    let actions = def.actions();
    let mut i = 0;
    while i < actions.len() {
        let text_len = typed_run(&actions[i..]);
        if text_len > 0 {
            out.push('"');
            for pair in actions[i..i + text_len * 2].chunks(2) {
                if let Some(ch) = typed_char(&pair[0]) {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
            }
            out.push_str("\" ");
            i += text_len * 2;
            continue;
        }
        write_action(out, &actions[i]);
        i += 1;
    }
    out.push_str("}\n");
}

/// The preferred textual form of a trigger: mnemonic, plain character, or hex.
fn trigger_text(trigger: u8) -> String {
    if let Some(name) = mnemonic::name_for(trigger) {
        return name.to_string();
    }
    match ascii::char_for(0, trigger) {
        // '#' would read back as a comment.
        Some(c) if c.is_ascii_graphic() && c != '#' => c.to_string(),
        _ => format!("0x{trigger:02x}"),
    }
}

/// Character typed by a single-key press report, if it is printable ASCII.
fn typed_char(action: &MacroAction) -> Option<char> {
    match action {
        MacroAction::Hid(r) if r.reserved == 0 && r.keycodes[1..].iter().all(|&k| k == 0) => {
            ascii::char_for(r.modifier, r.keycodes[0]).filter(|c| (' '..='~').contains(c))
        }
        _ => None,
    }
}

/// Number of leading (press, release-all) pairs that type printable characters.
fn typed_run(actions: &[MacroAction]) -> usize {
    actions
        .chunks_exact(2)
        .take_while(|pair| {
            typed_char(&pair[0]).is_some()
                && pair[1] == MacroAction::Hid(KeyboardReport::RELEASE_ALL)
        })
        .count()
}

fn write_action(out: &mut String, action: &MacroAction) {
    // Writing into a String cannot fail.
    let _ = match action {
        MacroAction::Hid(r) => {
            let single = r.reserved == 0 && r.keycodes[1..].iter().all(|&k| k == 0);
            let key = r.keycodes[0];
            if single && r.modifier == ModifierFlags::LEFT_CTRL && (KEY_A..=KEY_Z).contains(&key) {
                write!(out, "^{} ", (b'a' + (key - KEY_A)) as char)
            } else if r.is_release_all() && r.reserved == 0 {
                write!(out, "[00:00] ")
            } else if let (true, 0, Some(name)) = (single, r.modifier, mnemonic::name_for(key)) {
                write!(out, "{name} ")
            } else {
                let used = r.keycodes.iter().rposition(|&k| k != 0).map_or(1, |p| p + 1);
                let _ = write!(out, "[{:02x}", r.modifier);
                for k in &r.keycodes[..used] {
                    let _ = write!(out, ":{k:02x}");
                }
                write!(out, "] ")
            }
        }
        MacroAction::Mqtt { topic, payload } => {
            write!(out, "MQTT(\"{}\", \"{}\") ", escape(topic), escape(payload))
        }
        MacroAction::Delay { millis } => write!(out, "DELAY({millis}) "),
        MacroAction::MouseMove {
            buttons,
            dx,
            dy,
            wheel,
        } => write!(out, "MOUSE({buttons}, {dx}, {dy}, {wheel}) "),
    };
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::keydef::MAX_ACTIONS;
    use crate::keymap::hid::{KEY_ENTER, KEY_F1};

    fn hid(modifier: u8, key: u8) -> MacroAction {
        MacroAction::Hid(KeyboardReport::key(modifier, key))
    }

    fn release() -> MacroAction {
        MacroAction::Hid(KeyboardReport::RELEASE_ALL)
    }

    #[test]
    fn test_quoted_text_expands_to_press_release_pairs() {
        // Arrange
        let input = "a { \"aB\" }";

        // Act
        let defs = parse_macros(input).unwrap();

        // Assert
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].trigger(), 0x04);
        assert!(defs[0].require_unlock, "missing prefix defaults to private");
        assert_eq!(
            defs[0].actions(),
            &[hid(0, 0x04), release(), hid(0x02, 0x05), release()]
        );
    }

    #[test]
    fn test_trigger_forms() {
        let defs = parse_macros("[public] F1 { }\n0x3b { }\nz{ }").unwrap();
        let triggers: Vec<u8> = defs.iter().map(Keydef::trigger).collect();
        assert_eq!(triggers, vec![KEY_F1, 0x3B, 0x1D]);
        assert!(!defs[0].require_unlock);
    }

    #[test]
    fn test_body_tokens() {
        let defs = parse_macros(
            "x { ENTER ^c ^V [02:04] [00:04:05] MQTT(\"t/1\", \"on\") DELAY(20) MOUSE(1, -3, 4, 0) }",
        )
        .unwrap();
        assert_eq!(
            defs[0].actions(),
            &[
                hid(0, KEY_ENTER),
                hid(0x01, 0x06),
                hid(0x01, 0x19),
                hid(0x02, 0x04),
                MacroAction::Hid(KeyboardReport::new(0, [0x04, 0x05, 0, 0, 0, 0])),
                MacroAction::mqtt("t/1", "on").unwrap(),
                MacroAction::Delay { millis: 20 },
                MacroAction::MouseMove {
                    buttons: 1,
                    dx: -3,
                    dy: 4,
                    wheel: 0
                },
            ]
        );
    }

    #[test]
    fn test_comments_and_escapes() {
        let input = "# header\n[private] q { \"say \\\"hi\\\" \\\\\" } # trailing\n";
        let defs = parse_macros(input).unwrap();
        assert_eq!(defs[0].len(), 2 * 10);
    }

    #[test]
    fn test_unknown_mnemonic_is_an_error() {
        assert_eq!(
            parse_macros("a { ENTRE }"),
            Err(MacroParseError::UnknownMnemonic {
                line: 1,
                name: "ENTRE".into()
            })
        );
    }

    #[test]
    fn test_bad_escape_is_an_error() {
        assert!(matches!(
            parse_macros("a { \"\\n\" }"),
            Err(MacroParseError::BadEscape { ch: 'n', .. })
        ));
    }

    #[test]
    fn test_unterminated_body_reports_line() {
        assert!(matches!(
            parse_macros("a { \"x\"\n\n"),
            Err(MacroParseError::UnexpectedEof { line: 3, .. })
        ));
    }

    #[test]
    fn test_sixty_five_actions_are_rejected() {
        let body = "ENTER ".repeat(MAX_ACTIONS + 1);
        let err = parse_macros(&format!("a {{ {body} }}")).unwrap_err();
        assert!(matches!(err, MacroParseError::Keydef { source: KeydefError::Full { .. }, .. }));
    }

    #[test]
    fn test_duplicate_trigger_is_rejected() {
        assert!(matches!(
            parse_macros("a { }\na { }"),
            Err(MacroParseError::DuplicateTrigger { line: 2, trigger: 0x04 })
        ));
    }

    #[test]
    fn test_unknown_classification_is_rejected() {
        assert!(matches!(
            parse_macros("[secret] a { }"),
            Err(MacroParseError::UnknownClassification { .. })
        ));
    }

    #[test]
    fn test_serialize_prefers_compact_forms() {
        // Arrange
        let def = Keydef::with_actions(
            0x3A,
            false,
            vec![
                hid(0, 0x0B),
                release(),
                hid(0x02, 0x1F),
                release(),
                hid(0x01, 0x06),
                release(),
                hid(0, KEY_ENTER),
                hid(0x02, 0x28),
                MacroAction::mqtt("a\"b", "c").unwrap(),
            ],
        )
        .unwrap();

        // Act
        let mut out = String::new();
        serialize_keydef(&mut out, &def);

        // Assert
        assert_eq!(
            out,
            "[public] F1 { \"h\\\"\" ^c [00:00] ENTER [02:28] MQTT(\"a\\\"b\", \"c\") }\n"
        );
    }

    #[test]
    fn test_trigger_text_avoids_comment_character() {
        assert_eq!(trigger_text(0x32), "0x32");
        assert_eq!(trigger_text(0x04), "a");
        assert_eq!(trigger_text(0x28), "ENTER");
        assert_eq!(trigger_text(0xF0), "0xf0");
    }

    #[test]
    fn test_serialized_output_parses_back() {
        let input = "[public] F1 { \"Hello, World!\" ENTER }\n[private] 0x32 { ^a [00:04:05:06] DELAY(5) }\n";
        let defs = parse_macros(input).unwrap();
        let again = parse_macros(&serialize_macros(&defs)).unwrap();
        assert_eq!(again, defs);
    }

    #[test]
    fn test_report_with_reserved_byte_survives_text_round_trip() {
        // Arrange
        let mut report = KeyboardReport::key(ModifierFlags::LEFT_SHIFT, 0x05);
        report.reserved = 1;
        let def = Keydef::with_actions(0x04, true, vec![MacroAction::Hid(report)]).unwrap();

        // Act
        let again = parse_macros(&serialize_macros(std::slice::from_ref(&def))).unwrap();

        // Assert
        assert_eq!(again, vec![def]);
    }
}
