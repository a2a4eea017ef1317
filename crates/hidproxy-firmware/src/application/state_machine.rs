//! The command interpreter as a pure function of (status, report).
//!
//! [`step`] never touches storage, queues or key material.  It returns the
//! next status together with a list of [`Effect`]s, and the pipeline
//! dispatcher (`application::pipeline`) carries them out.  That split keeps
//! every transition testable without a USB stack or flash.
//!
//! # The magic sequence (for beginners)
//!
//! Normal typing passes straight through to the host.  To talk to the proxy
//! itself, the user holds **both** Shift keys with nothing else and then lets
//! go.  That two-edge pattern cannot happen during ordinary typing (one of
//! the shifts would be paired with a letter), so it works as an escape.
//! After the release, the next key press is read as a command:
//!
//! | Key    | Unsealed                     | Sealed                  |
//! |--------|------------------------------|-------------------------|
//! | ENTER  | back to normal               | type password to unlock |
//! | INSERT | set a new password           | set a new password      |
//! | ESC    | back to normal               | back to normal          |
//! | DEL    | wipe everything              | wipe everything         |
//! | END    | lock                         | -                       |
//! | `=`    | record a macro               | -                       |
//! | SPACE  | open the web window          | -                       |
//! | PRINT  | write the key to an NFC tag  | -                       |
//! | other  | play that macro              | play it if public       |
//!
//! Two chords work from any state while the shifts are still held:
//! `Shift+Shift+HOME` reboots into the bootloader and `Shift+Shift+D` dumps
//! the diagnostic history.

use hidproxy_core::domain::{DeviceStatus, KeyboardReport};
use hidproxy_core::keymap::hid::{
    KEY_D, KEY_DELETE, KEY_END, KEY_ENTER, KEY_EQUAL, KEY_ESCAPE, KEY_HOME, KEY_INSERT,
    KEY_PRINT_SCREEN, KEY_SPACE,
};

/// A side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Forward the report to the host unchanged.
    PassThrough(KeyboardReport),
    RebootToBootloader,
    DumpDiagnostics,
    /// Zero the password accumulator.
    ClearPassword,
    /// Add a keycode to the password accumulator.
    AppendPassword(u8),
    /// Derive a key from the accumulator and validate it against the stored hash.
    Unlock,
    /// Derive a key from the accumulator and install it as the new password.
    SetNewPassword,
    /// Forget the derived key.
    Seal,
    /// Delete every macro, setting and the password hash.
    Wipe,
    /// Play macro `trigger`; `report` is the triggering report, sent through
    /// to the host if no usable macro exists.
    Evaluate {
        trigger: u8,
        report: KeyboardReport,
        public_only: bool,
    },
    /// Open the web access window and print the macro list.
    EnableWebAccess,
    /// Hand the current key to the NFC writer.
    WriteNfcKey,
    /// Delete macro `trigger` and start recording a new one.
    BeginDefinition(u8),
    /// Append a report to the macro being recorded.
    Record(KeyboardReport),
    /// Persist the macro being recorded.
    SaveDefinition,
}

/// Outcome of one [`step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: DeviceStatus,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: DeviceStatus) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(next: DeviceStatus, effect: Effect) -> Self {
        Self {
            next,
            effects: vec![effect],
        }
    }
}

/// Interprets one keyboard report.
///
/// `Unlock` and `SetNewPassword` come back with a tentative `next` of
/// [`DeviceStatus::Unsealed`]; the dispatcher replaces it with
/// [`DeviceStatus::Sealed`] if the password is rejected.
pub fn step(status: DeviceStatus, report: &KeyboardReport) -> Transition {
    use DeviceStatus::*;

    if report.is_magic_chord(KEY_HOME) {
        return Transition::with(status, Effect::RebootToBootloader);
    }
    if report.is_magic_chord(KEY_D) {
        return Transition::with(status, Effect::DumpDiagnostics);
    }

    let key = report.first_key();
    match status {
        Blank => pass_unless_magic(Blank, BlankSeenMagic, report),
        BlankSeenMagic => match key {
            0 => Transition::to(BlankSeenMagic),
            KEY_ESCAPE => Transition::to(Blank),
            KEY_INSERT => Transition::with(EnteringNewPassword, Effect::ClearPassword),
            KEY_DELETE => Transition::with(Blank, Effect::Wipe),
            _ => Transition::with(Blank, Effect::PassThrough(*report)),
        },

        Sealed => pass_unless_magic(Sealed, SealedSeenMagic, report),
        SealedSeenMagic => after_release(SealedSeenMagic, SealedExpectingCommand, report),
        SealedExpectingCommand => match key {
            0 => Transition::to(SealedExpectingCommand),
            KEY_ENTER => Transition::with(EnteringPassword, Effect::ClearPassword),
            KEY_INSERT => Transition::with(EnteringNewPassword, Effect::ClearPassword),
            KEY_ESCAPE => Transition::to(Sealed),
            KEY_DELETE => Transition::with(Blank, Effect::Wipe),
            trigger => Transition::with(
                Sealed,
                Effect::Evaluate {
                    trigger,
                    report: *report,
                    public_only: true,
                },
            ),
        },

        EnteringPassword | EnteringNewPassword => match key {
            0 => Transition::to(status),
            KEY_ENTER if status == EnteringPassword => Transition::with(Unsealed, Effect::Unlock),
            KEY_ENTER => Transition::with(Unsealed, Effect::SetNewPassword),
            k => Transition::with(status, Effect::AppendPassword(k)),
        },

        Unsealed => pass_unless_magic(Unsealed, SeenMagic, report),
        SeenMagic => after_release(SeenMagic, ExpectingCommand, report),
        ExpectingCommand => match key {
            0 => Transition::to(ExpectingCommand),
            KEY_ESCAPE | KEY_ENTER => Transition::to(Unsealed),
            KEY_END => Transition::with(Sealed, Effect::Seal),
            KEY_DELETE => Transition::with(Blank, Effect::Wipe),
            KEY_EQUAL => Transition::to(SeenAssign),
            KEY_SPACE => Transition::with(Unsealed, Effect::EnableWebAccess),
            KEY_INSERT => Transition::with(EnteringNewPassword, Effect::ClearPassword),
            KEY_PRINT_SCREEN => Transition::with(Unsealed, Effect::WriteNfcKey),
            trigger => Transition::with(
                Unsealed,
                Effect::Evaluate {
                    trigger,
                    report: *report,
                    public_only: false,
                },
            ),
        },
        SeenAssign => match key {
            0 => Transition::to(SeenAssign),
            trigger => Transition::with(Defining, Effect::BeginDefinition(trigger)),
        },
        Defining if report.is_magic() => Transition::with(Unsealed, Effect::SaveDefinition),
        Defining => Transition::with(Defining, Effect::Record(*report)),
    }
}

fn pass_unless_magic(
    status: DeviceStatus,
    seen_magic: DeviceStatus,
    report: &KeyboardReport,
) -> Transition {
    if report.is_magic() {
        Transition::to(seen_magic)
    } else {
        Transition::with(status, Effect::PassThrough(*report))
    }
}

fn after_release(status: DeviceStatus, expecting: DeviceStatus, report: &KeyboardReport) -> Transition {
    if report.is_release_all() {
        Transition::to(expecting)
    } else {
        Transition::to(status)
    }
}
