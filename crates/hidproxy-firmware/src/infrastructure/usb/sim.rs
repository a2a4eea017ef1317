//! Console-backed USB adapters for running the proxy on a workstation.
//!
//! [`StdinHost`] plays the physical keyboard: each line typed on stdin
//! becomes one or more upstream reports.  [`ConsoleDevice`] plays the host
//! computer: every report it receives is logged and completed on the next
//! poll.
//!
//! Line syntax accepted by [`parse_line`]:
//!
//! ```text
//! 00 00 04 00 00 00 00 00     raw keyboard report (hex bytes)
//! k 02 00 04 00 00 00 00 00   same, explicit
//! m 01 05 fb                  mouse report
//! magic                       both shifts, then release
//! type hello                  press and release each character
//! # anything                  ignored
//! ```

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use hidproxy_core::domain::report::REPORT_ID_KEYBOARD;
use hidproxy_core::domain::{DownstreamRecord, InterfaceProtocol, KeyboardReport, SourceId};
use hidproxy_core::keymap::ascii::keystroke_for;
use hidproxy_core::keymap::ModifierFlags;
use thiserror::Error;
use tracing::{info, warn};

use super::{DeviceEvent, DownstreamDevice, HostEvent, UpstreamHost, UsbError};

/// Interface the simulated keyboard reports on.
pub const SIM_KEYBOARD: SourceId = SourceId {
    dev_addr: 1,
    instance: 0,
};

/// Interface the simulated mouse reports on.
pub const SIM_MOUSE: SourceId = SourceId {
    dev_addr: 1,
    instance: 1,
};

/// Error type for [`parse_line`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("'{0}' is not a hex byte")]
    BadHex(String),

    #[error("keyboard report needs 8 bytes, got {0}")]
    WrongLength(usize),

    #[error("no key types '{0}'")]
    Untypeable(char),
}

fn hex_bytes<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Vec<u8>, SimError> {
    tokens
        .map(|t| u8::from_str_radix(t, 16).map_err(|_| SimError::BadHex(t.to_string())))
        .collect()
}

fn keyboard(bytes: Vec<u8>) -> Result<HostEvent, SimError> {
    if bytes.len() != 8 {
        return Err(SimError::WrongLength(bytes.len()));
    }
    Ok(HostEvent::Report {
        source: SIM_KEYBOARD,
        bytes,
    })
}

fn key_event(report: KeyboardReport) -> HostEvent {
    HostEvent::Report {
        source: SIM_KEYBOARD,
        bytes: report.to_bytes().to_vec(),
    }
}

/// Translates one console line into host events.
///
/// # Errors
///
/// Returns [`SimError`] for malformed hex or characters the layout cannot type.
pub fn parse_line(line: &str) -> Result<Vec<HostEvent>, SimError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }
    if let Some(text) = line.strip_prefix("type ") {
        let mut events = Vec::with_capacity(text.len() * 2);
        for ch in text.chars() {
            let ks = keystroke_for(ch).ok_or(SimError::Untypeable(ch))?;
            events.push(key_event(KeyboardReport::key(ks.modifier, ks.keycode)));
            events.push(key_event(KeyboardReport::RELEASE_ALL));
        }
        return Ok(events);
    }
    if line == "magic" {
        return Ok(vec![
            key_event(KeyboardReport::key(ModifierFlags::BOTH_SHIFTS, 0)),
            key_event(KeyboardReport::RELEASE_ALL),
        ]);
    }

    let mut tokens = line.split_whitespace().peekable();
    match tokens.peek() {
        Some(&"m") => {
            tokens.next();
            Ok(vec![HostEvent::Report {
                source: SIM_MOUSE,
                bytes: hex_bytes(tokens)?,
            }])
        }
        Some(&"k") => {
            tokens.next();
            Ok(vec![keyboard(hex_bytes(tokens)?)?])
        }
        _ => Ok(vec![keyboard(hex_bytes(tokens)?)?]),
    }
}

// ── Stdin host ────────────────────────────────────────────────────────────────

/// Upstream host fed by lines read from stdin on a background thread.
pub struct StdinHost {
    rx: Receiver<HostEvent>,
    mounted: bool,
    closed: bool,
}

impl StdinHost {
    /// Starts the reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_line(&line) {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("sim: {e}"),
                }
            }
        });
        Self {
            rx,
            mounted: false,
            closed: false,
        }
    }
}

impl UpstreamHost for StdinHost {
    fn poll(&mut self) -> Vec<HostEvent> {
        let mut events = Vec::new();
        if !self.mounted {
            self.mounted = true;
            events.push(HostEvent::Mounted {
                source: SIM_KEYBOARD,
                protocol: InterfaceProtocol::Keyboard,
                descriptor: Vec::new(),
            });
            events.push(HostEvent::Mounted {
                source: SIM_MOUSE,
                protocol: InterfaceProtocol::Mouse,
                descriptor: Vec::new(),
            });
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        self.closed = true;
                        info!("sim: stdin closed");
                    }
                    break;
                }
            }
        }
        events
    }

    fn set_leds(&mut self, leds: u8) {
        info!("sim: keyboard LEDs {leds:#04x}");
    }
}

// ── Console device ────────────────────────────────────────────────────────────

/// Downstream device that prints what the host would receive.
#[derive(Debug, Default)]
pub struct ConsoleDevice {
    announced: bool,
    owed_completion: bool,
}

impl ConsoleDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DownstreamDevice for ConsoleDevice {
    fn poll(&mut self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        if !self.announced {
            self.announced = true;
            events.push(DeviceEvent::Mounted);
        }
        if self.owed_completion {
            self.owed_completion = false;
            events.push(DeviceEvent::ReportComplete);
        }
        events
    }

    fn send_report(&mut self, record: &DownstreamRecord) -> Result<(), UsbError> {
        if !self.announced {
            return Err(UsbError::NotMounted);
        }
        match record.as_keyboard() {
            Some(report) => info!("to host: keyboard {report}"),
            None if record.report_id == REPORT_ID_KEYBOARD => {
                warn!("to host: short keyboard record")
            }
            None => info!("to host: mouse {}", hex::encode(record.payload())),
        }
        self.owed_completion = true;
        Ok(())
    }

    fn reboot_to_bootloader(&mut self) {
        warn!("sim: reboot to bootloader requested; ignoring");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_keyboard_line() {
        // Act
        let events = parse_line("00 00 04 00 00 00 00 00").unwrap();

        // Assert
        assert_eq!(
            events,
            vec![HostEvent::Report {
                source: SIM_KEYBOARD,
                bytes: vec![0, 0, 4, 0, 0, 0, 0, 0],
            }]
        );
    }

    #[test]
    fn test_parse_type_presses_and_releases() {
        let events = parse_line("type aB").unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0], key_event(KeyboardReport::key(0, 0x04)));
        assert_eq!(events[1], key_event(KeyboardReport::RELEASE_ALL));
        assert_eq!(
            events[2],
            key_event(KeyboardReport::key(ModifierFlags::LEFT_SHIFT, 0x05))
        );
    }

    #[test]
    fn test_parse_magic_is_two_edges() {
        let events = parse_line("magic").unwrap();
        assert_eq!(
            events,
            vec![
                key_event(KeyboardReport::key(0x22, 0)),
                key_event(KeyboardReport::RELEASE_ALL)
            ]
        );
    }

    #[test]
    fn test_parse_mouse_line() {
        let events = parse_line("m 01 05 fb").unwrap();
        assert_eq!(
            events,
            vec![HostEvent::Report {
                source: SIM_MOUSE,
                bytes: vec![0x01, 0x05, 0xFB],
            }]
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_line("00 zz"), Err(SimError::BadHex("zz".into())));
        assert_eq!(parse_line("00 00 04"), Err(SimError::WrongLength(3)));
        assert!(parse_line("# comment").unwrap().is_empty());
        assert!(parse_line("   ").unwrap().is_empty());
    }

    #[test]
    fn test_console_device_refuses_before_mount() {
        // Arrange
        let mut dev = ConsoleDevice::new();
        let rec = DownstreamRecord::keyboard(&KeyboardReport::RELEASE_ALL);

        // Act / Assert
        assert_eq!(dev.send_report(&rec), Err(UsbError::NotMounted));
        assert_eq!(dev.poll(), vec![DeviceEvent::Mounted]);
        assert!(dev.send_report(&rec).is_ok());
        assert_eq!(dev.poll(), vec![DeviceEvent::ReportComplete]);
    }
}
