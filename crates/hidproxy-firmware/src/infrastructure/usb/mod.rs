//! USB adapters: the upstream host port (physical keyboard) and the
//! downstream device port (host computer).
//!
//! # Two USB roles (for beginners)
//!
//! The proxy plays USB *host* towards the physical keyboard, exactly like a
//! computer would, and USB *device* towards the real computer, pretending to
//! be a keyboard.  The stacks that implement those roles live outside this
//! crate; the traits below are the narrow contracts the executors need:
//!
//! - [`UpstreamHost`] reports mounts, unmounts and received reports, and
//!   accepts LED bitmaps to forward to attached keyboards.
//! - [`DownstreamDevice`] accepts one report at a time and later reports its
//!   completion, plus LED output reports the computer sends us.
//!
//! Both are polled: the stacks post into small internal buffers from their
//! interrupt context and the executor drains them.  Nothing here calls back
//! into the state machine.
//!
//! # Testability
//!
//! [`mock`] provides scripted and recording doubles.  [`sim`] drives the
//! pipeline from stdin for the `hid-proxy` host binary.

pub mod mock;
pub mod sim;

use hidproxy_core::domain::{DownstreamRecord, InterfaceProtocol, SourceId};
use thiserror::Error;

/// Something the upstream host stack observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A HID interface was enumerated.  `descriptor` is its raw report
    /// descriptor.
    Mounted {
        source: SourceId,
        protocol: InterfaceProtocol,
        descriptor: Vec<u8>,
    },
    Unmounted {
        source: SourceId,
    },
    /// An IN report arrived from the interface.
    Report {
        source: SourceId,
        bytes: Vec<u8>,
    },
}

/// The USB host port the physical keyboard is plugged into.
pub trait UpstreamHost: Send {
    /// Returns everything that happened since the previous call.
    fn poll(&mut self) -> Vec<HostEvent>;

    /// Sends an LED output report to every mounted keyboard.
    fn set_leds(&mut self, leds: u8);
}

/// Something the downstream device stack observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The host computer configured us.
    Mounted,
    /// The report submitted last has been collected by the host.
    ReportComplete,
    /// The host sent a keyboard LED output report.
    LedReport(u8),
}

/// Error type for downstream submissions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsbError {
    /// The endpoint is busy or the host has not configured the device.
    #[error("interface {interface} not ready")]
    NotReady { interface: u8 },

    #[error("device not mounted")]
    NotMounted,
}

/// The USB device port facing the host computer.
pub trait DownstreamDevice: Send {
    /// Returns everything that happened since the previous call.
    fn poll(&mut self) -> Vec<DeviceEvent>;

    /// Submits one report.  Success means a [`DeviceEvent::ReportComplete`]
    /// will follow.
    ///
    /// # Errors
    ///
    /// Returns [`UsbError`] when the stack refuses the report.
    fn send_report(&mut self, record: &DownstreamRecord) -> Result<(), UsbError>;

    /// Detaches and restarts into the USB firmware-update mode.
    fn reboot_to_bootloader(&mut self);
}
