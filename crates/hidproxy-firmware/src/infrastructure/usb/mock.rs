//! Test doubles for the USB adapters.
//!
//! [`RecordingDevice`] keeps every submitted record in a shared list so a
//! test can hand one clone to the executor and inspect another.
//! [`ScriptedHost`] replays queued [`HostEvent`]s and records LED writes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use hidproxy_core::domain::{DownstreamRecord, KeyboardReport};

use super::{DeviceEvent, DownstreamDevice, HostEvent, UpstreamHost, UsbError};

#[derive(Debug, Default)]
struct DeviceLog {
    sent: Vec<DownstreamRecord>,
    pending: VecDeque<DeviceEvent>,
    awaiting_completion: bool,
    refuse_next: usize,
    hold_completions: bool,
    reboots: usize,
    overlapping_submissions: usize,
}

/// A downstream device that accepts every report and completes it on the
/// next poll.
#[derive(Debug, Clone, Default)]
pub struct RecordingDevice {
    log: Arc<Mutex<DeviceLog>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record submitted so far.
    pub fn sent(&self) -> Vec<DownstreamRecord> {
        self.log.lock().expect("lock poisoned").sent.clone()
    }

    /// The submitted keyboard reports, in order.
    pub fn keyboard_reports(&self) -> Vec<KeyboardReport> {
        self.sent().iter().filter_map(DownstreamRecord::as_keyboard).collect()
    }

    /// Refuses the next `count` submissions with [`UsbError::NotReady`].
    pub fn refuse_next(&self, count: usize) {
        self.log.lock().expect("lock poisoned").refuse_next = count;
    }

    /// While held, submissions never complete.
    pub fn hold_completions(&self, hold: bool) {
        self.log.lock().expect("lock poisoned").hold_completions = hold;
    }

    /// Queues an LED output report from the host.
    pub fn inject_leds(&self, leds: u8) {
        self.log
            .lock()
            .expect("lock poisoned")
            .pending
            .push_back(DeviceEvent::LedReport(leds));
    }

    /// Queues a mount notification.
    pub fn inject_mount(&self) {
        self.log
            .lock()
            .expect("lock poisoned")
            .pending
            .push_back(DeviceEvent::Mounted);
    }

    pub fn reboots(&self) -> usize {
        self.log.lock().expect("lock poisoned").reboots
    }

    /// Submissions made while a previous one was still owed a completion.
    pub fn overlapping_submissions(&self) -> usize {
        self.log.lock().expect("lock poisoned").overlapping_submissions
    }
}

impl DownstreamDevice for RecordingDevice {
    fn poll(&mut self) -> Vec<DeviceEvent> {
        let mut log = self.log.lock().expect("lock poisoned");
        let mut events: Vec<DeviceEvent> = log.pending.drain(..).collect();
        if log.awaiting_completion && !log.hold_completions {
            log.awaiting_completion = false;
            events.push(DeviceEvent::ReportComplete);
        }
        events
    }

    fn send_report(&mut self, record: &DownstreamRecord) -> Result<(), UsbError> {
        let mut log = self.log.lock().expect("lock poisoned");
        if log.refuse_next > 0 {
            log.refuse_next -= 1;
            return Err(UsbError::NotReady {
                interface: record.interface,
            });
        }
        if log.awaiting_completion {
            log.overlapping_submissions += 1;
        }
        log.awaiting_completion = true;
        log.sent.push(*record);
        Ok(())
    }

    fn reboot_to_bootloader(&mut self) {
        self.log.lock().expect("lock poisoned").reboots += 1;
    }
}

/// An upstream host that replays scripted events.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHost {
    events: Arc<Mutex<VecDeque<HostEvent>>>,
    leds: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event for the next poll.
    pub fn push(&self, event: HostEvent) {
        self.events.lock().expect("lock poisoned").push_back(event);
    }

    /// LED bitmaps written to the keyboard, in order.
    pub fn leds(&self) -> Vec<u8> {
        self.leds.lock().expect("lock poisoned").clone()
    }
}

impl UpstreamHost for ScriptedHost {
    fn poll(&mut self) -> Vec<HostEvent> {
        self.events.lock().expect("lock poisoned").drain(..).collect()
    }

    fn set_leds(&mut self, leds: u8) {
        self.leds.lock().expect("lock poisoned").push(leds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_device_completes_on_next_poll() {
        // Arrange
        let mut dev = RecordingDevice::new();
        let rec = DownstreamRecord::keyboard(&KeyboardReport::key(0, 4));

        // Act
        dev.send_report(&rec).unwrap();
        let first = dev.poll();
        let second = dev.poll();

        // Assert
        assert_eq!(first, vec![DeviceEvent::ReportComplete]);
        assert!(second.is_empty());
        assert_eq!(dev.keyboard_reports(), vec![KeyboardReport::key(0, 4)]);
    }

    #[test]
    fn test_recording_device_refusal_is_not_recorded() {
        let mut dev = RecordingDevice::new();
        dev.refuse_next(1);
        let rec = DownstreamRecord::keyboard(&KeyboardReport::RELEASE_ALL);
        assert!(dev.send_report(&rec).is_err());
        assert!(dev.send_report(&rec).is_ok());
        assert_eq!(dev.sent().len(), 1);
    }

    #[test]
    fn test_recording_device_counts_overlapping_submissions() {
        let mut dev = RecordingDevice::new();
        let rec = DownstreamRecord::keyboard(&KeyboardReport::RELEASE_ALL);
        dev.send_report(&rec).unwrap();
        dev.send_report(&rec).unwrap();
        assert_eq!(dev.overlapping_submissions(), 1);
    }

    #[test]
    fn test_scripted_host_drains_in_order() {
        // Arrange
        let mut host = ScriptedHost::new();
        let source = hidproxy_core::domain::SourceId {
            dev_addr: 1,
            instance: 0,
        };
        host.push(HostEvent::Unmounted { source });
        host.push(HostEvent::Report {
            source,
            bytes: vec![0; 8],
        });

        // Act
        let events = host.poll();

        // Assert
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], HostEvent::Unmounted { .. }));
        assert!(host.poll().is_empty());
    }
}
