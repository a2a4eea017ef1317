//! Keyboard LED output: the host's LED state merged with a status indicator.
//!
//! The proxy has no display, so it borrows the physical keyboard's NUM LOCK
//! LED while unsealed:
//!
//! | Status                               | NUM LOCK LED             |
//! |--------------------------------------|--------------------------|
//! | sealed family                        | whatever the host says   |
//! | unsealed, seen magic, command, `=`   | slow pulse (100/2400 ms) |
//! | entering a password                  | fast blink (100/100 ms)  |
//! | defining a macro                     | steady on                |
//!
//! The other LED bits always follow the host.  A new byte is queued for
//! executor U only when it differs from the last one queued.

use std::time::{Duration, Instant};

use hidproxy_core::domain::DeviceStatus;
use tracing::debug;

use crate::infrastructure::queues::LedQueue;

/// NUM LOCK bit in the HID LED output report.
pub const LED_NUM_LOCK: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Indicator {
    Host,
    Blink { on: Duration, off: Duration },
    Steady,
}

fn indicator_for(status: DeviceStatus) -> Indicator {
    match status {
        s if s.is_sealed_family() => Indicator::Host,
        s if s.is_entering_password() => Indicator::Blink {
            on: Duration::from_millis(100),
            off: Duration::from_millis(100),
        },
        DeviceStatus::Defining => Indicator::Steady,
        _ => Indicator::Blink {
            on: Duration::from_millis(100),
            off: Duration::from_millis(2400),
        },
    }
}

#[derive(Debug)]
pub struct LedController {
    epoch: Instant,
    host: u8,
    last_queued: Option<u8>,
}

impl LedController {
    pub fn new(now: Instant) -> Self {
        Self {
            epoch: now,
            host: 0,
            last_queued: None,
        }
    }

    /// Records the LED byte from a host SET_REPORT.
    pub fn set_host_state(&mut self, leds: u8) {
        debug!("leds from host: {leds:#04x}");
        self.host = leds;
    }

    /// The byte the keyboard should show now.
    pub fn desired(&self, status: DeviceStatus, now: Instant) -> u8 {
        let num_lock_on = match indicator_for(status) {
            Indicator::Host => return self.host,
            Indicator::Steady => true,
            Indicator::Blink { on, off } => {
                let period = (on + off).as_millis();
                let phase = now.saturating_duration_since(self.epoch).as_millis() % period;
                phase < on.as_millis()
            }
        };
        let others = self.host & !LED_NUM_LOCK;
        if num_lock_on {
            others | LED_NUM_LOCK
        } else {
            others
        }
    }

    /// Queues the desired byte if it changed.  A full queue is retried on the
    /// next tick.
    pub fn tick(&mut self, status: DeviceStatus, now: Instant, queue: &LedQueue) {
        let leds = self.desired(status, now);
        if self.last_queued == Some(leds) {
            return;
        }
        if queue.try_push(leds) {
            self.last_queued = Some(leds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPS: u8 = 0x02;

    #[test]
    fn test_sealed_passes_host_state_through() {
        // Arrange
        let t0 = Instant::now();
        let mut leds = LedController::new(t0);
        leds.set_host_state(LED_NUM_LOCK | CAPS);

        // Act / Assert
        assert_eq!(leds.desired(DeviceStatus::Sealed, t0), LED_NUM_LOCK | CAPS);
    }

    #[test]
    fn test_unsealed_pulses_num_lock_and_keeps_caps() {
        let t0 = Instant::now();
        let mut leds = LedController::new(t0);
        leds.set_host_state(CAPS);
        let status = DeviceStatus::Unsealed;

        assert_eq!(leds.desired(status, t0), CAPS | LED_NUM_LOCK);
        assert_eq!(leds.desired(status, t0 + Duration::from_millis(150)), CAPS);
        assert_eq!(
            leds.desired(status, t0 + Duration::from_millis(2550)),
            CAPS | LED_NUM_LOCK
        );
    }

    #[test]
    fn test_password_entry_blinks_fast() {
        let t0 = Instant::now();
        let leds = LedController::new(t0);
        let s = DeviceStatus::EnteringPassword;
        assert_eq!(leds.desired(s, t0 + Duration::from_millis(50)), LED_NUM_LOCK);
        assert_eq!(leds.desired(s, t0 + Duration::from_millis(150)), 0);
    }

    #[test]
    fn test_defining_is_steady_even_when_host_clears_num_lock() {
        let t0 = Instant::now();
        let leds = LedController::new(t0);
        assert_eq!(
            leds.desired(DeviceStatus::Defining, t0 + Duration::from_millis(999)),
            LED_NUM_LOCK
        );
    }

    #[test]
    fn test_tick_only_enqueues_changes() {
        // Arrange
        let t0 = Instant::now();
        let mut leds = LedController::new(t0);
        let queue = LedQueue::new();

        // Act
        leds.tick(DeviceStatus::Sealed, t0, &queue);
        leds.tick(DeviceStatus::Sealed, t0, &queue);
        leds.set_host_state(CAPS);
        leds.tick(DeviceStatus::Sealed, t0, &queue);

        // Assert
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(CAPS));
        assert_eq!(queue.pop(), None);
    }
}
