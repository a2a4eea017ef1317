//! Idle watchdog: seals an unattended unsealed device.

use std::time::{Duration, Instant};

use hidproxy_core::domain::DeviceStatus;

#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    timeout: Duration,
    last_interaction: Instant,
}

impl IdleWatchdog {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_interaction: now,
        }
    }

    /// Records keyboard activity.
    pub fn touch(&mut self, now: Instant) {
        self.last_interaction = now;
    }

    /// Returns `true` when `status` is subject to the timeout and no report
    /// has arrived for longer than it.
    pub fn expired(&self, status: DeviceStatus, now: Instant) -> bool {
        !status.is_idle_exempt() && now.saturating_duration_since(self.last_interaction) > self.timeout
    }
}
