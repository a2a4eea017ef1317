//! Executor U: the physical-keyboard side.
//!
//! Each tick drains the host stack, stamps received reports with a receive
//! sequence number and pushes them onto the upstream queue, posts mount
//! changes for executor D, and forwards queued LED bytes to the keyboard.
//! It never touches storage or key material.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hidproxy_core::domain::{InterfaceProtocol, SourceId, UpstreamReport};
use hidproxy_core::protocol::parse_report_descriptor;
use tracing::{debug, info, warn};

use crate::application::diagnostics::Counters;
use crate::infrastructure::queues::{MountEvent, QueuedReport, Queues};
use crate::infrastructure::usb::{HostEvent, UpstreamHost};

/// Pause between loop iterations when idle.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub struct UpstreamExecutor<H: UpstreamHost> {
    host: H,
    queues: Arc<Queues>,
    counters: Arc<Counters>,
    protocols: HashMap<SourceId, InterfaceProtocol>,
}

impl<H: UpstreamHost> UpstreamExecutor<H> {
    pub fn new(host: H, queues: Arc<Queues>, counters: Arc<Counters>) -> Self {
        Self {
            host,
            queues,
            counters,
            protocols: HashMap::new(),
        }
    }

    /// One pass of the loop.  Returns the number of host events handled.
    pub fn tick(&mut self) -> usize {
        let events = self.host.poll();
        let handled = events.len();
        for event in events {
            self.handle(event);
        }
        while let Some(leds) = self.queues.leds.pop() {
            self.host.set_leds(leds);
        }
        handled
    }

    fn handle(&mut self, event: HostEvent) {
        match event {
            HostEvent::Mounted {
                source,
                protocol,
                descriptor,
            } => {
                let reports = parse_report_descriptor(&descriptor).unwrap_or_else(|e| {
                    warn!(?source, error = %e, "unparseable report descriptor");
                    Vec::new()
                });
                info!(?source, ?protocol, collections = reports.len(), "hid interface mounted");
                self.protocols.insert(source, protocol);
                let posted = self.queues.mounts.try_push(MountEvent::Mounted {
                    source,
                    protocol,
                    reports,
                });
                if !posted {
                    warn!(?source, "mount queue full; mount info dropped");
                }
            }
            HostEvent::Unmounted { source } => {
                info!(?source, "hid interface unmounted");
                self.protocols.remove(&source);
                if !self.queues.mounts.try_push(MountEvent::Unmounted { source }) {
                    warn!(?source, "mount queue full; unmount dropped");
                }
            }
            HostEvent::Report { source, bytes } => {
                let protocol = self
                    .protocols
                    .get(&source)
                    .copied()
                    .unwrap_or(InterfaceProtocol::None);
                let report = match UpstreamReport::from_received(source, protocol, &bytes) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(?source, error = %e, "report discarded");
                        return;
                    }
                };
                let seq = self.counters.received.next();
                if let Some(evicted) = self.queues.upstream.push(QueuedReport { seq, report }) {
                    debug!(
                        evicted = evicted.seq,
                        total = self.queues.upstream.dropped(),
                        "upstream queue full; dropped oldest"
                    );
                }
            }
        }
    }

    /// Runs until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!("executor U started");
        while running.load(Ordering::Relaxed) {
            if self.tick() == 0 {
                tokio::time::sleep(IDLE_SLEEP).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        info!("executor U stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::queues::UPSTREAM_QUEUE_CAPACITY;
    use crate::infrastructure::usb::mock::ScriptedHost;
    use hidproxy_core::domain::{KeyboardReport, UpstreamPayload};

    const KB: SourceId = SourceId {
        dev_addr: 1,
        instance: 0,
    };

    fn executor() -> (UpstreamExecutor<ScriptedHost>, ScriptedHost, Arc<Queues>) {
        let host = ScriptedHost::new();
        let queues = Arc::new(Queues::new());
        let exec = UpstreamExecutor::new(host.clone(), Arc::clone(&queues), Counters::new());
        (exec, host, queues)
    }

    fn mount(host: &ScriptedHost, protocol: InterfaceProtocol) {
        host.push(HostEvent::Mounted {
            source: KB,
            protocol,
            descriptor: Vec::new(),
        });
    }

    #[test]
    fn test_keyboard_reports_are_stamped_in_order() {
        // Arrange
        let (mut exec, host, queues) = executor();
        mount(&host, InterfaceProtocol::Keyboard);
        for key in [4u8, 0] {
            host.push(HostEvent::Report {
                source: KB,
                bytes: KeyboardReport::key(0, key).to_bytes().to_vec(),
            });
        }

        // Act
        exec.tick();

        // Assert
        let first = queues.upstream.pop().unwrap();
        let second = queues.upstream.pop().unwrap();
        assert_eq!((first.seq, second.seq), (0, 1));
        assert_eq!(
            first.report.payload,
            UpstreamPayload::Keyboard(KeyboardReport::key(0, 4))
        );
        assert!(matches!(
            queues.mounts.pop(),
            Some(MountEvent::Mounted { source: KB, .. })
        ));
    }

    #[test]
    fn test_unknown_interface_reports_travel_raw() {
        let (mut exec, host, queues) = executor();
        host.push(HostEvent::Report {
            source: KB,
            bytes: vec![1, 2, 3],
        });
        exec.tick();
        assert!(matches!(
            queues.upstream.pop().unwrap().report.payload,
            UpstreamPayload::Raw { len: 3, .. }
        ));
    }

    #[test]
    fn test_overflow_drops_oldest_and_leaves_a_gap() {
        // Arrange
        let (mut exec, host, queues) = executor();
        mount(&host, InterfaceProtocol::Keyboard);
        for _ in 0..=UPSTREAM_QUEUE_CAPACITY {
            host.push(HostEvent::Report {
                source: KB,
                bytes: vec![0; 8],
            });
        }

        // Act
        exec.tick();

        // Assert
        assert_eq!(queues.upstream.dropped(), 1);
        assert_eq!(queues.upstream.pop().unwrap().seq, 1);
    }

    #[test]
    fn test_led_bytes_are_forwarded_to_the_keyboard() {
        let (mut exec, host, queues) = executor();
        queues.leds.try_push(0x01);
        queues.leds.try_push(0x03);
        exec.tick();
        assert_eq!(host.leds(), vec![0x01, 0x03]);
    }

    #[test]
    fn test_unmount_is_posted() {
        let (mut exec, host, queues) = executor();
        host.push(HostEvent::Unmounted { source: KB });
        exec.tick();
        assert_eq!(queues.mounts.pop(), Some(MountEvent::Unmounted { source: KB }));
    }
}
