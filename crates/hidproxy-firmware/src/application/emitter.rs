//! The downstream emitter: sole consumer of the downstream queue.
//!
//! At most one report is in flight to the host.  [`DownstreamEmitter::tick`]
//! submits the next record only once the device stack has reported the
//! previous one complete.

use tracing::{trace, warn};

use hidproxy_core::domain::DownstreamRecord;

use crate::infrastructure::queues::DownstreamQueue;
use crate::infrastructure::usb::DownstreamDevice;

/// What one [`DownstreamEmitter::tick`] did with the record it dequeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Sent(DownstreamRecord),
    /// The device refused it; the record is gone.
    Refused(DownstreamRecord),
}

#[derive(Debug, Default)]
pub struct DownstreamEmitter {
    in_flight: bool,
}

impl DownstreamEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Submits one queued record if nothing is in flight.  Returns `None`
    /// when nothing was dequeued.
    ///
    /// A refused record is logged and dropped; the next tick moves on to the
    /// following record.
    pub fn tick(
        &mut self,
        queue: &DownstreamQueue,
        device: &mut dyn DownstreamDevice,
    ) -> Option<Submission> {
        if self.in_flight {
            return None;
        }
        let record = queue.pop()?;
        match device.send_report(&record) {
            Ok(()) => {
                trace!(report_id = record.report_id, "submitted to host");
                self.in_flight = true;
                Some(Submission::Sent(record))
            }
            Err(e) => {
                warn!(error = %e, "host refused report; dropped");
                Some(Submission::Refused(record))
            }
        }
    }

    /// Called when the device stack signals the transfer finished.
    pub fn on_complete(&mut self) {
        self.in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::usb::mock::RecordingDevice;
    use hidproxy_core::domain::KeyboardReport;

    fn rec(key: u8) -> DownstreamRecord {
        DownstreamRecord::keyboard(&KeyboardReport::key(0, key))
    }

    #[test]
    fn test_one_report_in_flight_at_a_time() {
        // Arrange
        let queue = DownstreamQueue::new();
        queue.try_push(rec(4)).unwrap();
        queue.try_push(rec(5)).unwrap();
        let mut device = RecordingDevice::new();
        let mut emitter = DownstreamEmitter::new();

        // Act
        let first = emitter.tick(&queue, &mut device);
        let blocked = emitter.tick(&queue, &mut device);
        emitter.on_complete();
        let second = emitter.tick(&queue, &mut device);

        // Assert
        assert_eq!(first, Some(Submission::Sent(rec(4))));
        assert_eq!(blocked, None);
        assert_eq!(second, Some(Submission::Sent(rec(5))));
        assert_eq!(device.sent(), vec![rec(4), rec(5)]);
    }

    #[test]
    fn test_refused_record_is_dropped_and_not_in_flight() {
        // Arrange
        let queue = DownstreamQueue::new();
        queue.try_push(rec(4)).unwrap();
        queue.try_push(rec(5)).unwrap();
        let mut device = RecordingDevice::new();
        device.refuse_next(1);
        let mut emitter = DownstreamEmitter::new();

        // Act
        let refused = emitter.tick(&queue, &mut device);
        let next = emitter.tick(&queue, &mut device);

        // Assert
        assert_eq!(refused, Some(Submission::Refused(rec(4))));
        assert_eq!(next, Some(Submission::Sent(rec(5))));
        assert!(emitter.in_flight());
        assert_eq!(device.sent(), vec![rec(5)]);
    }

    #[test]
    fn test_empty_queue_does_nothing() {
        let mut emitter = DownstreamEmitter::new();
        let mut device = RecordingDevice::new();
        assert_eq!(emitter.tick(&DownstreamQueue::new(), &mut device), None);
        assert!(!emitter.in_flight());
    }
}
