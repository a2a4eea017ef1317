//! Bounded queues between executor U (keyboard side) and executor D (host side).
//!
//! # Why lock-free queues? (for beginners)
//!
//! The two executors run in parallel and must never wait on each other: a
//! keystroke arriving while the other side is busy saving a macro still has to
//! be captured.  `crossbeam_queue::ArrayQueue` is a fixed-capacity ring buffer
//! that both sides can touch without a mutex.  Each queue below has exactly one
//! producer and one consumer; the wrappers only add the overflow policy.
//!
//! | Queue        | Capacity | Producer → consumer | When full                       |
//! |--------------|----------|---------------------|---------------------------------|
//! | upstream     | 12       | U → D               | drop the oldest report, count it |
//! | downstream   | 256      | D → D (emitter)     | hand the record back; caller pumps |
//! | LED          | 4        | D → U               | drop the new value              |
//! | mount        | 4        | U → D               | drop the new event              |

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;
use hidproxy_core::domain::{DownstreamRecord, InterfaceProtocol, SourceId, UpstreamReport};
use hidproxy_core::protocol::ReportInfo;

pub const UPSTREAM_QUEUE_CAPACITY: usize = 12;
pub const DOWNSTREAM_QUEUE_CAPACITY: usize = 256;
pub const LED_QUEUE_CAPACITY: usize = 4;
pub const MOUNT_QUEUE_CAPACITY: usize = 4;

// ── Upstream ──────────────────────────────────────────────────────────────────

/// A received report stamped with its receive sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedReport {
    pub seq: u32,
    pub report: UpstreamReport,
}

/// Real-time queue of received reports.  Never blocks the producer.
#[derive(Debug)]
pub struct UpstreamQueue {
    inner: ArrayQueue<QueuedReport>,
    dropped: AtomicU64,
}

impl UpstreamQueue {
    pub fn new() -> Self {
        Self::with_capacity(UPSTREAM_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues `report`, evicting the oldest entry if full.  Returns the
    /// evicted report.
    pub fn push(&self, report: QueuedReport) -> Option<QueuedReport> {
        let evicted = self.inner.force_push(report);
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    pub fn pop(&self) -> Option<QueuedReport> {
        self.inner.pop()
    }

    /// Reports evicted since boot.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for UpstreamQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Downstream ────────────────────────────────────────────────────────────────

/// Reports waiting for the downstream emitter.  The producer must not lose
/// records, so a full queue hands the record back instead of dropping it.
#[derive(Debug)]
pub struct DownstreamQueue {
    inner: ArrayQueue<DownstreamRecord>,
}

impl DownstreamQueue {
    pub fn new() -> Self {
        Self::with_capacity(DOWNSTREAM_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    /// # Errors
    ///
    /// Returns the record unchanged when the queue is full.
    pub fn try_push(&self, record: DownstreamRecord) -> Result<(), DownstreamRecord> {
        self.inner.push(record)
    }

    pub fn pop(&self) -> Option<DownstreamRecord> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }
}

impl Default for DownstreamQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── LEDs ──────────────────────────────────────────────────────────────────────

/// LED bitmaps for the physical keyboard.
#[derive(Debug)]
pub struct LedQueue {
    inner: ArrayQueue<u8>,
}

impl LedQueue {
    pub fn new() -> Self {
        Self {
            inner: ArrayQueue::new(LED_QUEUE_CAPACITY),
        }
    }

    /// Non-blocking add.  Returns `false` if the queue was full.
    pub fn try_push(&self, leds: u8) -> bool {
        self.inner.push(leds).is_ok()
    }

    pub fn pop(&self) -> Option<u8> {
        self.inner.pop()
    }
}

impl Default for LedQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Mount events ──────────────────────────────────────────────────────────────

/// A change in the set of upstream HID interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountEvent {
    Mounted {
        source: SourceId,
        protocol: InterfaceProtocol,
        reports: Vec<ReportInfo>,
    },
    Unmounted {
        source: SourceId,
    },
}

#[derive(Debug)]
pub struct MountQueue {
    inner: ArrayQueue<MountEvent>,
}

impl MountQueue {
    pub fn new() -> Self {
        Self {
            inner: ArrayQueue::new(MOUNT_QUEUE_CAPACITY),
        }
    }

    /// Returns `false` (and drops the event) if the queue was full.
    pub fn try_push(&self, event: MountEvent) -> bool {
        self.inner.push(event).is_ok()
    }

    pub fn pop(&self) -> Option<MountEvent> {
        self.inner.pop()
    }
}

impl Default for MountQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Flags ─────────────────────────────────────────────────────────────────────

/// The only state shared between executors outside the queues.
#[derive(Debug, Default)]
pub struct SharedFlags {
    usb_device_ever_mounted: AtomicBool,
    kvstore_init_complete: AtomicBool,
}

impl SharedFlags {
    pub fn mark_usb_device_mounted(&self) {
        self.usb_device_ever_mounted.store(true, Ordering::Release);
    }

    pub fn usb_device_ever_mounted(&self) -> bool {
        self.usb_device_ever_mounted.load(Ordering::Acquire)
    }

    pub fn mark_kvstore_ready(&self) {
        self.kvstore_init_complete.store(true, Ordering::Release);
    }

    pub fn kvstore_init_complete(&self) -> bool {
        self.kvstore_init_complete.load(Ordering::Acquire)
    }
}

// ── Shared bundle ─────────────────────────────────────────────────────────────

/// All queues, shared between the executors through an `Arc`.
#[derive(Debug, Default)]
pub struct Queues {
    pub upstream: UpstreamQueue,
    pub downstream: DownstreamQueue,
    pub leds: LedQueue,
    pub mounts: MountQueue,
    pub flags: SharedFlags,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hidproxy_core::domain::{KeyboardReport, UpstreamPayload};

    fn report(key: u8) -> QueuedReport {
        QueuedReport {
            seq: u32::from(key),
            report: UpstreamReport {
                source: SourceId {
                    dev_addr: 1,
                    instance: 0,
                },
                payload: UpstreamPayload::Keyboard(KeyboardReport::key(0, key)),
            },
        }
    }

    #[test]
    fn test_upstream_overflow_drops_oldest_and_counts() {
        // Arrange
        let q = UpstreamQueue::new();
        for k in 0..UPSTREAM_QUEUE_CAPACITY as u8 {
            assert!(q.push(report(k)).is_none());
        }

        // Act: the thirteenth push triggers the overflow policy.
        let evicted = q.push(report(0xAA));

        // Assert
        assert_eq!(evicted, Some(report(0)));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.len(), UPSTREAM_QUEUE_CAPACITY);
        assert_eq!(q.pop(), Some(report(1)));
    }

    #[test]
    fn test_downstream_full_hands_record_back() {
        // Arrange
        let q = DownstreamQueue::with_capacity(2);
        let rec = DownstreamRecord::keyboard(&KeyboardReport::key(0, 4));
        q.try_push(rec).unwrap();
        q.try_push(rec).unwrap();

        // Act
        let result = q.try_push(rec);

        // Assert
        assert_eq!(result, Err(rec));
        assert!(q.is_full());
    }

    #[test]
    fn test_downstream_default_capacity() {
        let q = DownstreamQueue::new();
        let rec = DownstreamRecord::keyboard(&KeyboardReport::RELEASE_ALL);
        for _ in 0..DOWNSTREAM_QUEUE_CAPACITY {
            q.try_push(rec).unwrap();
        }
        assert!(q.try_push(rec).is_err());
    }

    #[test]
    fn test_led_queue_rejects_fifth_value() {
        let q = LedQueue::new();
        for v in 0..4 {
            assert!(q.try_push(v));
        }
        assert!(!q.try_push(4));
        assert_eq!(q.pop(), Some(0));
    }

    #[test]
    fn test_flags_start_clear_and_latch() {
        let flags = SharedFlags::default();
        assert!(!flags.usb_device_ever_mounted());
        assert!(!flags.kvstore_init_complete());
        flags.mark_usb_device_mounted();
        flags.mark_kvstore_ready();
        assert!(flags.usb_device_ever_mounted());
        assert!(flags.kvstore_init_complete());
    }

    #[test]
    fn test_queues_are_fifo_across_threads() {
        // Arrange
        let queues = std::sync::Arc::new(Queues::new());
        let producer = std::sync::Arc::clone(&queues);

        // Act
        let handle = std::thread::spawn(move || {
            for k in 0..200u8 {
                let rec = DownstreamRecord::keyboard(&KeyboardReport::key(0, k));
                let mut pending = rec;
                while let Err(back) = producer.downstream.try_push(pending) {
                    pending = back;
                    std::thread::yield_now();
                }
            }
        });
        let mut seen = Vec::new();
        while seen.len() < 200 {
            if let Some(rec) = queues.downstream.pop() {
                seen.push(rec.as_keyboard().unwrap().first_key());
            }
        }
        handle.join().unwrap();

        // Assert
        let expected: Vec<u8> = (0..200u8).collect();
        assert_eq!(seen, expected);
    }
}
