//! Sequence numbers for diagnostic report tracing.
//!
//! # Why number reports? (for beginners)
//!
//! When a keystroke goes missing between the physical keyboard and the host,
//! the question is *where* it was lost.  The proxy stamps every keyboard report
//! it receives with a number from one counter, and every report it sends with
//! a number from another.  The diagnostic dump prints both histories; a jump
//! in either sequence, or a received report with no sent counterpart, points
//! at the stage that dropped it.
//!
//! The counter is an `AtomicU32` so the upstream executor can stamp reports
//! without a lock while the downstream executor reads the current value for
//! the status line.

use std::sync::atomic::{AtomicU32, Ordering};

/// A lock-free, wrapping sequence counter.
///
/// # Examples
///
/// ```rust
/// use hidproxy_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.current(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next number.  Wraps from `u32::MAX` to 0.
    pub fn next(&self) -> u32 {
        // Relaxed: the value orders diagnostics only, never memory.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// The number the next call to [`SequenceCounter::next`] will return.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Distance from `previous` to `next`, accounting for wrap-around.  A
/// contiguous pair yields 1.
pub fn sequence_gap(previous: u32, next: u32) -> u32 {
    next.wrapping_sub(previous)
}
