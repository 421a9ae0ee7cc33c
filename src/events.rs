//! Fan event queue.
//!
//! Events are produced by:
//! - the encoder sampler task (decoded control events, 1 kHz)
//! - the tachometer edge ISR (completed period samples)
//! - the tachometer watchdog timer (signal lost)
//!
//! and consumed by the fan control loop.  Both producers push into the same
//! bounded FIFO; the consumer tells them apart by variant, not by source.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Sampler task │────▶│              │     │              │
//! │ Tach ISR     │────▶│  Fan queue   │────▶│  Fan loop    │
//! │ Tach alarm   │────▶│  (depth 10)  │     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

use embedded_hal::delay::DelayNs;
use heapless::mpmc::MpMcQueue;

/// Fan queue depth.  At 1 kHz sampling this leaves ample slack while the
/// consumer is healthy; a persistently full queue means it stalled.
pub const FAN_QUEUE_DEPTH: usize = 10;

/// Backing ring size; must be a power of two no smaller than the depth.
const RING_SLOTS: usize = 16;

/// Poll interval for the blocking queue operations.
pub const QUEUE_POLL_MS: u32 = 1;

/// Decoded user input, one per sampler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Nothing changed this tick.  Filtered out before the queue.
    None,
    Increment,
    Decrement,
    /// Increment with the button held.
    IncrementBig,
    /// Decrement with the button held.
    DecrementBig,
    /// Button pressed without rotation (boards with press events only).
    Press,
}

/// Every element of the fan queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanEvent {
    Control(ControlEvent),
    /// One timed tachometer interval, in microseconds.
    Period { elapsed_us: u32 },
    /// No tachometer period completed within the watchdog window.
    SignalLost,
}

/// Bounded multi-producer queue of [`FanEvent`]s.
///
/// Lock-free on both ends, so ISRs and timer callbacks may push.  The
/// depth counter is reserved before the enqueue and released after the
/// dequeue, so at most [`FAN_QUEUE_DEPTH`] events are ever pending.
pub struct FanQueue {
    ring: MpMcQueue<FanEvent, RING_SLOTS>,
    len: AtomicU8,
}

impl FanQueue {
    pub const fn new() -> Self {
        Self {
            ring: MpMcQueue::new(),
            len: AtomicU8::new(0),
        }
    }

    /// Non-blocking push.  Hands the event back when the queue is full.
    pub fn try_send(&self, event: FanEvent) -> Result<(), FanEvent> {
        let reserved = self.len.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (usize::from(n) < FAN_QUEUE_DEPTH).then_some(n + 1)
        });
        if reserved.is_err() {
            return Err(event);
        }
        self.ring.enqueue(event).map_err(|event| {
            self.len.fetch_sub(1, Ordering::AcqRel);
            event
        })
    }

    /// Push, polling every [`QUEUE_POLL_MS`] until there is room.
    pub fn send_blocking(&self, mut event: FanEvent, delay: &mut impl DelayNs) {
        loop {
            match self.try_send(event) {
                Ok(()) => return,
                Err(back) => event = back,
            }
            delay.delay_ms(QUEUE_POLL_MS);
        }
    }

    pub fn try_receive(&self) -> Option<FanEvent> {
        let event = self.ring.dequeue()?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(event)
    }

    /// Pop the oldest event, waiting up to `timeout_ms`.  `None` is a
    /// timeout.
    pub fn receive_timeout(&self, timeout_ms: u32, delay: &mut impl DelayNs) -> Option<FanEvent> {
        let mut waited = 0;
        loop {
            if let Some(event) = self.try_receive() {
                return Some(event);
            }
            if waited >= timeout_ms {
                return None;
            }
            delay.delay_ms(QUEUE_POLL_MS);
            waited += QUEUE_POLL_MS;
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.len.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FanQueue {
    fn default() -> Self {
        Self::new()
    }
}
