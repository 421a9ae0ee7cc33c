//! Shared event-flag set for coarse cross-task signaling.
//!
//! A single `AtomicU32` bitset.  Each bit has one logical owner that sets
//! and clears it; any number of tasks may wait for a combination of bits.
//! Set and clear are single atomic read-modify-write operations, so no
//! extra locking is needed and they are safe to call from interrupts.
//!
//! | Bit              | Owner            | Meaning when set                    |
//! |------------------|------------------|-------------------------------------|
//! | `POWER_RESTART`  | update / keys    | restart requested                   |
//! | `POWER_SLEEP`    | keys             | sleep requested                     |
//! | `GUI_RELOAD`     | status screen    | screen state changed, refresh now   |
//! | `KEY_SCAN_RUN`   | app service      | hold keys may be scanned            |
//! | `FAN_RUN`        | fan controller   | fan on, control events consumed     |
//! | `RADIO_IDLE`     | radio adapter    | no connection open                  |
//! | `RADIO_LOCK`     | update session   | reset pending, updates refused      |

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;

pub const POWER_RESTART: u32 = 1 << 0;
pub const POWER_SLEEP: u32 = 1 << 1;
pub const GUI_RELOAD: u32 = 1 << 2;
pub const KEY_SCAN_RUN: u32 = 1 << 3;
pub const FAN_RUN: u32 = 1 << 4;
pub const RADIO_IDLE: u32 = 1 << 5;
pub const RADIO_LOCK: u32 = 1 << 6;

/// Poll granularity of the blocking waits (one FreeRTOS tick).
const WAIT_POLL_MS: u32 = 10;

/// How a multi-bit wait is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFor {
    Any,
    All,
}

pub struct EventFlags {
    bits: AtomicU32,
}

impl EventFlags {
    pub const fn new(initial: u32) -> Self {
        Self {
            bits: AtomicU32::new(initial),
        }
    }

    /// Set `mask`; returns the previous value.
    pub fn set(&self, mask: u32) -> u32 {
        self.bits.fetch_or(mask, Ordering::AcqRel)
    }

    /// Clear `mask`; returns the previous value.
    pub fn clear(&self, mask: u32) -> u32 {
        self.bits.fetch_and(!mask, Ordering::AcqRel)
    }

    pub fn get(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    /// True when every bit in `mask` is set.
    pub fn is_set(&self, mask: u32) -> bool {
        self.get() & mask == mask
    }

    fn satisfied(&self, mask: u32, mode: WaitFor) -> Option<u32> {
        let bits = self.get();
        let hit = match mode {
            WaitFor::Any => bits & mask != 0,
            WaitFor::All => bits & mask == mask,
        };
        hit.then_some(bits)
    }

    /// Block until `mask` is satisfied, or until `timeout_ms` elapses.
    ///
    /// Returns the flag value observed when the wait was satisfied, or
    /// `None` on timeout.  With `clear_on_exit` the bits in `mask` are
    /// cleared before returning.
    pub fn wait_bits(
        &self,
        mask: u32,
        mode: WaitFor,
        clear_on_exit: bool,
        timeout_ms: Option<u32>,
        delay: &mut impl DelayNs,
    ) -> Option<u32> {
        let mut waited = 0u32;
        loop {
            if let Some(bits) = self.satisfied(mask, mode) {
                if clear_on_exit {
                    self.clear(mask);
                }
                return Some(bits);
            }
            if timeout_ms.is_some_and(|t| waited >= t) {
                return None;
            }
            delay.delay_ms(WAIT_POLL_MS);
            waited = waited.saturating_add(WAIT_POLL_MS);
        }
    }

    /// Block until every bit in `mask` is clear.  Returns `false` on timeout.
    pub fn wait_cleared(
        &self,
        mask: u32,
        timeout_ms: Option<u32>,
        delay: &mut impl DelayNs,
    ) -> bool {
        let mut waited = 0u32;
        while self.get() & mask != 0 {
            if timeout_ms.is_some_and(|t| waited >= t) {
                return false;
            }
            delay.delay_ms(WAIT_POLL_MS);
            waited = waited.saturating_add(WAIT_POLL_MS);
        }
        true
    }

    /// Clear `mask` for the lifetime of the returned guard.
    ///
    /// Bits that were set when the guard was taken are set again when it
    /// drops, on every exit path.  Call [`SuspendGuard::keep`] when the
    /// suspension is meant to outlive the scope.
    pub fn suspend(&self, mask: u32) -> SuspendGuard<'_> {
        let previous = self.clear(mask);
        SuspendGuard {
            flags: self,
            restore: previous & mask,
        }
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Restores suspended flag bits on drop.
#[must_use = "dropping the guard immediately restores the bits"]
pub struct SuspendGuard<'a> {
    flags: &'a EventFlags,
    restore: u32,
}

impl SuspendGuard<'_> {
    /// Leave the bits cleared.
    pub fn keep(mut self) {
        self.restore = 0;
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        if self.restore != 0 {
            self.flags.set(self.restore);
        }
    }
}
