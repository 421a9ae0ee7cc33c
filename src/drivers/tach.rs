//! Tachometer edge timing.
//!
//! The tachometer output is open-collector with a pull-up; one pulse pulls
//! the line low for half its period.  The edge ISR arms on a low level and
//! captures on the following high level, so each sample is the low half
//! of one pulse.
//!
//! ```text
//! WaitingFirstEdge ──(edge, level low)──▶ TimingPeriod
//! TimingPeriod ──(edge, level high)──▶ WaitingFirstEdge   emits Period
//! TimingPeriod ──(watchdog, no period)──▶ WaitingFirstEdge   emits SignalLost
//! ```
//!
//! All state is atomic: the ISR and the watchdog callback are the only
//! writers, the fan task only enables, disables and resets.  Timestamps are
//! free-running microseconds truncated to `u32`; wrapping subtraction keeps
//! periods correct across the ~71 minute rollover.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::events::FanEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TachPhase {
    WaitingFirstEdge,
    TimingPeriod,
}

pub struct TachTimer {
    enabled: AtomicBool,
    timing: AtomicBool,
    started_us: AtomicU32,
    /// A period completed since the last watchdog expiry.
    period_seen: AtomicBool,
}

impl TachTimer {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            timing: AtomicBool::new(false),
            started_us: AtomicU32::new(0),
            period_seen: AtomicBool::new(false),
        }
    }

    pub fn enable(&self) {
        self.reset();
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.reset();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Drop any half-timed period; the next low level re-arms.
    pub fn reset(&self) {
        self.timing.store(false, Ordering::Release);
        self.period_seen.store(false, Ordering::Release);
    }

    pub fn phase(&self) -> TachPhase {
        if self.timing.load(Ordering::Acquire) {
            TachPhase::TimingPeriod
        } else {
            TachPhase::WaitingFirstEdge
        }
    }

    /// Edge interrupt.  `high` is the pin level read inside the ISR.
    ///
    /// Allocation-free and lock-free; the caller pushes the returned
    /// event with a non-blocking send.
    pub fn on_edge(&self, high: bool, now_us: u32) -> Option<FanEvent> {
        if !self.is_enabled() {
            return None;
        }
        let timing = self.timing.load(Ordering::Acquire);
        if !timing && !high {
            self.started_us.store(now_us, Ordering::Relaxed);
            self.timing.store(true, Ordering::Release);
            None
        } else if timing && high {
            let elapsed_us = now_us.wrapping_sub(self.started_us.load(Ordering::Relaxed));
            self.timing.store(false, Ordering::Release);
            self.period_seen.store(true, Ordering::Release);
            Some(FanEvent::Period { elapsed_us })
        } else {
            None
        }
    }

    /// Watchdog alarm, fired every signal-timeout window.
    ///
    /// Emits `SignalLost` only if no period completed during the window.
    pub fn on_alarm(&self) -> Option<FanEvent> {
        if !self.is_enabled() {
            return None;
        }
        if self.period_seen.swap(false, Ordering::AcqRel) {
            return None;
        }
        self.timing.store(false, Ordering::Release);
        Some(FanEvent::SignalLost)
    }
}

impl Default for TachTimer {
    fn default() -> Self {
        Self::new()
    }
}
