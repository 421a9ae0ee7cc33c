//! Owned system context shared by every task.
//!
//! Holds the flag set, the fan event queue and the tachometer edge state.
//! It is const-constructible so the firmware can place one in a `static`
//! (ISR callbacks receive a pointer to it); tests simply build their own.

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;
use log::warn;

use crate::drivers::tach::TachTimer;
use crate::events::{FanEvent, FanQueue};
use crate::flags::{self, EventFlags, WaitFor};

/// Grace period announced before a restart or sleep.
pub const TERMINAL_COUNTDOWN_S: u32 = 3;

/// What the power task was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Restart,
    Sleep,
}

pub struct SystemContext {
    pub flags: EventFlags,
    pub fan_events: FanQueue,
    pub tach: TachTimer,
    /// Bits the power task waits for before a restart or sleep.
    terminal_wait: AtomicU32,
}

impl SystemContext {
    pub const fn new() -> Self {
        Self {
            flags: EventFlags::new(flags::RADIO_IDLE),
            fan_events: FanQueue::new(),
            tach: TachTimer::new(),
            terminal_wait: AtomicU32::new(0),
        }
    }

    /// Non-blocking push for interrupt and timer-callback context.
    /// Returns `false` if the queue was full and the event was dropped.
    pub fn post_from_isr(&self, event: FanEvent) -> bool {
        self.fan_events.try_send(event).is_ok()
    }

    /// Discard every pending fan event; returns how many were dropped.
    pub fn drain_fan_events(&self) -> usize {
        let mut dropped = 0;
        while self.fan_events.try_receive().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Ask the power task to restart once every bit in `wait_bits` is set.
    pub fn request_restart(&self, wait_bits: u32) {
        self.terminal_wait.store(wait_bits, Ordering::Release);
        self.flags.set(flags::POWER_RESTART);
    }

    /// Ask the power task to enter sleep once every bit in `wait_bits` is set.
    pub fn request_sleep(&self, wait_bits: u32) {
        self.terminal_wait.store(wait_bits, Ordering::Release);
        self.flags.set(flags::POWER_SLEEP);
    }

    pub fn terminal_wait_bits(&self) -> u32 {
        self.terminal_wait.load(Ordering::Acquire)
    }

    /// Power task body: block until a restart or sleep is requested, count
    /// down, then wait for the recorded bits.  Restart wins if both are set.
    pub fn await_terminal(&self, delay: &mut impl DelayNs) -> Terminal {
        let mut bits = None;
        while bits.is_none() {
            bits = self.flags.wait_bits(
                flags::POWER_RESTART | flags::POWER_SLEEP,
                WaitFor::Any,
                false,
                None,
                delay,
            );
        }
        let terminal = if bits.is_some_and(|b| b & flags::POWER_RESTART != 0) {
            Terminal::Restart
        } else {
            Terminal::Sleep
        };

        for left in (1..=TERMINAL_COUNTDOWN_S).rev() {
            warn!("{:?} in {} s", terminal, left);
            delay.delay_ms(1000);
        }

        let wait = self.terminal_wait_bits();
        if wait != 0 {
            self.flags.wait_bits(wait, WaitFor::All, false, None, delay);
        }
        terminal
    }
}

impl Default for SystemContext {
    fn default() -> Self {
        Self::new()
    }
}
