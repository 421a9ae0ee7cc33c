//! Hold-to-activate keys (power mode, sleep).
//!
//! Scanned every `scan_interval_ms` while key scanning and the fan are
//! both enabled.  A key fires once after being held for its hold time and
//! re-arms only after it is released.

use embedded_hal::digital::InputPin;

use crate::config::{ActiveLevel, KeyTuning};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Step to the next fast-charge tier.
    PowerMode,
    Sleep,
}

/// Hold counter for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldKey {
    active: ActiveLevel,
    hold_scans: u16,
    count: u16,
    fired: bool,
}

impl HoldKey {
    pub fn new(active: ActiveLevel, hold_ms: u32, scan_interval_ms: u32) -> Self {
        let scans = (hold_ms / scan_interval_ms.max(1)).clamp(1, u32::from(u16::MAX));
        Self {
            active,
            hold_scans: scans as u16,
            count: 0,
            fired: false,
        }
    }

    /// Feed one scan.  Returns `true` on the scan the hold time is reached.
    pub fn scan(&mut self, high: bool) -> bool {
        if !self.active.asserted(high) {
            self.count = 0;
            self.fired = false;
            return false;
        }
        if self.fired {
            return false;
        }
        self.count += 1;
        if self.count >= self.hold_scans {
            self.count = 0;
            self.fired = true;
            return true;
        }
        false
    }
}

pub struct KeyScanner<P, S> {
    power_pin: P,
    sleep_pin: S,
    power: HoldKey,
    sleep: HoldKey,
}

impl<P: InputPin, S: InputPin> KeyScanner<P, S> {
    pub fn new(power_pin: P, sleep_pin: S, tuning: &KeyTuning) -> Self {
        Self {
            power_pin,
            sleep_pin,
            power: HoldKey::new(tuning.active, tuning.power_mode_hold_ms, tuning.scan_interval_ms),
            sleep: HoldKey::new(tuning.active, tuning.sleep_hold_ms, tuning.scan_interval_ms),
        }
    }

    /// One scan of both keys.  A failed pin read counts as released.
    pub fn scan(&mut self) -> Option<KeyAction> {
        let idle = !matches!(self.power.active, ActiveLevel::High);
        let power_high = self.power_pin.is_high().unwrap_or(idle);
        let sleep_high = self.sleep_pin.is_high().unwrap_or(idle);
        let power = self.power.scan(power_high);
        let sleep = self.sleep.scan(sleep_high);
        if power {
            Some(KeyAction::PowerMode)
        } else if sleep {
            Some(KeyAction::Sleep)
        } else {
            None
        }
    }
}
