//! Quick Charge handshake and tier control.
//!
//! ```text
//!   release both lines ── settle ── D+ = 0.325 V ── sample
//!        │                                            │
//!        │                     below threshold ◀──────┤──▶ StandardPort
//!        │                                            │
//!        └── handshake settle ── poll until D- pulls D+ low
//!                                   │            │
//!                         budget spent           dropped
//!                               ▼                  ▼
//!                      DedicatedCharger     drive tier pair (QC)
//! ```
//!
//! The sequence always runs to completion; nothing downstream may draw full
//! current until [`PowerNegotiator::negotiate`] returns.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::app::ports::{ChargerPort, ControlLine, StoragePort};
use crate::config::PowerTuning;
use crate::persist::Debounced;

use super::{PROBE_CODE, PowerError, PowerTier};

pub struct PowerNegotiator {
    tuning: PowerTuning,
    /// Active classification or tier.
    tier: PowerTier,
    /// Requested fast-charge tier, persisted.
    preferred: Debounced<PowerTier>,
    capable: bool,
}

impl PowerNegotiator {
    pub fn new(tuning: &PowerTuning, storage: &impl StoragePort) -> Self {
        let preferred = Debounced::load_or(storage, PowerTier::Qc5V, tuning.persist_ticks);
        Self {
            tuning: *tuning,
            tier: PowerTier::DcIn,
            preferred,
            capable: false,
        }
    }

    pub fn tier(&self) -> PowerTier {
        self.tier
    }

    /// The tier requested at startup (last persisted, QC 5V on first boot).
    pub fn requested(&self) -> PowerTier {
        self.preferred.get()
    }

    pub fn label(&self) -> &'static str {
        self.tier.label()
    }

    pub fn is_fast_charge_capable(&self) -> bool {
        self.capable
    }

    pub fn is_saved(&self) -> bool {
        !self.preferred.is_dirty()
    }

    /// Classify the supply and, on a fast-charge capable one, request
    /// `requested`.  Blocks for the whole handshake (up to ~3 s).
    pub fn negotiate(
        &mut self,
        requested: PowerTier,
        hw: &mut impl ChargerPort,
        delay: &mut impl DelayNs,
        storage: &mut impl StoragePort,
    ) -> PowerTier {
        self.capable = false;
        hw.enable_line(ControlLine::Dp, false);
        hw.enable_line(ControlLine::Dm, false);
        delay.delay_ms(self.tuning.release_settle_ms);

        hw.set_line(ControlLine::Dp, PROBE_CODE);
        hw.enable_line(ControlLine::Dp, true);

        let threshold = self.tuning.probe_threshold;
        let mut level = hw.sample();
        if level < threshold {
            hw.enable_line(ControlLine::Dp, false);
            self.tier = PowerTier::StandardPort;
            info!("power: {} (probe={})", self.tier, level);
            return self.tier;
        }

        delay.delay_ms(self.tuning.handshake_settle_ms);
        let mut polls = 0u16;
        loop {
            level = hw.sample();
            polls += 1;
            if level <= threshold || polls >= self.tuning.poll_budget {
                break;
            }
            delay.delay_ms(self.tuning.poll_interval_ms);
        }
        hw.enable_line(ControlLine::Dp, false);

        if level > threshold {
            self.tier = PowerTier::DedicatedCharger;
            info!("power: {} after {} polls", self.tier, polls);
            return self.tier;
        }

        self.capable = true;
        let tier = if requested.is_fast_charge() {
            requested
        } else {
            PowerTier::Qc5V
        };
        self.drive(tier, hw);
        self.preferred.commit(tier, storage);
        info!("power: {} negotiated after {} polls", self.tier, polls);
        self.tier
    }

    /// Switch to another fast-charge tier.  The choice is persisted after
    /// the quiescence window.
    pub fn set_tier(&mut self, tier: PowerTier, hw: &mut impl ChargerPort) -> Result<(), PowerError> {
        if !self.capable {
            return Err(PowerError::NotNegotiable);
        }
        if !tier.is_fast_charge() {
            return Err(PowerError::InvalidTier(tier));
        }
        self.drive(tier, hw);
        if self.preferred.update(tier) {
            info!("power: -> {}", tier);
        }
        Ok(())
    }

    /// Step QC 5V → 9V → 12V → 5V.
    pub fn cycle_tier(&mut self, hw: &mut impl ChargerPort) -> Result<PowerTier, PowerError> {
        let next = self.tier.next_fast_charge();
        self.set_tier(next, hw)?;
        Ok(next)
    }

    /// Disconnect both control lines (before reset or sleep).  The supply
    /// falls back to 5 V.
    pub fn release(&mut self, hw: &mut impl ChargerPort) {
        hw.enable_line(ControlLine::Dp, false);
        hw.enable_line(ControlLine::Dm, false);
    }

    pub fn tick(&mut self, storage: &mut impl StoragePort) -> bool {
        self.preferred.tick(storage)
    }

    pub fn flush(&mut self, storage: &mut impl StoragePort) -> bool {
        self.preferred.flush(storage)
    }

    fn drive(&mut self, tier: PowerTier, hw: &mut impl ChargerPort) {
        let Some((dp, dm)) = tier.dac_pair() else {
            warn!("power: no DAC pair for {}", tier);
            return;
        };
        hw.set_line(ControlLine::Dp, dp);
        hw.set_line(ControlLine::Dm, dm);
        hw.enable_line(ControlLine::Dp, true);
        hw.enable_line(ControlLine::Dm, true);
        self.tier = tier;
    }
}
