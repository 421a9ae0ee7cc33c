//! Board configuration parameters
//!
//! Every difference between board revisions (encoder wiring, tachometer
//! pulse count, charger calibration) lives here as data rather than as a
//! code fork.  Values can be overridden by a postcard blob in NVS.

use serde::{Deserialize, Serialize};

/// Direction mapping of the quadrature encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// A leading B decodes as an increment.
    Normal,
    /// A leading B decodes as a decrement.
    Inverted,
}

/// Which phase-A transitions the encoder decoder acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeMode {
    /// Both A edges, direction from the final B level (Gray code).
    Quadrature,
    /// A falling edge only: one event per detent on 1-pulse/1-detent knobs.
    SingleDetent,
}

/// Electrical level at which a switch input counts as asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveLevel {
    Low,
    High,
}

impl ActiveLevel {
    /// Whether a pin reading `high` means the switch is asserted.
    pub const fn asserted(self, high: bool) -> bool {
        match self {
            Self::Low => !high,
            Self::High => high,
        }
    }
}

/// Rotary encoder and push-button wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub decode: DecodeMode,
    pub polarity: Polarity,
    /// Encoder push-button level while pressed.
    pub button_active: ActiveLevel,
    /// Emit a `Press` control event on a button edge without rotation.
    pub press_events: bool,
}

/// Fan drive, tachometer and persistence tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FanTuning {
    /// Duty change per detent.
    pub small_step: u8,
    /// Duty change per detent while the button is held.
    pub big_step: u8,
    /// Duty used on first boot and on "restore defaults".
    pub default_duty: u8,
    /// Period samples averaged per RPM estimate (N).
    pub rpm_window: u8,
    /// Timed tachometer intervals per fan revolution.
    ///
    /// The tachometer times the low half of each pulse, and a standard
    /// 4-wire fan emits two pulses per revolution, so the reference board
    /// sees four timed intervals per turn.
    pub intervals_per_rev: f32,
    /// Fan event queue receive timeout; also the persistence tick period.
    pub tick_ms: u32,
    /// Tachometer watchdog: no completed period within this window means
    /// the signal is lost.
    pub signal_timeout_ms: u32,
    /// Quiescent ticks before a dirty fan configuration is written.
    pub persist_ticks: u16,
    /// Board has an RGB fan (hue/saturation/lightness channels).
    pub rgb: bool,
}

/// USB fast-charge negotiation calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerTuning {
    /// ADC raw value separating "handshake pending" from "line released".
    pub probe_threshold: u16,
    /// Settle time after releasing both control lines.
    pub release_settle_ms: u32,
    /// Settle time before polling the data line after a positive probe.
    pub handshake_settle_ms: u32,
    /// Delay between data line polls.
    pub poll_interval_ms: u32,
    /// Maximum number of data line polls.
    pub poll_budget: u16,
    /// Quiescent ticks before a changed tier is written.
    pub persist_ticks: u16,
}

/// Hold-to-activate keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTuning {
    pub active: ActiveLevel,
    pub scan_interval_ms: u32,
    pub power_mode_hold_ms: u32,
    pub sleep_hold_ms: u32,
    /// Pause after a tier change before the keys are scanned again.
    pub rearm_delay_ms: u32,
}

/// Complete board configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub encoder: EncoderConfig,
    pub fan: FanTuning,
    pub power: PowerTuning,
    pub keys: KeyTuning,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig {
                decode: DecodeMode::Quadrature,
                polarity: Polarity::Normal,
                button_active: ActiveLevel::Low,
                press_events: false,
            },
            fan: FanTuning {
                small_step: 1,
                big_step: 10,
                default_duty: 0,
                rpm_window: 5,
                intervals_per_rev: 4.0,
                tick_ms: 500,
                signal_timeout_ms: 1000,
                persist_ticks: 50, // ~25 s of quiescence
                rgb: false,
            },
            power: PowerTuning {
                probe_threshold: 255,
                release_settle_ms: 50,
                handshake_settle_ms: 1250,
                poll_interval_ms: 10,
                poll_budget: 150,
                persist_ticks: 50,
            },
            keys: KeyTuning {
                active: ActiveLevel::Low,
                scan_interval_ms: 10,
                power_mode_hold_ms: 50,
                sleep_hold_ms: 1000,
                rearm_delay_ms: 200,
            },
        }
    }
}

impl BoardConfig {
    /// Range-check every field.  Used before persisting an override.
    pub fn validate(&self) -> Result<(), &'static str> {
        let fan = &self.fan;
        if fan.small_step == 0 || fan.big_step < fan.small_step {
            return Err("fan steps must satisfy 0 < small_step <= big_step");
        }
        if !(3..=5).contains(&fan.rpm_window) {
            return Err("rpm_window must be 3–5");
        }
        if !(fan.intervals_per_rev > 0.0 && fan.intervals_per_rev <= 16.0) {
            return Err("intervals_per_rev must be in (0, 16]");
        }
        if !(100..=2000).contains(&fan.tick_ms) {
            return Err("tick_ms must be 100–2000");
        }
        if !(100..=5000).contains(&fan.signal_timeout_ms) {
            return Err("signal_timeout_ms must be 100–5000");
        }
        if fan.persist_ticks == 0 || self.power.persist_ticks == 0 {
            return Err("persist_ticks must be non-zero");
        }
        let power = &self.power;
        if power.probe_threshold == 0 || power.probe_threshold > 4095 {
            return Err("probe_threshold must be 1–4095");
        }
        if power.poll_budget == 0 || power.poll_budget > 1000 {
            return Err("poll_budget must be 1–1000");
        }
        if power.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be non-zero");
        }
        let keys = &self.keys;
        if keys.scan_interval_ms == 0
            || keys.power_mode_hold_ms < keys.scan_interval_ms
            || keys.sleep_hold_ms < keys.scan_interval_ms
        {
            return Err("key hold times must cover at least one scan interval");
        }
        Ok(())
    }
}
