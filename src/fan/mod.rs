//! Fan controller.
//!
//! Owns the fan configuration (duty and, on RGB boards, a colour) and the
//! RPM estimate.  The fan task feeds it one queue result per receive:
//! control events adjust the active setting, tachometer samples feed the
//! estimator, and a receive timeout clears transient tachometer state.
//!
//! ```text
//!        set_mode(true)
//!   Off ───────────────▶ On      tach enabled, last duty restored,
//!    ▲                   │       stale queued events discarded
//!    └───────────────────┘
//!        set_mode(false)         tach disabled, PWM forced to 0
//! ```

pub mod color;
pub mod rpm;

use heapless::Vec;
use log::{debug, info};

use crate::app::ports::{ActuatorPort, StoragePort};
use crate::config::FanTuning;
use crate::context::SystemContext;
use crate::events::{ControlEvent, FanEvent};
use crate::flags;
use crate::persist::{Debounced, MAX_RECORD, Persisted};

use self::rpm::RpmEstimator;

pub const HUE_MAX: u16 = 359;
pub const PERCENT_MAX: u16 = 100;

/// Persisted fan settings.  Colour fields stay zero on non-RGB boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanConfig {
    pub duty: u8,
    pub hue: u16,
    pub saturation: u16,
    pub lightness: u16,
}

impl FanConfig {
    pub const fn with_duty(duty: u8) -> Self {
        Self {
            duty,
            hue: 0,
            saturation: 0,
            lightness: 0,
        }
    }
}

impl Persisted for FanConfig {
    const KEY: &'static str = "fan_cfg";

    /// `{duty, hue, saturation, lightness}` as u16 little-endian.
    fn encode(&self) -> Vec<u8, MAX_RECORD> {
        let mut out = Vec::new();
        for field in [u16::from(self.duty), self.hue, self.saturation, self.lightness] {
            let _ = out.extend_from_slice(&field.to_le_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        let field = |i: usize| -> Option<u16> {
            let raw: [u8; 2] = bytes.get(i * 2..i * 2 + 2)?.try_into().ok()?;
            Some(u16::from_le_bytes(raw))
        };
        let duty = field(0)?.min(255) as u8;
        Some(Self {
            duty,
            hue: field(1).unwrap_or(0).min(HUE_MAX),
            saturation: field(2).unwrap_or(0).min(PERCENT_MAX),
            lightness: field(3).unwrap_or(0).min(PERCENT_MAX),
        })
    }
}

/// Setting adjusted by the encoder.  A `Press` event cycles through them on
/// RGB boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustTarget {
    Duty,
    Hue,
    Saturation,
    Lightness,
}

impl AdjustTarget {
    fn next(self) -> Self {
        match self {
            Self::Duty => Self::Hue,
            Self::Hue => Self::Saturation,
            Self::Saturation => Self::Lightness,
            Self::Lightness => Self::Duty,
        }
    }
}

pub struct FanController<'a> {
    ctx: &'a SystemContext,
    tuning: FanTuning,
    config: Debounced<FanConfig>,
    on: bool,
    rpm: RpmEstimator,
    target: AdjustTarget,
}

impl<'a> FanController<'a> {
    /// Load the stored configuration (or the board default).  The fan
    /// starts off; call [`set_mode`](Self::set_mode) once power is settled.
    pub fn new(ctx: &'a SystemContext, tuning: &FanTuning, storage: &impl StoragePort) -> Self {
        let config = Debounced::load_or(
            storage,
            FanConfig::with_duty(tuning.default_duty),
            tuning.persist_ticks,
        );
        info!("fan: duty={} loaded", config.get().duty);
        Self {
            ctx,
            tuning: *tuning,
            config,
            on: false,
            rpm: RpmEstimator::new(tuning.rpm_window, tuning.intervals_per_rev),
            target: AdjustTarget::Duty,
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn duty(&self) -> u8 {
        self.config.get().duty
    }

    pub fn config(&self) -> FanConfig {
        self.config.get()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Last RPM estimate; 0 while the signal is lost or the fan is off.
    pub fn rpm(&self) -> f32 {
        self.rpm.rpm()
    }

    pub fn is_saved(&self) -> bool {
        !self.config.is_dirty()
    }

    pub fn adjust_target(&self) -> AdjustTarget {
        self.target
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        let c = self.config.get();
        color::hsl_to_rgb(c.hue, c.saturation, c.lightness)
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Clamp to 0–255 and apply.  A repeated identical value is a no-op:
    /// no PWM write, no dirty mark, no countdown restart.
    pub fn set_duty(&mut self, value: i32, hw: &mut impl ActuatorPort) -> bool {
        let duty = value.clamp(0, 255) as u8;
        let mut next = self.config.get();
        next.duty = duty;
        if !self.config.update(next) {
            return false;
        }
        if self.on {
            hw.set_fan_pwm(duty);
        }
        debug!("fan: duty -> {}", duty);
        true
    }

    /// Set the RGB colour; values are clamped to their ranges.
    pub fn set_color(
        &mut self,
        hue: u16,
        saturation: u16,
        lightness: u16,
        hw: &mut impl ActuatorPort,
    ) -> bool {
        if !self.tuning.rgb {
            return false;
        }
        let mut next = self.config.get();
        next.hue = hue.min(HUE_MAX);
        next.saturation = saturation.min(PERCENT_MAX);
        next.lightness = lightness.min(PERCENT_MAX);
        if !self.config.update(next) {
            return false;
        }
        if self.on {
            let (r, g, b) = self.rgb();
            hw.set_fan_rgb(r, g, b);
        }
        true
    }

    /// Restore the board default duty.
    pub fn restore_default(&mut self, hw: &mut impl ActuatorPort) -> bool {
        self.set_duty(i32::from(self.tuning.default_duty), hw)
    }

    /// Switch the fan on or off.  Synchronous: hardware is updated before
    /// this returns.
    pub fn set_mode(&mut self, on: bool, hw: &mut impl ActuatorPort) {
        if on == self.on {
            return;
        }
        self.on = on;
        if on {
            let stale = self.ctx.drain_fan_events();
            if stale > 0 {
                debug!("fan: discarded {} stale events", stale);
            }
            self.rpm.reset();
            self.ctx.tach.enable();
            hw.set_tach_enabled(true);
            hw.set_fan_pwm(self.duty());
            if self.tuning.rgb {
                let (r, g, b) = self.rgb();
                hw.set_fan_rgb(r, g, b);
            }
            self.ctx.flags.set(flags::FAN_RUN);
            info!("fan: on (duty={})", self.duty());
        } else {
            self.ctx.flags.clear(flags::FAN_RUN);
            hw.set_tach_enabled(false);
            self.ctx.tach.disable();
            hw.set_fan_pwm(0);
            if self.tuning.rgb {
                hw.set_fan_rgb(0, 0, 0);
            }
            self.rpm.reset();
            info!("fan: off");
        }
    }

    /// Handle one fan-queue receive.  `None` means the receive timed out.
    pub fn service(&mut self, event: Option<FanEvent>, hw: &mut impl ActuatorPort) {
        match event {
            None => {
                self.rpm.reset();
                self.ctx.tach.reset();
            }
            Some(FanEvent::Control(control)) => {
                if self.on {
                    self.apply_control(control, hw);
                }
            }
            Some(FanEvent::Period { elapsed_us }) => {
                if self.on {
                    self.rpm.push(elapsed_us);
                }
            }
            Some(FanEvent::SignalLost) => self.rpm.reset(),
        }
    }

    /// Advance the persistence countdown; once per control-loop tick.
    pub fn tick(&mut self, storage: &mut impl StoragePort) -> bool {
        self.config.tick(storage)
    }

    /// Write pending changes now (before reset or sleep).
    pub fn flush(&mut self, storage: &mut impl StoragePort) -> bool {
        self.config.flush(storage)
    }

    fn apply_control(&mut self, event: ControlEvent, hw: &mut impl ActuatorPort) {
        let step = match event {
            ControlEvent::None => return,
            ControlEvent::Press => {
                if self.tuning.rgb {
                    self.target = self.target.next();
                    debug!("fan: adjusting {:?}", self.target);
                }
                return;
            }
            ControlEvent::Increment => i32::from(self.tuning.small_step),
            ControlEvent::Decrement => -i32::from(self.tuning.small_step),
            ControlEvent::IncrementBig => i32::from(self.tuning.big_step),
            ControlEvent::DecrementBig => -i32::from(self.tuning.big_step),
        };
        let c = self.config.get();
        match self.target {
            AdjustTarget::Duty => {
                self.set_duty(i32::from(c.duty) + step, hw);
            }
            AdjustTarget::Hue => {
                let hue = (i32::from(c.hue) + step).rem_euclid(i32::from(HUE_MAX) + 1) as u16;
                self.set_color(hue, c.saturation, c.lightness, hw);
            }
            AdjustTarget::Saturation => {
                let s = (i32::from(c.saturation) + step).clamp(0, i32::from(PERCENT_MAX)) as u16;
                self.set_color(c.hue, s, c.lightness, hw);
            }
            AdjustTarget::Lightness => {
                let l = (i32::from(c.lightness) + step).clamp(0, i32::from(PERCENT_MAX)) as u16;
                self.set_color(c.hue, c.saturation, l, hw);
            }
        }
    }
}
