//! Hardware adapter: bridges real peripherals to domain port traits.
//!
//! Exposes the fan LEDC channels, the tachometer interrupt/watchdog pair,
//! the data-line DACs and the sense ADC through [`ActuatorPort`],
//! [`ChargerPort`] and [`PlatformPort`].  This is the only module that
//! drives those peripherals; on non-espidf targets the underlying
//! `hw_init` calls are no-ops and the adapter just records what it was
//! told, which makes it usable as a simulation board.

use log::warn;

use crate::app::ports::{ActuatorPort, ChargerPort, ControlLine, PlatformPort};
use crate::drivers::{hw_init, hw_timer};
use crate::pins;

/// Concrete adapter for the fan and charger peripherals.
pub struct HardwareAdapter {
    rgb: bool,
    duty: u8,
    color: (u8, u8, u8),
    tach_enabled: bool,
    codes: [u8; 2],
    lines: [bool; 2],
    #[cfg(not(target_os = "espidf"))]
    sim_level: u16,
}

impl HardwareAdapter {
    /// Peripherals must already be configured by
    /// [`hw_init::init_peripherals`].
    pub fn new(rgb: bool) -> Self {
        Self {
            rgb,
            duty: 0,
            color: (0, 0, 0),
            tach_enabled: false,
            codes: [0; 2],
            lines: [false; 2],
            #[cfg(not(target_os = "espidf"))]
            sim_level: 0,
        }
    }

    pub fn duty(&self) -> u8 {
        self.duty
    }

    pub fn color(&self) -> (u8, u8, u8) {
        self.color
    }

    pub fn is_tach_enabled(&self) -> bool {
        self.tach_enabled
    }

    /// Output code and enable state of a control line.
    pub fn line(&self, line: ControlLine) -> (u8, bool) {
        (self.codes[line as usize], self.lines[line as usize])
    }

    /// Simulation: the level the sense ADC reports.
    #[cfg(not(target_os = "espidf"))]
    pub fn set_sim_level(&mut self, level: u16) {
        self.sim_level = level;
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl ActuatorPort for HardwareAdapter {
    fn set_fan_pwm(&mut self, duty: u8) {
        self.duty = duty;
        hw_init::ledc_set(hw_init::LEDC_CH_FAN, duty);
    }

    fn set_fan_rgb(&mut self, r: u8, g: u8, b: u8) {
        if !self.rgb {
            return;
        }
        self.color = (r, g, b);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_R, r);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_G, g);
        hw_init::ledc_set(hw_init::LEDC_CH_LED_B, b);
    }

    fn set_tach_enabled(&mut self, enabled: bool) {
        self.tach_enabled = enabled;
        hw_init::tach_interrupt_enable(enabled);
        hw_timer::set_tach_watchdog(enabled);
    }
}

// ── ChargerPort implementation ────────────────────────────────

impl ChargerPort for HardwareAdapter {
    fn set_line(&mut self, line: ControlLine, code: u8) {
        self.codes[line as usize] = code;
        hw_init::dac_set(line as usize, code);
    }

    fn enable_line(&mut self, line: ControlLine, enabled: bool) {
        match hw_init::dac_enable(line as usize, enabled) {
            Ok(()) => self.lines[line as usize] = enabled,
            Err(e) => warn!("hardware: {:?} {}", line, e),
        }
    }

    #[cfg(target_os = "espidf")]
    fn sample(&mut self) -> u16 {
        hw_init::adc2_read(pins::QC_SENSE_ADC2_CHANNEL)
    }

    #[cfg(not(target_os = "espidf"))]
    fn sample(&mut self) -> u16 {
        // a real read on the host always returns 0
        let _ = hw_init::adc2_read(pins::QC_SENSE_ADC2_CHANNEL);
        self.sim_level
    }
}

// ── PlatformPort implementation ───────────────────────────────

impl PlatformPort for HardwareAdapter {
    #[cfg(target_os = "espidf")]
    fn free_heap(&self) -> u32 {
        // SAFETY: heap statistics query, callable from any task.
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_heap(&self) -> u32 {
        256 * 1024
    }
}
