//! One-shot hardware peripheral initialization.
//!
//! Configures the fan LEDC timers/channels, the data-line DACs, ADC2 for
//! the charger sense line, and the tachometer edge interrupt using raw
//! ESP-IDF sys calls.  Called once from `main()` before any task starts.
//! Encoder, key and I²C pins are owned by `esp-idf-hal` drivers instead.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::context::SystemContext;
#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    DacInitFailed(i32),
    GpioConfigFailed(i32),
    LedcInitFailed,
    IsrInstallFailed(i32),
    TimerInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc)    => write!(f, "ADC2 init failed (rc={})", rc),
            Self::DacInitFailed(rc)    => write!(f, "DAC channel init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::LedcInitFailed       => write!(f, "LEDC timer/channel config failed"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::TimerInitFailed(rc)  => write!(f, "esp_timer create failed (rc={})", rc),
        }
    }
}

pub const LEDC_CH_FAN: u32 = 0;
pub const LEDC_CH_LED_R: u32 = 1;
pub const LEDC_CH_LED_G: u32 = 2;
pub const LEDC_CH_LED_B: u32 = 3;

/// Index of a data-line DAC (0 = D+, 1 = D-).
pub type DacLine = usize;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before any task is spawned.
    unsafe {
        init_adc2()?;
        init_ledc()?;
        init_tach_input()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── ADC2 (oneshot, charger sense) ─────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC2_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: ADC2_HANDLE is written once in `init_adc2()` before the power
/// task exists; afterwards only the power task reads it.
#[cfg(target_os = "espidf")]
unsafe fn adc2_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC2_HANDLE }
}

#[cfg(target_os = "espidf")]
unsafe fn init_adc2() -> Result<(), HwInitError> {
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_2,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC2_HANDLE is only written here, once at boot.
    let ret = unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC2_HANDLE) };
    if ret != ESP_OK as i32 { return Err(HwInitError::AdcInitFailed(ret)); }

    // 0 dB: the probe levels sit well below 1 V
    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_0,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    let ret = unsafe {
        adc_oneshot_config_channel(adc2_handle(), pins::QC_SENSE_ADC2_CHANNEL, &chan_cfg)
    };
    if ret != ESP_OK as i32 { return Err(HwInitError::AdcInitFailed(ret)); }

    info!("hw_init: ADC2 configured (CH{}=D- sense)", pins::QC_SENSE_ADC2_CHANNEL);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn adc2_read(channel: u32) -> u16 {
    let mut raw: i32 = 0;
    // SAFETY: adc2_handle() contract, power task only.
    let ret = unsafe { adc_oneshot_read(adc2_handle(), channel, &mut raw) };
    if ret != ESP_OK as i32 {
        return 0;
    }
    raw.max(0) as u16
}

#[cfg(not(target_os = "espidf"))]
pub fn adc2_read(_channel: u32) -> u16 {
    0
}

// ── DAC (data-line drive) ─────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut DAC_HANDLES: [dac_oneshot_handle_t; 2] = [core::ptr::null_mut(); 2];
#[cfg(target_os = "espidf")]
static mut DAC_CODES: [u8; 2] = [0; 2];

/// Set the output code of a DAC line.  Takes effect immediately if the
/// line is enabled, otherwise on the next enable.
#[cfg(target_os = "espidf")]
pub fn dac_set(line: DacLine, code: u8) {
    // SAFETY: DAC state is only touched by the power task (and by the
    // update session's release path, which runs while the power task is
    // idle).
    unsafe {
        DAC_CODES[line] = code;
        let handle = DAC_HANDLES[line];
        if !handle.is_null() {
            dac_oneshot_output_voltage(handle, code);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn dac_set(_line: DacLine, _code: u8) {}

/// Connect (create the oneshot channel) or release a DAC line.  A released
/// line is high impedance.
#[cfg(target_os = "espidf")]
pub fn dac_enable(line: DacLine, enabled: bool) -> Result<(), HwInitError> {
    // SAFETY: see `dac_set`.
    unsafe {
        let handle = DAC_HANDLES[line];
        if enabled && handle.is_null() {
            let cfg = dac_oneshot_config_t {
                chan_id: if line == 0 { dac_channel_t_DAC_CHAN_0 } else { dac_channel_t_DAC_CHAN_1 },
            };
            let ret = dac_oneshot_new_channel(&cfg, &raw mut DAC_HANDLES[line]);
            if ret != ESP_OK as i32 { return Err(HwInitError::DacInitFailed(ret)); }
            dac_oneshot_output_voltage(DAC_HANDLES[line], DAC_CODES[line]);
        } else if !enabled && !handle.is_null() {
            dac_oneshot_del_channel(handle);
            DAC_HANDLES[line] = core::ptr::null_mut();
        }
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn dac_enable(_line: DacLine, _enabled: bool) -> Result<(), HwInitError> {
    Ok(())
}

// ── LEDC PWM ─────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_ledc() -> Result<(), HwInitError> {
    // Timer 0: fan (25 kHz, 8-bit)
    let timer0 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::FAN_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    if unsafe { ledc_timer_config(&timer0) } != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed);
    }

    // Timer 1: RGB channels (1 kHz, 8-bit)
    let timer1 = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_1,
        duty_resolution: ledc_timer_bit_t_LEDC_TIMER_8_BIT,
        freq_hz: pins::LED_PWM_FREQ_HZ,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    if unsafe { ledc_timer_config(&timer1) } != ESP_OK as i32 {
        return Err(HwInitError::LedcInitFailed);
    }

    let channels = [
        (LEDC_CH_FAN, ledc_timer_t_LEDC_TIMER_0, pins::FAN_PWM_GPIO),
        (LEDC_CH_LED_R, ledc_timer_t_LEDC_TIMER_1, pins::FAN_LED_R_GPIO),
        (LEDC_CH_LED_G, ledc_timer_t_LEDC_TIMER_1, pins::FAN_LED_G_GPIO),
        (LEDC_CH_LED_B, ledc_timer_t_LEDC_TIMER_1, pins::FAN_LED_B_GPIO),
    ];
    for (channel, timer, gpio) in channels {
        let ret = unsafe { ledc_channel_config(&ledc_channel_config_t {
            speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
            channel,
            timer_sel: timer,
            gpio_num: gpio,
            duty: 0,
            hpoint: 0,
            ..Default::default()
        }) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::LedcInitFailed);
        }
    }

    info!("hw_init: LEDC configured (fan=CH0, rgb=CH1-3)");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u8) {
    // SAFETY: LEDC channels were configured in init_ledc(); each channel
    // has a single writer (the fan task).
    unsafe {
        ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, duty as u32);
        ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u8) {}

// ── Tachometer input + ISR ────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_tach_input() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FAN_TACH_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 { return Err(HwInitError::GpioConfigFailed(ret)); }
    info!("hw_init: tach input configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn tach_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the `&'static SystemContext` registered in
    // init_isr_service(); the context outlives every interrupt.
    let ctx = unsafe { &*(arg as *const SystemContext) };
    // SAFETY: register reads, safe in ISR context.
    let high = unsafe { gpio_get_level(pins::FAN_TACH_GPIO) } != 0;
    let now_us = unsafe { esp_timer_get_time() } as u32;
    if let Some(event) = ctx.tach.on_edge(high, now_us) {
        ctx.post_from_isr(event);
    }
}

/// Install the GPIO ISR service and register the tachometer handler.
/// The interrupt stays disabled until the fan is switched on.
#[cfg(target_os = "espidf")]
pub fn init_isr_service(ctx: &'static SystemContext) -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.  The handler only touches atomics and
    // the non-blocking queue send.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        let ret = gpio_isr_handler_add(
            pins::FAN_TACH_GPIO,
            Some(tach_gpio_isr),
            ctx as *const SystemContext as *mut core::ffi::c_void,
        );
        if ret != ESP_OK as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        gpio_intr_disable(pins::FAN_TACH_GPIO);
    }
    info!("hw_init: tach ISR installed");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service(_ctx: &'static crate::context::SystemContext) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn tach_interrupt_enable(enabled: bool) {
    // SAFETY: enabling/disabling a registered GPIO interrupt is a register
    // write; only the fan task calls this.
    unsafe {
        if enabled {
            gpio_intr_enable(pins::FAN_TACH_GPIO);
        } else {
            gpio_intr_disable(pins::FAN_TACH_GPIO);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn tach_interrupt_enable(_enabled: bool) {}
