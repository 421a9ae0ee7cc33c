//! GPIO / peripheral pin assignments for the fan controller board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding GPIO numbers.

// ---------------------------------------------------------------------------
// Rotary encoder (EC11) with push-button
// ---------------------------------------------------------------------------

/// Encoder phase A.
pub const ENCODER_A_GPIO: i32 = 4;
/// Encoder phase B.
pub const ENCODER_B_GPIO: i32 = 5;
/// Encoder push-button (active low, internal pull-up).
pub const ENCODER_BUTTON_GPIO: i32 = 18;

// ---------------------------------------------------------------------------
// Fan (4-wire PWM)
// ---------------------------------------------------------------------------

/// LEDC PWM output to the fan control wire.
pub const FAN_PWM_GPIO: i32 = 23;
/// Open-collector tachometer input (external pull-up).
pub const FAN_TACH_GPIO: i32 = 19;

/// RGB fan channels (only wired on RGB boards).
pub const FAN_LED_R_GPIO: i32 = 13;
pub const FAN_LED_G_GPIO: i32 = 14;
pub const FAN_LED_B_GPIO: i32 = 15;

// ---------------------------------------------------------------------------
// USB fast-charge negotiation
// ---------------------------------------------------------------------------

/// DAC1 drives D+ through the negotiation network.
pub const QC_DP_DAC_GPIO: i32 = 25;
/// DAC2 drives D-.
pub const QC_DM_DAC_GPIO: i32 = 26;
/// ADC2 channel 9 (GPIO 26) samples the D- line.
pub const QC_SENSE_ADC2_CHANNEL: u32 = 9;

// ---------------------------------------------------------------------------
// Hold keys (active low, internal pull-up)
// ---------------------------------------------------------------------------

pub const KEY_POWER_MODE_GPIO: i32 = 0;
pub const KEY_SLEEP_GPIO: i32 = 35;

// ---------------------------------------------------------------------------
// I²C bus (INA219 power monitor)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  8-bit gives 0 – 255 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 8;
/// Fan PWM frequency (25 kHz per the 4-wire fan specification).
pub const FAN_PWM_FREQ_HZ: u32 = 25_000;
/// RGB channel frequency.
pub const LED_PWM_FREQ_HZ: u32 = 1_000;
