//! Inbound commands to the application service.
//!
//! These are the control-surface requests the outside world (GATT fan
//! characteristic, debug console) can make.  The
//! [`AppService`](super::service::AppService) interprets them; encoder and
//! key input take their own paths.

use crate::power::PowerTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Set the fan duty; clamped to 0–255.
    SetDuty(i32),

    /// Restore the board default duty.
    RestoreDefaultDuty,

    /// Switch the fan on or off.
    SetFanMode(bool),

    /// RGB boards only.  Values are clamped to their ranges.
    SetColor {
        hue: u16,
        saturation: u16,
        lightness: u16,
    },

    /// Request a fast-charge tier on a capable supply.
    SetTier(PowerTier),

    /// Step to the next fast-charge tier.
    CycleTier,

    /// Switch the status screen on or off.
    SetDisplayMode(bool),
}
