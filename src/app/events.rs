//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (serial log, GATT notification).

use crate::power::PowerTier;
use crate::update::SessionState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppEvent {
    /// Startup finished: supply classified, fan and screen on.
    Started { tier: PowerTier, duty: u8 },

    /// Result of the startup handshake.
    PowerNegotiated(PowerTier),

    /// Fast-charge tier switched at runtime.
    TierChanged(PowerTier),

    FanMode(bool),

    DutyChanged(u8),

    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),

    /// A debounced setting reached storage (carries its key).
    ConfigSaved(&'static str),

    UpdateState(SessionState),

    SleepRequested,

    RestartRequested,
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryData {
    pub duty: u8,
    pub fan_on: bool,
    pub rpm: f32,
    pub tier: PowerTier,
    pub bus_voltage: f32,
    pub current: f32,
}
