//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).  The GATT adapter
//! could implement the same trait for notifications.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::update::SessionState;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | fan={} duty={} rpm={:.0} | {} | {:.3}V {:.3}A",
                    if t.fan_on { "on" } else { "off" },
                    t.duty,
                    t.rpm,
                    t.tier,
                    t.bus_voltage,
                    t.current,
                );
            }
            AppEvent::Started { tier, duty } => {
                info!("START | supply={} duty={}", tier, duty);
            }
            AppEvent::PowerNegotiated(tier) => {
                info!("PWR   | negotiated {}", tier);
            }
            AppEvent::TierChanged(tier) => {
                info!("PWR   | tier -> {}", tier);
            }
            AppEvent::FanMode(on) => {
                info!("FAN   | {}", if *on { "on" } else { "off" });
            }
            AppEvent::DutyChanged(duty) => {
                info!("FAN   | duty={}", duty);
            }
            AppEvent::ConfigSaved(key) => {
                info!("NVS   | {} saved", key);
            }
            AppEvent::UpdateState(SessionState::Failed) => {
                warn!("OTA   | transfer failed");
            }
            AppEvent::UpdateState(state) => {
                info!("OTA   | {:?}", state);
            }
            AppEvent::SleepRequested => {
                info!("POWER | sleep requested");
            }
            AppEvent::RestartRequested => {
                info!("POWER | restart requested");
            }
        }
    }
}
