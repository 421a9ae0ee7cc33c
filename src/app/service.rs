//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the fan controller, power negotiator, status screen
//! and update session, plus a handle to the shared [`SystemContext`].  All
//! I/O flows through port traits injected at call sites, so the whole
//! service is testable with mock adapters.
//!
//! ```text
//!  encoder / tach ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  hold keys      ──▶ │          AppService          │ ──▶ ActuatorPort
//!  GATT commands  ──▶ │  Fan · Power · Screen · OTA  │ ◀─▶ ChargerPort
//!  update link    ──▶ └──────────────────────────────┘ ──▶ DisplayPort
//! ```
//!
//! Each runtime task locks the service and calls the entry point for its
//! own concern; the service never blocks except inside
//! [`start`](AppService::start) (the supply handshake) and the short
//! re-arm pause of the power-mode key.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::config::BoardConfig;
use crate::context::SystemContext;
use crate::drivers::keys::KeyAction;
use crate::error::Result;
use crate::events::FanEvent;
use crate::fan::{FanConfig, FanController};
use crate::flags;
use crate::persist::Persisted;
use crate::power::PowerTier;
use crate::power::negotiator::PowerNegotiator;
use crate::ui::{StatusScreen, StatusSnapshot};
use crate::update::{SessionState, UpdateSession};

use super::commands::AppCommand;
use super::events::{AppEvent, TelemetryData};
use super::ports::{
    ActuatorPort, ChargerPort, DisplayPort, EventSink, FirmwareStore, PlatformPort, StoragePort,
    UpdateHost, UpdateTransport,
};

/// Fan-loop ticks between telemetry events (~10 s at the default tick).
pub const TELEMETRY_TICKS: u32 = 20;

/// Latest power monitor sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PowerReading {
    pub bus_voltage: f32,
    pub current: f32,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

pub struct AppService<'a> {
    ctx: &'a SystemContext,
    config: BoardConfig,
    fan: FanController<'a>,
    power: PowerNegotiator,
    screen: StatusScreen,
    update: UpdateSession<'a>,
    reading: PowerReading,
    tick_count: u32,
}

impl<'a> AppService<'a> {
    /// Load persisted settings and build every subsystem.
    ///
    /// Nothing touches hardware yet; call [`start`](Self::start) next.
    pub fn new(ctx: &'a SystemContext, config: BoardConfig, storage: &impl StoragePort) -> Self {
        Self {
            ctx,
            config,
            fan: FanController::new(ctx, &config.fan, storage),
            power: PowerNegotiator::new(&config.power, storage),
            screen: StatusScreen::new(),
            update: UpdateSession::new(ctx),
            reading: PowerReading::default(),
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Classify the supply, then bring up the fan, screen and keys.
    ///
    /// Blocks for the whole handshake: nothing may draw full current
    /// before it completes.
    pub fn start(
        &mut self,
        hw: &mut (impl ActuatorPort + ChargerPort),
        delay: &mut impl DelayNs,
        storage: &mut impl StoragePort,
        sink: &mut impl EventSink,
    ) -> PowerTier {
        let tier = self.power.negotiate(self.power.requested(), hw, delay, storage);
        sink.emit(&AppEvent::PowerNegotiated(tier));

        self.fan.set_mode(true, hw);
        self.screen.set_mode(true, &self.ctx.flags);
        self.ctx.flags.set(flags::KEY_SCAN_RUN);

        sink.emit(&AppEvent::Started {
            tier,
            duty: self.fan.duty(),
        });
        info!("AppService started ({}, duty={})", tier, self.fan.duty());
        tier
    }

    // ── Fan loop ──────────────────────────────────────────────

    /// Handle one fan-queue receive; `None` is a receive timeout.
    pub fn on_fan_event(
        &mut self,
        event: Option<FanEvent>,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) {
        let before = self.fan.duty();
        self.fan.service(event, hw);
        if self.fan.duty() != before {
            sink.emit(&AppEvent::DutyChanged(self.fan.duty()));
        }
    }

    /// One control-loop tick: advance both persistence windows and emit
    /// telemetry every [`TELEMETRY_TICKS`].
    pub fn tick(&mut self, storage: &mut impl StoragePort, sink: &mut impl EventSink) {
        self.tick_count = self.tick_count.wrapping_add(1);
        if self.fan.tick(storage) {
            sink.emit(&AppEvent::ConfigSaved(FanConfig::KEY));
        }
        if self.power.tick(storage) {
            sink.emit(&AppEvent::ConfigSaved(PowerTier::KEY));
        }
        if self.tick_count % TELEMETRY_TICKS == 0 {
            sink.emit(&AppEvent::Telemetry(self.telemetry()));
        }
    }

    // ── Command handling ──────────────────────────────────────

    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        hw: &mut (impl ActuatorPort + ChargerPort),
        sink: &mut impl EventSink,
    ) -> Result<()> {
        match cmd {
            AppCommand::SetDuty(value) => {
                if self.fan.set_duty(value, hw) {
                    sink.emit(&AppEvent::DutyChanged(self.fan.duty()));
                }
            }
            AppCommand::RestoreDefaultDuty => {
                if self.fan.restore_default(hw) {
                    sink.emit(&AppEvent::DutyChanged(self.fan.duty()));
                }
            }
            AppCommand::SetFanMode(on) => {
                if self.update.host_suspended() {
                    warn!("fan mode change refused during update");
                } else if on != self.fan.is_on() {
                    self.fan.set_mode(on, hw);
                    sink.emit(&AppEvent::FanMode(on));
                }
            }
            AppCommand::SetColor {
                hue,
                saturation,
                lightness,
            } => {
                self.fan.set_color(hue, saturation, lightness, hw);
            }
            AppCommand::SetTier(tier) => {
                self.power.set_tier(tier, hw)?;
                sink.emit(&AppEvent::TierChanged(tier));
            }
            AppCommand::CycleTier => {
                let tier = self.power.cycle_tier(hw)?;
                sink.emit(&AppEvent::TierChanged(tier));
            }
            AppCommand::SetDisplayMode(on) => {
                if self.update.host_suspended() {
                    warn!("display mode change refused during update");
                } else {
                    self.screen.set_mode(on, &self.ctx.flags);
                }
            }
        }
        Ok(())
    }

    // ── Hold keys ─────────────────────────────────────────────

    pub fn handle_key(
        &mut self,
        action: KeyAction,
        hw: &mut (impl ActuatorPort + ChargerPort),
        storage: &mut impl StoragePort,
        link: &mut impl UpdateTransport,
        delay: &mut impl DelayNs,
        sink: &mut impl EventSink,
    ) {
        match action {
            KeyAction::PowerMode => {
                // scanning resumes when the guard drops
                let _scan = self.ctx.flags.suspend(flags::KEY_SCAN_RUN);
                match self.power.cycle_tier(hw) {
                    Ok(tier) => sink.emit(&AppEvent::TierChanged(tier)),
                    Err(e) => warn!("keys: {}", e),
                }
                delay.delay_ms(self.config.keys.rearm_delay_ms);
            }
            KeyAction::Sleep => self.enter_sleep(hw, storage, link, sink),
        }
    }

    /// Shut everything down and ask the power task for sleep once the
    /// radio is idle.  Key scanning stays off.
    pub fn enter_sleep(
        &mut self,
        hw: &mut (impl ActuatorPort + ChargerPort),
        storage: &mut impl StoragePort,
        link: &mut impl UpdateTransport,
        sink: &mut impl EventSink,
    ) {
        self.ctx.flags.suspend(flags::KEY_SCAN_RUN).keep();
        self.screen.set_mode(false, &self.ctx.flags);
        self.fan.set_mode(false, hw);
        self.power.release(hw);
        self.fan.flush(storage);
        self.power.flush(storage);
        if !self.ctx.flags.is_set(flags::RADIO_IDLE) {
            link.close();
        }
        self.ctx.request_sleep(flags::RADIO_IDLE);
        sink.emit(&AppEvent::SleepRequested);
    }

    // ── Status screen ─────────────────────────────────────────

    pub fn set_reading(&mut self, reading: PowerReading) {
        self.reading = reading;
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            duty: self.fan.duty(),
            fan_saved: self.fan.is_saved(),
            rpm: self.fan.rpm().round() as u32,
            power_label: self.power.label(),
            power_saved: self.power.is_saved(),
            bus_voltage: self.reading.bus_voltage,
            current: self.reading.current,
        }
    }

    pub fn render(&mut self, display: &mut impl DisplayPort) {
        let snap = self.snapshot();
        self.screen.render(&snap, display);
    }

    // ── Update session ────────────────────────────────────────

    /// Feed one inbound chunk from the update link.
    pub fn update_submit<H, S>(
        &mut self,
        data: &[u8],
        link: &mut impl UpdateTransport,
        store: &mut impl FirmwareStore,
        hw: &mut H,
        storage: &mut S,
        sink: &mut impl EventSink,
    ) where
        H: ActuatorPort + ChargerPort + PlatformPort,
        S: StoragePort,
    {
        let before = self.update.state();
        let restart_pending = self.ctx.flags.is_set(flags::POWER_RESTART);
        let mut host = HostLink {
            ctx: self.ctx,
            fan: &mut self.fan,
            power: &mut self.power,
            screen: &mut self.screen,
            hw,
            storage,
        };
        self.update.submit(data, link, &mut host, store);
        self.report_update(before, restart_pending, sink);
    }

    /// Writer step; returns the bytes moved to flash.
    pub fn update_pump(
        &mut self,
        link: &mut impl UpdateTransport,
        store: &mut impl FirmwareStore,
        sink: &mut impl EventSink,
    ) -> usize {
        let before = self.update.state();
        let written = self.update.pump(link, store);
        self.report_update(before, true, sink);
        written
    }

    /// Update data was lost between the radio and the session.
    pub fn update_overrun(
        &mut self,
        link: &mut impl UpdateTransport,
        store: &mut impl FirmwareStore,
        sink: &mut impl EventSink,
    ) {
        let before = self.update.state();
        self.update.overrun(link, store);
        self.report_update(before, true, sink);
    }

    /// Update link closed.
    pub fn update_end<H, S>(
        &mut self,
        store: &mut impl FirmwareStore,
        hw: &mut H,
        storage: &mut S,
        sink: &mut impl EventSink,
    ) where
        H: ActuatorPort + ChargerPort + PlatformPort,
        S: StoragePort,
    {
        let before = self.update.state();
        let mut host = HostLink {
            ctx: self.ctx,
            fan: &mut self.fan,
            power: &mut self.power,
            screen: &mut self.screen,
            hw,
            storage,
        };
        self.update.end(&mut host, store);
        self.report_update(before, true, sink);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn telemetry(&self) -> TelemetryData {
        TelemetryData {
            duty: self.fan.duty(),
            fan_on: self.fan.is_on(),
            rpm: self.fan.rpm(),
            tier: self.power.tier(),
            bus_voltage: self.reading.bus_voltage,
            current: self.reading.current,
        }
    }

    pub fn fan(&self) -> &FanController<'a> {
        &self.fan
    }

    pub fn power(&self) -> &PowerNegotiator {
        &self.power
    }

    pub fn screen(&self) -> &StatusScreen {
        &self.screen
    }

    pub fn update_state(&self) -> SessionState {
        self.update.state()
    }

    /// True while an update transfer has the fan and screen paused.
    pub fn update_in_progress(&self) -> bool {
        self.update.host_suspended()
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    // ── Internal ──────────────────────────────────────────────

    fn report_update(
        &self,
        before: SessionState,
        restart_pending: bool,
        sink: &mut impl EventSink,
    ) {
        let after = self.update.state();
        if after != before {
            sink.emit(&AppEvent::UpdateState(after));
        }
        if !restart_pending && self.ctx.flags.is_set(flags::POWER_RESTART) {
            sink.emit(&AppEvent::RestartRequested);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Update host bridge
// ───────────────────────────────────────────────────────────────

/// Lends the update session the parts of the service it coordinates with.
struct HostLink<'h, 'a, H, S> {
    ctx: &'a SystemContext,
    fan: &'h mut FanController<'a>,
    power: &'h mut PowerNegotiator,
    screen: &'h mut StatusScreen,
    hw: &'h mut H,
    storage: &'h mut S,
}

impl<H, S> UpdateHost for HostLink<'_, '_, H, S>
where
    H: ActuatorPort + ChargerPort + PlatformPort,
    S: StoragePort,
{
    fn suspend(&mut self) {
        self.ctx.flags.clear(flags::KEY_SCAN_RUN);
        self.screen.set_mode(false, &self.ctx.flags);
        self.fan.set_mode(false, &mut *self.hw);
    }

    fn resume(&mut self) {
        self.fan.set_mode(true, &mut *self.hw);
        self.screen.set_mode(true, &self.ctx.flags);
        self.ctx.flags.set(flags::KEY_SCAN_RUN);
    }

    fn release_power(&mut self) {
        self.power.release(&mut *self.hw);
        self.fan.flush(&mut *self.storage);
        self.power.flush(&mut *self.storage);
    }

    fn free_memory(&self) -> u32 {
        self.hw.free_heap()
    }

    fn firmware_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }
}
