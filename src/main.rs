//! FanCtl firmware entry point.
//!
//! Hexagonal core driven by a handful of FreeRTOS tasks.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter      NvsAdapter       OtaSlotAdapter          │
//! │  (Actuator+Charger)   (Config+Storage) (FirmwareStore)         │
//! │  GattLink             TextPanel        LogEventSink            │
//! │  (UpdateTransport)    (DisplayPort)    (EventSink)             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Fan · Power · Screen · Update session                 │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Tasks: sampler · fan · keys · screen · update · power         │
//! │  ISRs:  tach edge · tach watchdog  (lock-free try_send)        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;
use esp_idf_hal::gpio::{PinDriver, Pull};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::prelude::*;
use log::{debug, info, warn};

use fanctl::adapters::display::TextPanel;
use fanctl::adapters::gatt::{self, GattLink, Inbound};
use fanctl::adapters::hardware::HardwareAdapter;
use fanctl::adapters::log_sink::LogEventSink;
use fanctl::adapters::nvs::NvsAdapter;
use fanctl::adapters::ota_slot::{self, OtaSlotAdapter};
use fanctl::adapters::time::{TaskDelay, Uptime};
use fanctl::app::ports::ConfigPort;
use fanctl::app::service::{AppService, PowerReading};
use fanctl::config::{ActiveLevel, BoardConfig, KeyTuning};
use fanctl::context::{SystemContext, Terminal};
use fanctl::drivers::encoder::EncoderSampler;
use fanctl::drivers::ina219::{self, Ina219};
use fanctl::drivers::keys::KeyScanner;
use fanctl::drivers::task_pin::{Core, TaskSpec, priority, spawn_on_core};
use fanctl::drivers::{hw_init, hw_timer};
use fanctl::error::Error;
use fanctl::flags::{self, WaitFor};
use fanctl::pins;
use fanctl::ui::screen::REFRESH_MS;

/// Shared by every task and by the ISR callbacks.
static CONTEXT: SystemContext = SystemContext::new();

const DEVICE_NAME: &str = "FanCtl";
/// Encoder sampling period.
const SAMPLE_MS: u32 = 1;
/// Update writer sleep when nothing is staged.
const WRITER_IDLE_MS: u32 = 5;

// ── Shared runtime ────────────────────────────────────────────

/// Everything the tasks mutate.  Each task holds the lock only for the
/// duration of one service call.
struct Runtime {
    app: AppService<'static>,
    hw: HardwareAdapter,
    nvs: NvsAdapter,
    store: OtaSlotAdapter,
    link: GattLink,
    display: TextPanel,
    sink: LogEventSink,
}

type Shared = Arc<Mutex<Runtime>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Runtime> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FanCtl v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ────────────────────────────────
    ota_slot::check_rollback();

    // ── 1c. Initialise hardware peripherals ───────────────────
    hw_init::init_peripherals().map_err(Error::from)?;
    let peripherals = Peripherals::take()?;

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new().map_err(Error::from)?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            BoardConfig::default()
        }
    };

    // ── 3. Tachometer interrupt + watchdog ────────────────────
    hw_timer::init_tach_watchdog(&CONTEXT, config.fan.signal_timeout_ms).map_err(Error::from)?;
    if let Err(e) = hw_init::init_isr_service(&CONTEXT) {
        warn!("ISR service init failed: {}; running without RPM", e);
    }

    // ── 4. Negotiate power, then fan and screen on ────────────
    // Blocking: nothing may draw full current before this returns.
    let mut hw = HardwareAdapter::new(config.fan.rgb);
    let mut sink = LogEventSink::new();
    let mut app = AppService::new(&CONTEXT, config, &nvs);
    app.start(&mut hw, &mut TaskDelay, &mut nvs, &mut sink);

    // ── 5. Radio ──────────────────────────────────────────────
    let mut link = GattLink::new(&CONTEXT);
    if !link.start(DEVICE_NAME) {
        warn!("GATT server unavailable; local control only");
    }
    gatt::publish_duty(app.fan().duty());

    // ── 6. Input drivers ──────────────────────────────────────
    let gpio = peripherals.pins;
    let mut phase_a = PinDriver::input(gpio.gpio4)?;
    phase_a.set_pull(Pull::Up)?;
    let mut phase_b = PinDriver::input(gpio.gpio5)?;
    phase_b.set_pull(Pull::Up)?;
    let mut button = PinDriver::input(gpio.gpio18)?;
    button.set_pull(Pull::Up)?;
    let sampler = EncoderSampler::new(phase_a, phase_b, button, config.encoder);

    let mut power_key = PinDriver::input(gpio.gpio0)?;
    power_key.set_pull(Pull::Up)?;
    // GPIO35 is input-only with no internal pull; the board pulls it up.
    let sleep_key = PinDriver::input(gpio.gpio35)?;
    let keys = KeyScanner::new(power_key, sleep_key, &config.keys);

    let i2c = I2cDriver::new(
        peripherals.i2c0,
        gpio.gpio21,
        gpio.gpio22,
        &I2cConfig::new().baudrate(400.kHz().into()),
    )?;
    let mut monitor = Ina219::new(i2c, ina219::DEFAULT_ADDR);
    let monitor = match monitor.init() {
        Ok(()) => Some(monitor),
        Err(e) => {
            warn!("INA219 unavailable ({}); power readout disabled", e);
            None
        }
    };
    debug!(
        "pins: enc={}/{}/{} keys={}/{} i2c={}/{}",
        pins::ENCODER_A_GPIO,
        pins::ENCODER_B_GPIO,
        pins::ENCODER_BUTTON_GPIO,
        pins::KEY_POWER_MODE_GPIO,
        pins::KEY_SLEEP_GPIO,
        pins::I2C_SDA_GPIO,
        pins::I2C_SCL_GPIO,
    );

    let shared: Shared = Arc::new(Mutex::new(Runtime {
        app,
        hw,
        nvs,
        store: OtaSlotAdapter::new(),
        link,
        display: TextPanel::new(),
        sink,
    }));

    // ── 7. Tasks ──────────────────────────────────────────────
    spawn_on_core(
        TaskSpec { name: "sampler\0", core: Core::App, priority: priority::CONTROL, stack_kb: 4 },
        move || sampler_task(sampler),
    )?;

    let fan_shared = Arc::clone(&shared);
    let tick_ms = config.fan.tick_ms;
    spawn_on_core(
        TaskSpec { name: "fan\0", core: Core::App, priority: priority::CONTROL, stack_kb: 6 },
        move || fan_task(&fan_shared, tick_ms),
    )?;

    let key_shared = Arc::clone(&shared);
    let key_tuning = config.keys;
    spawn_on_core(
        TaskSpec { name: "keys\0", core: Core::App, priority: priority::SERVICE, stack_kb: 6 },
        move || key_task(&key_shared, keys, &key_tuning),
    )?;

    let screen_shared = Arc::clone(&shared);
    spawn_on_core(
        TaskSpec { name: "screen\0", core: Core::App, priority: priority::BACKGROUND, stack_kb: 6 },
        move || screen_task(&screen_shared, monitor),
    )?;

    let update_shared = Arc::clone(&shared);
    spawn_on_core(
        TaskSpec { name: "update\0", core: Core::Pro, priority: priority::BACKGROUND, stack_kb: 8 },
        move || update_task(&update_shared),
    )?;

    info!("System ready.");

    // ── 8. Power task (this thread) ───────────────────────────
    power_task(&config.keys)
}

// ── Tasks ─────────────────────────────────────────────────────

/// 1 kHz encoder sampling.  Blocks only when the fan queue is full.
fn sampler_task<A: InputPin, B: InputPin, P: InputPin>(mut sampler: EncoderSampler<A, B, P>) {
    let mut delay = TaskDelay;
    loop {
        sampler.poll(&CONTEXT, &mut delay);
        delay.delay_ms(SAMPLE_MS);
    }
}

/// Fan control loop: one queue receive per iteration, a receive timeout
/// is a meaningful "no event".  Persistence and telemetry advance once
/// per control tick.
fn fan_task(shared: &Shared, tick_ms: u32) {
    let mut delay = TaskDelay;
    let uptime = Uptime::new();
    let mut last_tick = uptime.us();
    loop {
        let event = CONTEXT.fan_events.receive_timeout(tick_ms, &mut delay);

        let mut guard = lock(shared);
        let rt = &mut *guard;
        rt.app.on_fan_event(event, &mut rt.hw, &mut rt.sink);

        let now = uptime.us();
        if now.saturating_sub(last_tick) >= u64::from(tick_ms) * 1_000 {
            last_tick = now;
            rt.app.tick(&mut rt.nvs, &mut rt.sink);
            gatt::publish_duty(rt.app.fan().duty());
        }
    }
}

/// Hold-key scanning; parked while keys or the fan are disabled.
fn key_task<P: InputPin, S: InputPin>(shared: &Shared, mut keys: KeyScanner<P, S>, tuning: &KeyTuning) {
    let mut delay = TaskDelay;
    loop {
        CONTEXT.flags.wait_bits(
            flags::KEY_SCAN_RUN | flags::FAN_RUN,
            WaitFor::All,
            false,
            None,
            &mut delay,
        );
        if let Some(action) = keys.scan() {
            info!("keys: {:?}", action);
            let mut guard = lock(shared);
            let rt = &mut *guard;
            rt.app
                .handle_key(action, &mut rt.hw, &mut rt.nvs, &mut rt.link, &mut delay, &mut rt.sink);
        }
        delay.delay_ms(tuning.scan_interval_ms);
    }
}

/// Status screen refresh.  While the screen is off the task parks until
/// `GUI_RELOAD` is raised.
fn screen_task<I: I2c>(shared: &Shared, mut monitor: Option<Ina219<I>>) {
    let mut delay = TaskDelay;
    loop {
        CONTEXT.flags.clear(flags::GUI_RELOAD);

        let reading = monitor.as_mut().and_then(read_monitor);
        let on = {
            let mut guard = lock(shared);
            let rt = &mut *guard;
            if let Some(reading) = reading {
                rt.app.set_reading(reading);
            }
            rt.app.render(&mut rt.display);
            rt.app.screen().is_on()
        };

        if on {
            delay.delay_ms(REFRESH_MS);
        } else {
            CONTEXT
                .flags
                .wait_bits(flags::GUI_RELOAD, WaitFor::Any, false, None, &mut delay);
        }
    }
}

fn read_monitor<I: I2c>(monitor: &mut Ina219<I>) -> Option<PowerReading> {
    let bus_voltage = monitor.bus_voltage_v();
    let current = monitor.current_ma();
    match (bus_voltage, current) {
        (Ok(bus_voltage), Ok(ma)) => Some(PowerReading {
            bus_voltage,
            current: ma / 1000.0,
        }),
        (Err(e), _) | (_, Err(e)) => {
            debug!("ina219: {}", e);
            None
        }
    }
}

/// Dispatches GATT writes and drives the update writer.
fn update_task(shared: &Shared) {
    let mut delay = TaskDelay;
    loop {
        let mut busy = false;
        while let Some(item) = gatt::take_inbound() {
            busy = true;
            let mut guard = lock(shared);
            let rt = &mut *guard;
            match item {
                Inbound::Fan(record) => {
                    if let Some(cmd) = gatt::decode_fan_write(&record) {
                        if let Err(e) = rt.app.handle_command(cmd, &mut rt.hw, &mut rt.sink) {
                            warn!("gatt: {:?} refused ({})", cmd, e);
                        }
                    }
                }
                Inbound::Update(chunk) => rt.app.update_submit(
                    &chunk,
                    &mut rt.link,
                    &mut rt.store,
                    &mut rt.hw,
                    &mut rt.nvs,
                    &mut rt.sink,
                ),
                Inbound::Overrun => {
                    rt.app.update_overrun(&mut rt.link, &mut rt.store, &mut rt.sink);
                }
                Inbound::Disconnected => {
                    rt.app
                        .update_end(&mut rt.store, &mut rt.hw, &mut rt.nvs, &mut rt.sink);
                }
            }
        }

        {
            let mut guard = lock(shared);
            let rt = &mut *guard;
            if rt.app.update_pump(&mut rt.link, &mut rt.store, &mut rt.sink) > 0 {
                busy = true;
            }
            gatt::publish_duty(rt.app.fan().duty());
        }

        if !busy {
            delay.delay_ms(WRITER_IDLE_MS);
        }
    }
}

/// Waits for a restart or sleep request and carries it out.
fn power_task(keys: &KeyTuning) -> ! {
    let terminal = CONTEXT.await_terminal(&mut TaskDelay);
    match terminal {
        Terminal::Restart => {
            info!("Restarting");
            // SAFETY: settings were flushed by whoever requested the restart.
            unsafe { esp_idf_svc::sys::esp_restart() }
        }
        Terminal::Sleep => {
            let level = i32::from(matches!(keys.active, ActiveLevel::High));
            info!("Entering deep sleep (wake on GPIO{})", pins::KEY_SLEEP_GPIO);
            // SAFETY: GPIO35 is an RTC GPIO; nothing runs after this call.
            unsafe {
                esp_idf_svc::sys::esp_sleep_enable_ext0_wakeup(pins::KEY_SLEEP_GPIO, level);
                esp_idf_svc::sys::esp_deep_sleep_start()
            }
        }
    }
}
