//! Fan pipeline: encoder sampler and tachometer ISR → fan queue → fan
//! controller, with persistence through the debounced store.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin};
use fanctl::config::BoardConfig;
use fanctl::context::SystemContext;
use fanctl::drivers::encoder::EncoderSampler;
use fanctl::events::{ControlEvent, FanEvent};
use fanctl::fan::{FanConfig, FanController};
use fanctl::flags;
use fanctl::persist::{self, Persisted};

use crate::mock_hw::{MockBoard, MockDelay, MockNvs};

// ── Pins ──────────────────────────────────────────────────────

/// Input pin whose level the test drives.
#[derive(Clone)]
struct Level(Rc<Cell<bool>>);

impl Level {
    fn new(high: bool) -> Self {
        Self(Rc::new(Cell::new(high)))
    }

    fn set(&self, high: bool) {
        self.0.set(high);
    }
}

impl ErrorType for Level {
    type Error = Infallible;
}

impl InputPin for Level {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

struct Encoder {
    a: Level,
    b: Level,
    button: Level,
    sampler: EncoderSampler<Level, Level, Level>,
}

impl Encoder {
    fn new(config: &BoardConfig) -> Self {
        let (a, b, button) = (Level::new(true), Level::new(true), Level::new(true));
        let sampler = EncoderSampler::new(a.clone(), b.clone(), button.clone(), config.encoder);
        Self {
            a,
            b,
            button,
            sampler,
        }
    }

    /// One full clockwise cycle, polling after each transition.
    fn turn_cw(&mut self, ctx: &SystemContext) -> Vec<ControlEvent> {
        let mut seen = Vec::new();
        let mut delay = MockDelay::default();
        for (a, b) in [(false, true), (false, false), (true, false), (true, true)] {
            self.a.set(a);
            self.b.set(b);
            seen.extend(self.sampler.poll(ctx, &mut delay));
        }
        seen
    }
}

fn drain(ctx: &SystemContext, fan: &mut FanController<'_>, board: &mut MockBoard) -> usize {
    let mut n = 0;
    while let Some(event) = ctx.fan_events.try_receive() {
        fan.service(Some(event), board);
        n += 1;
    }
    n
}

fn feed_periods(ctx: &SystemContext, start_us: u32, period_us: u32, count: u32) {
    for i in 0..count {
        let t = start_us + i * period_us;
        assert_eq!(ctx.tach.on_edge(false, t), None);
        let event = ctx.tach.on_edge(true, t + period_us).expect("period completes");
        assert!(ctx.post_from_isr(event));
    }
}

// ── Encoder → duty ────────────────────────────────────────────

#[test]
fn clockwise_cycle_raises_duty_by_two_small_steps() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);

    let mut encoder = Encoder::new(&config);
    let seen = encoder.turn_cw(&ctx);
    assert_eq!(seen, vec![ControlEvent::Increment, ControlEvent::Increment]);

    assert_eq!(drain(&ctx, &mut fan, &mut board), 2);
    assert_eq!(fan.duty(), 2);
    assert_eq!(board.last_pwm(), Some(2));
    assert!(!fan.is_saved());
}

#[test]
fn held_button_uses_big_step() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);

    let mut encoder = Encoder::new(&config);
    encoder.button.set(false);
    let seen = encoder.turn_cw(&ctx);
    assert_eq!(seen, vec![ControlEvent::IncrementBig, ControlEvent::IncrementBig]);

    drain(&ctx, &mut fan, &mut board);
    assert_eq!(fan.duty(), 2 * config.fan.big_step);
}

#[test]
fn sampler_queues_nothing_while_fan_is_off() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let mut encoder = Encoder::new(&config);

    assert!(!ctx.flags.is_set(flags::FAN_RUN));
    assert!(encoder.turn_cw(&ctx).is_empty());
    assert_eq!(ctx.fan_events.try_receive(), None);
}

#[test]
fn duty_saturates_at_zero() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);

    assert!(ctx.post_from_isr(FanEvent::Control(ControlEvent::DecrementBig)));
    drain(&ctx, &mut fan, &mut board);
    assert_eq!(fan.duty(), 0);
}

// ── Tachometer → RPM ──────────────────────────────────────────

#[test]
fn tach_periods_produce_rpm_estimate() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);
    assert!(board.tach_enabled());

    // 15 ms per interval, 4 intervals per revolution → 1000 rpm
    feed_periods(&ctx, 1_000, 15_000, u32::from(config.fan.rpm_window));
    drain(&ctx, &mut fan, &mut board);
    assert!((fan.rpm() - 1000.0).abs() < 0.5, "got {}", fan.rpm());
}

#[test]
fn signal_loss_zeroes_rpm() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);

    feed_periods(&ctx, 0, 15_000, u32::from(config.fan.rpm_window));
    drain(&ctx, &mut fan, &mut board);
    assert!(fan.rpm() > 0.0);

    // first alarm only clears the "period seen" mark
    assert_eq!(ctx.tach.on_alarm(), None);
    let lost = ctx.tach.on_alarm().expect("second silent window");
    assert!(ctx.post_from_isr(lost));
    drain(&ctx, &mut fan, &mut board);
    assert_eq!(fan.rpm(), 0.0);
}

#[test]
fn receive_timeout_drops_half_timed_period() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);

    assert_eq!(ctx.tach.on_edge(false, 100), None);
    fan.service(None, &mut board);
    // the rising edge no longer closes a period
    assert_eq!(ctx.tach.on_edge(true, 5_000), None);
}

// ── Mode switching ────────────────────────────────────────────

#[test]
fn switching_on_discards_stale_events() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);

    for _ in 0..3 {
        assert!(ctx.post_from_isr(FanEvent::Control(ControlEvent::IncrementBig)));
    }
    fan.set_mode(true, &mut board);
    assert_eq!(drain(&ctx, &mut fan, &mut board), 0);
    assert_eq!(fan.duty(), config.fan.default_duty);
}

#[test]
fn switching_off_forces_pwm_zero_and_keeps_duty() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);
    fan.set_duty(120, &mut board);

    fan.set_mode(false, &mut board);
    assert_eq!(board.last_pwm(), Some(0));
    assert!(!board.tach_enabled());
    assert!(!ctx.flags.is_set(flags::FAN_RUN));
    assert_eq!(fan.duty(), 120);

    fan.set_mode(true, &mut board);
    assert_eq!(board.last_pwm(), Some(120));
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn duty_persists_once_after_quiescence() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let mut nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_mode(true, &mut board);
    fan.set_duty(77, &mut board);

    let mut saved = 0;
    for _ in 0..config.fan.persist_ticks * 3 {
        if fan.tick(&mut nvs) {
            saved += 1;
        }
    }
    assert_eq!(saved, 1);
    assert_eq!(nvs.writes, 1);
    assert!(fan.is_saved());
    let stored = nvs.get(persist::NAMESPACE, FanConfig::KEY).unwrap();
    assert_eq!(FanConfig::decode(stored), Some(FanConfig::with_duty(77)));

    // a fresh controller starts from the stored duty
    let reloaded = FanController::new(&ctx, &config.fan, &nvs);
    assert_eq!(reloaded.duty(), 77);
}

#[test]
fn failed_write_is_retried_after_another_window() {
    let ctx = SystemContext::new();
    let config = BoardConfig::default();
    let mut nvs = MockNvs::new();
    let mut board = MockBoard::new();
    let mut fan = FanController::new(&ctx, &config.fan, &nvs);
    fan.set_duty(5, &mut board);

    nvs.fail_writes = true;
    for _ in 0..config.fan.persist_ticks {
        assert!(!fan.tick(&mut nvs));
    }
    assert!(!fan.is_saved());

    nvs.fail_writes = false;
    let mut ticks = 0;
    while !fan.tick(&mut nvs) {
        ticks += 1;
        assert!(ticks <= config.fan.persist_ticks, "retry never happened");
    }
    assert!(fan.is_saved());
}
