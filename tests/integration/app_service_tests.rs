//! AppService lifecycle, hold keys, telemetry and the status screen.

use fanctl::adapters::display::TextPanel;
use fanctl::app::commands::AppCommand;
use fanctl::app::events::AppEvent;
use fanctl::app::ports::ControlLine;
use fanctl::app::service::{AppService, PowerReading, TELEMETRY_TICKS};
use fanctl::config::BoardConfig;
use fanctl::context::SystemContext;
use fanctl::drivers::keys::KeyAction;
use fanctl::events::{ControlEvent, FanEvent};
use fanctl::flags;
use fanctl::power::PowerTier;
use fanctl::ui::screen::{BACKLIGHT_OFF, BACKLIGHT_ON};

use crate::mock_hw::{MockBoard, MockDelay, MockLink, MockNvs, RecordingSink};

fn started<'a>(
    ctx: &'a SystemContext,
    board: &mut MockBoard,
    nvs: &mut MockNvs,
    sink: &mut RecordingSink,
) -> AppService<'a> {
    let mut app = AppService::new(ctx, BoardConfig::default(), &*nvs);
    app.start(board, &mut MockDelay::default(), nvs, sink);
    app
}

#[test]
fn start_on_quick_charger_brings_everything_up() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let app = started(&ctx, &mut board, &mut nvs, &mut sink);

    assert_eq!(app.power().tier(), PowerTier::Qc5V);
    assert!(app.fan().is_on());
    assert!(app.screen().is_on());
    assert!(board.tach_enabled());
    assert!(ctx.flags.is_set(flags::KEY_SCAN_RUN | flags::FAN_RUN | flags::GUI_RELOAD));
    assert_eq!(
        sink.events,
        [
            AppEvent::PowerNegotiated(PowerTier::Qc5V),
            AppEvent::Started {
                tier: PowerTier::Qc5V,
                duty: 0,
            },
        ]
    );
}

#[test]
fn handshake_completes_before_the_fan_spins() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    started(&ctx, &mut board, &mut nvs, &mut sink);

    let first_pwm = board
        .calls
        .iter()
        .position(|c| matches!(c, crate::mock_hw::BoardCall::FanPwm(_)))
        .unwrap();
    let last_line = board
        .calls
        .iter()
        .rposition(|c| matches!(c, crate::mock_hw::BoardCall::EnableLine(..)))
        .unwrap();
    assert!(last_line < first_pwm);
}

#[test]
fn encoder_event_through_the_queue_changes_duty() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);

    assert!(ctx.post_from_isr(FanEvent::Control(ControlEvent::IncrementBig)));
    let event = ctx.fan_events.try_receive();
    app.on_fan_event(event, &mut board, &mut sink);

    assert_eq!(app.fan().duty(), 10);
    assert_eq!(board.last_pwm(), Some(10));
    assert_eq!(sink.events.last(), Some(&AppEvent::DutyChanged(10)));
    assert!(!app.fan().is_saved());
}

#[test]
fn power_mode_key_cycles_tier_and_rearms_scanning() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    let mut link = MockLink::default();
    let mut delay = MockDelay::default();

    app.handle_key(KeyAction::PowerMode, &mut board, &mut nvs, &mut link, &mut delay, &mut sink);

    assert_eq!(app.power().tier(), PowerTier::Qc9V);
    assert_eq!(sink.events.last(), Some(&AppEvent::TierChanged(PowerTier::Qc9V)));
    assert_eq!(delay.total_ms, u64::from(app.config().keys.rearm_delay_ms));
    assert!(ctx.flags.is_set(flags::KEY_SCAN_RUN));
    assert!(!app.power().is_saved());
}

#[test]
fn power_mode_key_on_standard_port_is_ignored() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::standard_port();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    board.clear();

    app.handle_key(
        KeyAction::PowerMode,
        &mut board,
        &mut nvs,
        &mut MockLink::default(),
        &mut MockDelay::default(),
        &mut sink,
    );

    assert_eq!(app.power().tier(), PowerTier::StandardPort);
    assert!(board.calls.is_empty());
    assert_eq!(sink.count(|e| matches!(e, AppEvent::TierChanged(_))), 0);
    assert!(ctx.flags.is_set(flags::KEY_SCAN_RUN));
}

#[test]
fn sleep_key_shuts_down_and_flushes_settings() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    app.handle_command(AppCommand::SetDuty(120), &mut board, &mut sink)
        .unwrap();
    let writes = nvs.writes;
    // a central is connected
    ctx.flags.clear(flags::RADIO_IDLE);
    let mut link = MockLink::default();

    app.handle_key(KeyAction::Sleep, &mut board, &mut nvs, &mut link, &mut MockDelay::default(), &mut sink);

    assert!(!app.fan().is_on());
    assert!(!app.screen().is_on());
    assert_eq!(board.last_pwm(), Some(0));
    assert!(!board.line_enabled(ControlLine::Dp));
    assert!(!board.line_enabled(ControlLine::Dm));
    assert_eq!(nvs.writes, writes + 1);
    assert!(app.fan().is_saved());
    assert_eq!(link.closed, 1);
    assert!(ctx.flags.is_set(flags::POWER_SLEEP));
    assert!(!ctx.flags.is_set(flags::KEY_SCAN_RUN));
    assert_eq!(ctx.terminal_wait_bits(), flags::RADIO_IDLE);
    assert_eq!(sink.events.last(), Some(&AppEvent::SleepRequested));
}

#[test]
fn sleep_with_idle_radio_leaves_the_link_alone() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    let mut link = MockLink::default();

    app.enter_sleep(&mut board, &mut nvs, &mut link, &mut sink);
    assert_eq!(link.closed, 0);
    assert!(ctx.flags.is_set(flags::POWER_SLEEP));
}

#[test]
fn telemetry_every_n_ticks() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    app.set_reading(PowerReading {
        bus_voltage: 5.1,
        current: 0.25,
    });

    for _ in 0..(TELEMETRY_TICKS * 2 + 1) {
        app.tick(&mut nvs, &mut sink);
    }

    let telemetry: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::Telemetry(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(telemetry.len(), 2);
    assert_eq!(telemetry[0].tier, PowerTier::Qc5V);
    assert!(telemetry[0].fan_on);
    assert_eq!(telemetry[0].bus_voltage, 5.1);
    assert_eq!(app.tick_count(), TELEMETRY_TICKS * 2 + 1);
}

#[test]
fn quiescent_duty_change_is_reported_saved() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    app.handle_command(AppCommand::SetDuty(64), &mut board, &mut sink)
        .unwrap();

    for _ in 0..app.config().fan.persist_ticks {
        app.tick(&mut nvs, &mut sink);
    }

    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigSaved(_))), 1);
    assert!(app.fan().is_saved());
}

#[test]
fn tier_command_requires_a_fast_charger() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::dedicated_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);

    assert!(app
        .handle_command(AppCommand::SetTier(PowerTier::Qc12V), &mut board, &mut sink)
        .is_err());
    assert_eq!(app.power().tier(), PowerTier::DedicatedCharger);
}

#[test]
fn render_shows_values_and_unsaved_marks() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    let mut panel = TextPanel::new();

    app.set_reading(PowerReading {
        bus_voltage: 8.972,
        current: -0.4,
    });
    app.handle_command(AppCommand::SetDuty(128), &mut board, &mut sink)
        .unwrap();
    app.render(&mut panel);

    assert_eq!(panel.backlight(), BACKLIGHT_ON);
    assert_eq!(panel.text_at(2, 2), Some("PWM:"));
    assert_eq!(panel.text_at(95, 2), Some("128*"));
    assert_eq!(panel.text_at(95, 34), Some("0"));
    assert_eq!(panel.text_at(95, 67), Some("QC 5V"));
    assert_eq!(panel.text_at(2, 100), Some("8.972V"));
    assert_eq!(panel.text_at(120, 100), Some("0.400A"));
    assert_eq!(panel.flush_count(), 1);
}

#[test]
fn screen_off_turns_the_backlight_off() {
    let ctx = SystemContext::new();
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let mut sink = RecordingSink::default();
    let mut app = started(&ctx, &mut board, &mut nvs, &mut sink);
    let mut panel = TextPanel::new();
    app.render(&mut panel);

    app.handle_command(AppCommand::SetDisplayMode(false), &mut board, &mut sink)
        .unwrap();
    app.render(&mut panel);

    assert_eq!(panel.backlight(), BACKLIGHT_OFF);
    assert_eq!(panel.flush_count(), 1);
}
