//! Update session driven through the application service, with the
//! simulated firmware slot behind it.

use fanctl::adapters::ota_slot::OtaSlotAdapter;
use fanctl::app::commands::AppCommand;
use fanctl::app::events::AppEvent;
use fanctl::app::ports::{ControlLine, FirmwareStore};
use fanctl::app::service::AppService;
use fanctl::config::BoardConfig;
use fanctl::context::{SystemContext, TERMINAL_COUNTDOWN_S, Terminal};
use fanctl::flags;
use fanctl::update::SessionState;

use crate::mock_hw::{MockBoard, MockDelay, MockLink, MockNvs, RecordingSink};

const DUTY: i32 = 90;

struct Rig {
    board: MockBoard,
    nvs: MockNvs,
    link: MockLink,
    store: OtaSlotAdapter,
    sink: RecordingSink,
}

impl Rig {
    fn new() -> Self {
        Self {
            board: MockBoard::quick_charger(),
            nvs: MockNvs::new(),
            link: MockLink::default(),
            store: OtaSlotAdapter::new(),
            sink: RecordingSink::default(),
        }
    }

    /// Started service running at `DUTY`.
    fn start<'a>(&mut self, ctx: &'a SystemContext) -> AppService<'a> {
        let mut app = AppService::new(ctx, BoardConfig::default(), &self.nvs);
        app.start(&mut self.board, &mut MockDelay::default(), &mut self.nvs, &mut self.sink);
        app.handle_command(AppCommand::SetDuty(DUTY), &mut self.board, &mut self.sink)
            .unwrap();
        app
    }

    fn submit(&mut self, app: &mut AppService<'_>, data: &[u8]) {
        app.update_submit(
            data,
            &mut self.link,
            &mut self.store,
            &mut self.board,
            &mut self.nvs,
            &mut self.sink,
        );
    }

    fn pump_all(&mut self, app: &mut AppService<'_>) -> usize {
        let mut total = 0;
        loop {
            let n = app.update_pump(&mut self.link, &mut self.store, &mut self.sink);
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    fn end(&mut self, app: &mut AppService<'_>) {
        app.update_end(&mut self.store, &mut self.board, &mut self.nvs, &mut self.sink);
    }
}

#[test]
fn begin_pauses_fan_screen_and_keys() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    assert!(ctx.flags.is_set(flags::KEY_SCAN_RUN | flags::FAN_RUN));

    rig.submit(&mut app, b"FW+UPD:1200\r\n");

    assert_eq!(rig.link.responses, ["OK\r\n"]);
    assert!(app.update_in_progress());
    assert!(matches!(app.update_state(), SessionState::Receiving { remaining: 1200, .. }));
    assert_eq!(rig.board.last_pwm(), Some(0));
    assert!(!app.screen().is_on());
    assert!(!ctx.flags.is_set(flags::KEY_SCAN_RUN));
    assert!(!ctx.flags.is_set(flags::FAN_RUN));
    assert!(rig.store.is_open());
}

#[test]
fn full_image_is_written_and_booted() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);

    rig.submit(&mut app, b"FW+UPD:1200\r\n");
    for _ in 0..3 {
        rig.submit(&mut app, &[0xA5; 400]);
    }
    rig.pump_all(&mut app);

    assert_eq!(rig.link.responses, ["OK\r\n", "DONE\r\n"]);
    assert_eq!(app.update_state(), SessionState::Idle);
    assert_eq!(rig.store.sim().image.len(), 1200);
    assert!(rig.store.sim().image.iter().all(|&b| b == 0xA5));
    assert_eq!(rig.store.sim().boot.map(|s| s.index), Some(1));
    // the host waits for the reset that follows DONE
    assert!(app.update_in_progress());
}

#[test]
fn bytes_past_the_announced_length_are_dropped() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);

    rig.submit(&mut app, b"FW+UPD:10\r\n");
    rig.submit(&mut app, &[1; 25]);
    rig.pump_all(&mut app);
    assert_eq!(rig.store.sim().image.len(), 10);
    assert_eq!(rig.link.last_response(), Some("DONE\r\n"));
}

#[test]
fn reset_after_done_releases_power_and_requests_restart() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.submit(&mut app, b"FW+UPD:16\r\n");
    rig.submit(&mut app, &[3; 16]);
    rig.pump_all(&mut app);

    rig.submit(&mut app, b"FW+RST!\r\n");

    assert_eq!(rig.link.closed, 1);
    assert!(!rig.board.line_enabled(ControlLine::Dp));
    assert!(!rig.board.line_enabled(ControlLine::Dm));
    assert!(ctx.flags.is_set(flags::RADIO_LOCK | flags::POWER_RESTART));
    assert_eq!(ctx.terminal_wait_bits(), flags::RADIO_IDLE);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::RestartRequested), 1);
    // the pending duty change was flushed before the restart
    assert!(app.fan().is_saved());

    // the link reported idle, so the power task restarts after the countdown
    let mut delay = MockDelay::default();
    assert_eq!(ctx.await_terminal(&mut delay), Terminal::Restart);
    assert!(delay.total_ms >= u64::from(TERMINAL_COUNTDOWN_S) * 1000);
}

#[test]
fn locked_radio_refuses_a_second_update() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.submit(&mut app, b"FW+RST!\r\n");
    rig.link.responses.clear();

    rig.submit(&mut app, b"FW+UPD:100\r\n");
    assert_eq!(rig.link.responses, ["FAIL\r\n"]);
    assert_eq!(app.update_state(), SessionState::Idle);
}

#[test]
fn rejected_image_fails_and_drops_input_until_end() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.store.sim_mut().reject_image = true;

    rig.submit(&mut app, b"FW+UPD:32\r\n");
    rig.submit(&mut app, &[0; 32]);
    rig.pump_all(&mut app);

    assert_eq!(rig.link.responses, ["OK\r\n", "FAIL\r\n"]);
    assert_eq!(app.update_state(), SessionState::Failed);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::UpdateState(SessionState::Failed)), 1);
    assert_eq!(rig.store.sim().boot, None);

    rig.submit(&mut app, b"FW+UPD:32\r\n");
    assert_eq!(rig.link.responses.len(), 2);

    rig.end(&mut app);
    assert_eq!(app.update_state(), SessionState::Idle);
    assert!(!app.update_in_progress());
    assert_eq!(rig.board.last_pwm(), Some(DUTY as u8));
    assert!(app.screen().is_on());
    assert!(ctx.flags.is_set(flags::KEY_SCAN_RUN | flags::FAN_RUN));
}

#[test]
fn boot_slot_failure_fails_the_transfer() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.store.sim_mut().fail_boot_set = true;

    rig.submit(&mut app, b"FW+UPD:64\r\n");
    rig.submit(&mut app, &[0x5A; 64]);
    rig.pump_all(&mut app);

    assert_eq!(rig.link.responses, ["OK\r\n", "FAIL\r\n"]);
    assert_eq!(app.update_state(), SessionState::Failed);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::UpdateState(SessionState::Failed)), 1);
    assert_eq!(rig.store.sim().boot, None);
    assert!(!rig.store.is_open());
    assert!(!ctx.flags.is_set(flags::POWER_RESTART));

    rig.end(&mut app);
    assert_eq!(app.update_state(), SessionState::Idle);
    assert_eq!(rig.board.last_pwm(), Some(DUTY as u8));
}

#[test]
fn write_failure_during_inline_drain_fails_the_transfer() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);

    rig.submit(&mut app, b"FW+UPD:2000\r\n");
    rig.store.sim_mut().fail_write = true;
    // more than the staging ring holds, so the submit itself writes
    rig.submit(&mut app, &[0x11; 600]);

    assert_eq!(rig.link.responses, ["OK\r\n", "FAIL\r\n"]);
    assert_eq!(app.update_state(), SessionState::Failed);
    assert!(rig.store.sim().image.is_empty());
    assert!(!rig.store.is_open());

    rig.submit(&mut app, &[0x11; 100]);
    assert_eq!(rig.link.responses.len(), 2);
}

#[test]
fn lost_inbound_data_fails_the_transfer() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);

    rig.submit(&mut app, b"FW+UPD:256\r\n");
    rig.submit(&mut app, &[1; 64]);
    app.update_overrun(&mut rig.link, &mut rig.store, &mut rig.sink);

    assert_eq!(rig.link.responses, ["OK\r\n", "FAIL\r\n"]);
    assert_eq!(app.update_state(), SessionState::Failed);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::UpdateState(SessionState::Failed)), 1);

    rig.end(&mut app);
    assert!(!app.update_in_progress());
    assert!(ctx.flags.is_set(flags::FAN_RUN));
}

#[test]
fn disconnect_mid_transfer_restores_normal_operation() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);

    rig.submit(&mut app, b"FW+UPD:4096\r\n");
    rig.submit(&mut app, &[8; 700]);
    rig.end(&mut app);

    assert!(!rig.store.is_open());
    assert_eq!(app.update_state(), SessionState::Idle);
    assert_eq!(rig.board.last_pwm(), Some(DUTY as u8));
    assert!(rig.board.tach_enabled());
    assert!(app.screen().is_on());
}

#[test]
fn missing_slot_is_an_error_and_leaves_the_fan_running() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.store.sim_mut().no_slot = true;

    rig.submit(&mut app, b"FW+UPD:100\r\n");

    assert_eq!(rig.link.responses, ["ERROR\r\n"]);
    assert!(!app.update_in_progress());
    assert_eq!(rig.board.last_pwm(), Some(DUTY as u8));
    assert!(ctx.flags.is_set(flags::FAN_RUN));
}

#[test]
fn mode_commands_are_refused_during_a_transfer() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.submit(&mut app, b"FW+UPD:100\r\n");

    app.handle_command(AppCommand::SetFanMode(true), &mut rig.board, &mut rig.sink)
        .unwrap();
    app.handle_command(AppCommand::SetDisplayMode(true), &mut rig.board, &mut rig.sink)
        .unwrap();
    assert!(!app.fan().is_on());
    assert!(!app.screen().is_on());
}

#[test]
fn memory_and_version_queries() {
    let ctx = SystemContext::new();
    let mut rig = Rig::new();
    let mut app = rig.start(&ctx);
    rig.board.heap = 98_304;

    rig.submit(&mut app, b"FW+RAM?\r\n");
    rig.submit(&mut app, b"FW+VER?\r\n");

    assert_eq!(rig.link.data[0], b"98304\r\n");
    assert_eq!(
        rig.link.data[1],
        format!("{}\r\n", env!("CARGO_PKG_VERSION")).into_bytes()
    );
    assert!(rig.link.responses.is_empty());
}

#[test]
fn slot_adapter_abort_is_idempotent() {
    let mut store = OtaSlotAdapter::new();
    store.abort();
    let slot = store.next_slot().unwrap();
    store.begin(slot).unwrap();
    store.abort();
    store.abort();
    assert!(!store.is_open());
}
