//! Power negotiation against scripted sense-line traces.

use fanctl::app::ports::ControlLine;
use fanctl::config::BoardConfig;
use fanctl::persist::{self, Persisted};
use fanctl::power::{PROBE_CODE, PowerError, PowerNegotiator, PowerTier};

use crate::mock_hw::{BoardCall, MockBoard, MockDelay, MockNvs};

fn negotiate(board: &mut MockBoard, nvs: &mut MockNvs, requested: PowerTier) -> (PowerNegotiator, MockDelay) {
    let config = BoardConfig::default();
    let mut delay = MockDelay::default();
    let mut power = PowerNegotiator::new(&config.power, &*nvs);
    power.negotiate(requested, board, &mut delay, nvs);
    (power, delay)
}

#[test]
fn handshake_starts_by_releasing_both_lines_then_probing() {
    let mut board = MockBoard::standard_port();
    let mut nvs = MockNvs::new();
    negotiate(&mut board, &mut nvs, PowerTier::Qc5V);

    assert_eq!(
        &board.calls[..4],
        &[
            BoardCall::EnableLine(ControlLine::Dp, false),
            BoardCall::EnableLine(ControlLine::Dm, false),
            BoardCall::SetLine(ControlLine::Dp, PROBE_CODE),
            BoardCall::EnableLine(ControlLine::Dp, true),
        ]
    );
}

#[test]
fn low_probe_is_a_standard_port() {
    let mut board = MockBoard::standard_port();
    let mut nvs = MockNvs::new();
    let (mut power, delay) = negotiate(&mut board, &mut nvs, PowerTier::Qc9V);

    assert_eq!(power.tier(), PowerTier::StandardPort);
    assert_eq!(power.label(), "SDP 5V");
    assert!(!power.is_fast_charge_capable());
    assert!(!board.line_enabled(ControlLine::Dp));
    assert_eq!(delay.total_ms, 50);
    assert_eq!(nvs.writes, 0);
    assert_eq!(power.set_tier(PowerTier::Qc12V, &mut board), Err(PowerError::NotNegotiable));
}

#[test]
fn probe_never_released_is_a_dedicated_charger() {
    let mut board = MockBoard::dedicated_charger();
    let mut nvs = MockNvs::new();
    let (power, delay) = negotiate(&mut board, &mut nvs, PowerTier::Qc5V);

    let tuning = BoardConfig::default().power;
    assert_eq!(power.tier(), PowerTier::DedicatedCharger);
    assert_eq!(power.label(), "DCP 5V");
    let expected = tuning.release_settle_ms
        + tuning.handshake_settle_ms
        + u32::from(tuning.poll_budget - 1) * tuning.poll_interval_ms;
    assert_eq!(delay.total_ms, u64::from(expected));
    assert!(!board.line_enabled(ControlLine::Dp));
    assert!(!board.line_enabled(ControlLine::Dm));
}

#[test]
fn released_probe_drives_requested_tier_and_stores_it() {
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let (power, delay) = negotiate(&mut board, &mut nvs, PowerTier::Qc9V);

    assert_eq!(power.tier(), PowerTier::Qc9V);
    assert!(power.is_fast_charge_capable());
    assert!(power.is_saved());
    let (dp, dm) = PowerTier::Qc9V.dac_pair().unwrap();
    assert_eq!(board.line_code(ControlLine::Dp), Some(dp));
    assert_eq!(board.line_code(ControlLine::Dm), Some(dm));
    assert!(board.line_enabled(ControlLine::Dp));
    assert!(board.line_enabled(ControlLine::Dm));
    assert_eq!(delay.total_ms, 50 + 1250 + 2 * 10);

    let stored = nvs.get(persist::NAMESPACE, PowerTier::KEY).unwrap();
    assert_eq!(PowerTier::decode(stored), Some(PowerTier::Qc9V));
}

#[test]
fn detected_tier_request_falls_back_to_qc5v() {
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let (power, _) = negotiate(&mut board, &mut nvs, PowerTier::StandardPort);
    assert_eq!(power.tier(), PowerTier::Qc5V);
}

#[test]
fn stored_tier_is_the_startup_request() {
    let mut nvs = MockNvs::new();
    use fanctl::app::ports::StoragePort;
    nvs.write(persist::NAMESPACE, PowerTier::KEY, &PowerTier::Qc12V.encode())
        .unwrap();

    let config = BoardConfig::default();
    let power = PowerNegotiator::new(&config.power, &nvs);
    assert_eq!(power.requested(), PowerTier::Qc12V);
    assert_eq!(power.tier(), PowerTier::DcIn);

    // renegotiating the same tier does not rewrite storage
    let mut board = MockBoard::quick_charger();
    let writes = nvs.writes;
    let (power, _) = negotiate(&mut board, &mut nvs, power.requested());
    assert_eq!(power.tier(), PowerTier::Qc12V);
    assert_eq!(nvs.writes, writes);
}

#[test]
fn cycling_wraps_and_persists_after_quiescence() {
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let (mut power, _) = negotiate(&mut board, &mut nvs, PowerTier::Qc5V);

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(power.cycle_tier(&mut board).unwrap());
    }
    assert_eq!(seen, vec![PowerTier::Qc9V, PowerTier::Qc12V, PowerTier::Qc5V]);

    power.cycle_tier(&mut board).unwrap();
    assert!(!power.is_saved());
    let writes = nvs.writes;
    let threshold = BoardConfig::default().power.persist_ticks;
    for _ in 0..threshold {
        power.tick(&mut nvs);
    }
    assert!(power.is_saved());
    assert_eq!(nvs.writes, writes + 1);
    let stored = nvs.get(persist::NAMESPACE, PowerTier::KEY).unwrap();
    assert_eq!(PowerTier::decode(stored), Some(PowerTier::Qc9V));
}

#[test]
fn detected_tiers_cannot_be_requested() {
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let (mut power, _) = negotiate(&mut board, &mut nvs, PowerTier::Qc5V);
    assert_eq!(
        power.set_tier(PowerTier::DedicatedCharger, &mut board),
        Err(PowerError::InvalidTier(PowerTier::DedicatedCharger))
    );
    assert_eq!(power.tier(), PowerTier::Qc5V);
}

#[test]
fn release_disconnects_both_lines() {
    let mut board = MockBoard::quick_charger();
    let mut nvs = MockNvs::new();
    let (mut power, _) = negotiate(&mut board, &mut nvs, PowerTier::Qc12V);
    power.release(&mut board);
    assert!(!board.line_enabled(ControlLine::Dp));
    assert!(!board.line_enabled(ControlLine::Dm));
}
