//! Mock adapters for integration tests.
//!
//! Records every actuator and charger call so tests can assert on the
//! full command history without touching LEDC, DAC or ADC registers.

use std::collections::{HashMap, VecDeque};

use embedded_hal::delay::DelayNs;
use fanctl::app::events::AppEvent;
use fanctl::app::ports::{
    ActuatorPort, ChargerPort, ControlLine, EventSink, PlatformPort, StorageError, StoragePort,
    UpdateTransport,
};

// ── Board call record ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCall {
    FanPwm(u8),
    FanRgb(u8, u8, u8),
    Tach(bool),
    SetLine(ControlLine, u8),
    EnableLine(ControlLine, bool),
}

// ── MockBoard ─────────────────────────────────────────────────

/// Fan and charger hardware.  The sense line replays `sense`, repeating
/// the last level once the trace runs out.
pub struct MockBoard {
    pub calls: Vec<BoardCall>,
    pub sense: VecDeque<u16>,
    last_sense: u16,
    pub heap: u32,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new() -> Self {
        Self::with_sense(&[0])
    }

    /// A supply that answers the probe with `trace`.
    pub fn with_sense(trace: &[u16]) -> Self {
        Self {
            calls: Vec::new(),
            sense: trace.iter().copied().collect(),
            last_sense: 0,
            heap: 180_000,
        }
    }

    /// Probe pulled low straight away: a standard port.
    pub fn standard_port() -> Self {
        Self::with_sense(&[10])
    }

    /// Probe held high, then released by the sink: fast-charge capable.
    pub fn quick_charger() -> Self {
        Self::with_sense(&[400, 400, 400, 30])
    }

    /// Probe never released: a dedicated charger.
    pub fn dedicated_charger() -> Self {
        Self::with_sense(&[400])
    }

    pub fn last_pwm(&self) -> Option<u8> {
        self.calls.iter().rev().find_map(|c| match c {
            BoardCall::FanPwm(d) => Some(*d),
            _ => None,
        })
    }

    pub fn tach_enabled(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                BoardCall::Tach(on) => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn line_enabled(&self, line: ControlLine) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                BoardCall::EnableLine(l, on) if *l == line => Some(*on),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn line_code(&self, line: ControlLine) -> Option<u8> {
        self.calls.iter().rev().find_map(|c| match c {
            BoardCall::SetLine(l, code) if *l == line => Some(*code),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorPort for MockBoard {
    fn set_fan_pwm(&mut self, duty: u8) {
        self.calls.push(BoardCall::FanPwm(duty));
    }

    fn set_fan_rgb(&mut self, r: u8, g: u8, b: u8) {
        self.calls.push(BoardCall::FanRgb(r, g, b));
    }

    fn set_tach_enabled(&mut self, enabled: bool) {
        self.calls.push(BoardCall::Tach(enabled));
    }
}

impl ChargerPort for MockBoard {
    fn set_line(&mut self, line: ControlLine, code: u8) {
        self.calls.push(BoardCall::SetLine(line, code));
    }

    fn enable_line(&mut self, line: ControlLine, enabled: bool) {
        self.calls.push(BoardCall::EnableLine(line, enabled));
    }

    fn sample(&mut self) -> u16 {
        if let Some(level) = self.sense.pop_front() {
            self.last_sense = level;
        }
        self.last_sense
    }
}

impl PlatformPort for MockBoard {
    fn free_heap(&self) -> u32 {
        self.heap
    }
}

// ── MockNvs ───────────────────────────────────────────────────

pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    pub writes: usize,
    pub fail_writes: bool,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
            writes: 0,
            fail_writes: false,
        }
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.store
            .get(&format!("{}::{}", namespace, key))
            .map(Vec::as_slice)
    }
}

impl Default for MockNvs {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.get(namespace, key) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.store
            .insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{}::{}", namespace, key))
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Returns immediately; keeps the total requested time.
#[derive(Default)]
pub struct MockDelay {
    pub total_ms: u64,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ms += u64::from(ns) / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += u64::from(ms);
    }
}

// ── MockLink ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLink {
    pub responses: Vec<String>,
    pub data: Vec<Vec<u8>>,
    pub closed: usize,
}

#[allow(dead_code)]
impl MockLink {
    pub fn last_response(&self) -> Option<&str> {
        self.responses.last().map(String::as_str)
    }
}

impl UpdateTransport for MockLink {
    fn send_response(&mut self, text: &str) {
        self.responses.push(text.to_string());
    }

    fn send_data(&mut self, data: &[u8]) {
        self.data.push(data.to_vec());
    }

    fn close(&mut self) {
        self.closed += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(*event);
    }
}
