//! Fuzz target: `UpdateSession`
//!
//! Splits the input into chunks on a length byte and feeds them to a
//! session backed by the simulated firmware slot.  The session must never
//! panic and closing the link must always leave it idle.
//!
//! cargo fuzz run fuzz_update_session

#![no_main]

use fanctl::adapters::ota_slot::OtaSlotAdapter;
use fanctl::app::ports::{UpdateHost, UpdateTransport};
use fanctl::context::SystemContext;
use fanctl::update::{SessionState, UpdateSession};
use libfuzzer_sys::fuzz_target;

struct Host;

impl UpdateHost for Host {
    fn suspend(&mut self) {}
    fn resume(&mut self) {}
    fn release_power(&mut self) {}
    fn free_memory(&self) -> u32 {
        0
    }
    fn firmware_version(&self) -> &str {
        ""
    }
}

struct Link;

impl UpdateTransport for Link {
    fn send_response(&mut self, _text: &str) {}
    fn send_data(&mut self, _data: &[u8]) {}
    fn close(&mut self) {}
}

fuzz_target!(|data: &[u8]| {
    let ctx = SystemContext::new();
    let mut session = UpdateSession::new(&ctx);
    let mut store = OtaSlotAdapter::new();
    let (mut host, mut link) = (Host, Link);

    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let n = usize::from(len).min(tail.len());
        let (chunk, tail) = tail.split_at(n);
        session.submit(chunk, &mut link, &mut host, &mut store);
        session.pump(&mut link, &mut store);
        rest = tail;
    }

    session.end(&mut host, &mut store);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!store.is_open());
});
